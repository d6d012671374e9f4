use std::{collections::HashSet, fmt::Display};

use serde::Deserialize;
use thiserror::Error;

/// Value of `X-Gitee-Event` for pull request hooks.
pub const MERGE_REQUEST_HOOK: &str = "Merge Request Hook";

pub const STATE_OPEN: &str = "open";
pub const ACTION_UPDATE_LABEL: &str = "update_label";

#[derive(Debug)]
pub enum GiteeEvent {
    PullRequest(PullRequestEvent),
    /// Any other event type, kept only for logging.
    Other(String),
}

#[derive(Debug, Error)]
#[error("couldn't decode pull request event: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Decodes `payload` if `event_type` designates a pull request hook.
///
/// Unknown event types are not an error: the hook topic carries every kind of Gitee event.
pub fn route_event(event_type: &str, payload: &[u8]) -> Result<GiteeEvent, DecodeError> {
    if event_type != MERGE_REQUEST_HOOK {
        return Ok(GiteeEvent::Other(event_type.to_owned()));
    }

    let event = serde_json::from_slice(payload)?;
    Ok(GiteeEvent::PullRequest(event))
}

/// Missing fields decode to their empty value, which the filter then rejects.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PullRequestEvent {
    pub action_desc: Option<String>,
    pub pull_request: PullRequestHook,
    pub repository: RepositoryHook,
}

impl PullRequestEvent {
    pub fn org_repo(&self) -> (&str, &str) {
        (&self.repository.namespace, &self.repository.path)
    }

    pub fn state(&self) -> &str {
        &self.pull_request.state
    }

    pub fn action_desc(&self) -> &str {
        self.action_desc.as_deref().unwrap_or_default()
    }

    pub fn number(&self) -> u64 {
        self.pull_request.number
    }

    pub fn label_set(&self) -> HashSet<&str> {
        self.pull_request
            .labels
            .iter()
            .flatten()
            .map(|label| label.name.as_str())
            .collect()
    }

    /// The software package id, which the package service stores in the PR body.
    pub fn pkg_id(&self) -> &str {
        self.pull_request.body.as_deref().unwrap_or_default()
    }
}

impl Display for PullRequestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (org, repo) = self.org_repo();
        write!(f, "{}/{}!{}", org, repo, self.number())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PullRequestHook {
    pub number: u64,
    pub state: String,
    pub body: Option<String>,
    pub labels: Option<Vec<LabelHook>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryHook {
    pub namespace: String,
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelHook {
    pub name: String,
}

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    pub(crate) fn payload(state: &str, action_desc: &str, labels: &[&str]) -> serde_json::Value {
        let labels: Vec<_> = labels
            .iter()
            .map(|name| json!({ "id": 1, "name": name, "color": "ff0000" }))
            .collect();

        json!({
            "action": "update",
            "action_desc": action_desc,
            "hook_name": "merge_request_hooks",
            "pull_request": {
                "id": 9000,
                "number": 42,
                "state": state,
                "title": "add package foo",
                "body": "pkg-1234",
                "labels": labels,
                "user": { "login": "alice" }
            },
            "repository": {
                "namespace": "src-openeuler",
                "path": "software-package-server",
                "full_name": "src-openeuler/software-package-server"
            },
            "sender": { "login": "openeuler-ci-bot" }
        })
    }

    #[test]
    fn other_event_types_are_not_decoded() {
        let event = route_event("Push Hook", b"not even json").unwrap();

        assert!(matches!(event, GiteeEvent::Other(t) if t == "Push Hook"));
    }

    #[test]
    fn decodes_pull_request_hook() {
        let body = payload("open", "update_label", &["ci_successful", "lgtm"]).to_string();

        let event = match route_event(MERGE_REQUEST_HOOK, body.as_bytes()).unwrap() {
            GiteeEvent::PullRequest(event) => event,
            other => panic!("unexpected event {:?}", other),
        };

        assert_eq!(event.org_repo(), ("src-openeuler", "software-package-server"));
        assert_eq!(event.state(), "open");
        assert_eq!(event.action_desc(), "update_label");
        assert_eq!(event.number(), 42);
        assert_eq!(event.pkg_id(), "pkg-1234");
        assert_eq!(event.label_set(), HashSet::from(["ci_successful", "lgtm"]));
        assert_eq!(event.to_string(), "src-openeuler/software-package-server!42");
    }

    #[test]
    fn tolerates_null_body_and_labels() {
        let mut body = payload("open", "update_label", &[]);
        body["pull_request"]["body"] = serde_json::Value::Null;
        body["pull_request"]["labels"] = serde_json::Value::Null;

        let event: PullRequestEvent = serde_json::from_value(body).unwrap();

        assert_eq!(event.pkg_id(), "");
        assert!(event.label_set().is_empty());
    }

    #[test]
    fn broken_pull_request_payload_is_an_error() {
        assert!(route_event(MERGE_REQUEST_HOOK, b"{\"action\": ").is_err());
        assert!(route_event(MERGE_REQUEST_HOOK, b"{\"pull_request\": 3}").is_err());
    }

    #[test]
    fn missing_fields_decode_as_empty() {
        let event = match route_event(MERGE_REQUEST_HOOK, b"{}").unwrap() {
            GiteeEvent::PullRequest(event) => event,
            other => panic!("unexpected event {:?}", other),
        };

        assert_eq!(event.org_repo(), ("", ""));
        assert_eq!(event.state(), "");
        assert_eq!(event.action_desc(), "");
        assert_eq!(event.number(), 0);
        assert!(event.label_set().is_empty());
    }
}
