use std::fmt::Display;

use tracing::trace;

use crate::{
    config::Repository,
    webhooks::gitee::{PullRequestEvent, ACTION_UPDATE_LABEL, STATE_OPEN},
};

/// One of the two labels the CI robot sets once a check run is over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CiLabel {
    Failed,
    Successful,
}

impl CiLabel {
    /// Tie-break order: when both labels are set, `ci_failed` wins.
    const ALL: [CiLabel; 2] = [CiLabel::Failed, CiLabel::Successful];

    pub fn name(self) -> &'static str {
        match self {
            Self::Failed => "ci_failed",
            Self::Successful => "ci_successful",
        }
    }
}

impl Display for CiLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decides whether a pull request event means "the CI check of this package is done".
pub struct PullRequestFilter {
    org: String,
    repo: String,
}

impl PullRequestFilter {
    pub fn new(repository: &Repository) -> Self {
        Self {
            org: repository.org.clone(),
            repo: repository.repo.clone(),
        }
    }

    /// Returns the CI label carried by `event`, or `None` if the event must be dropped.
    pub fn check(&self, event: &PullRequestEvent) -> Option<CiLabel> {
        if event.state() != STATE_OPEN || event.action_desc() != ACTION_UPDATE_LABEL {
            trace!(
                "{}: state `{}` / action `{}`, skipping",
                event,
                event.state(),
                event.action_desc()
            );
            return None;
        }

        if event.org_repo() != (self.org.as_str(), self.repo.as_str()) {
            trace!("{}: not the watched repository, skipping", event);
            return None;
        }

        let labels = event.label_set();
        let label = CiLabel::ALL
            .into_iter()
            .find(|label| labels.contains(label.name()));

        if label.is_none() {
            trace!("{}: no CI label, skipping", event);
        }

        label
    }
}
