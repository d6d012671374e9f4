use std::{fs::File, io::BufReader, path::Path};

use anyhow::{ensure, Context};
use serde::Deserialize;
use url::Url;

const DEFAULT_ORG: &str = "src-openeuler";
const DEFAULT_REPO: &str = "software-package-server";
const DEFAULT_GITEE_API: &str = "https://gitee.com/api/v5";
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_GITEE_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, Deserialize)]
pub struct RelayConfig {
    /// Expected value of the `User-Agent` header on every inbound hook
    pub user_agent: String,
    /// Queue group used when subscribing to the inbound topic
    pub group_name: String,
    /// Gitee access token used to list pull request comments
    pub token: String,
    /// Account whose comments are considered CI reports
    pub ci_robot_name: String,
    pub topics: Topics,
    pub nats: NatsConfig,
    #[serde(default)]
    pub gitee: GiteeConfig,
    #[serde(default)]
    pub repository: Repository,
    /// Enables the HTTP intake; without it hooks only come from the bus
    pub webhook: Option<WebhookConfig>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Topics {
    /// Topic carrying raw Gitee hook events
    pub software_pkg_hook_event: String,
    /// Topic the `ci checked` messages are published to
    pub software_pkg_ci_checked: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    pub url: Url,
    #[serde(default)]
    pub connect_timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct GiteeConfig {
    /// Base URL of the Gitee REST API, without trailing `/repos`
    #[serde(default = "default_gitee_api")]
    pub api_url: Url,
    /// Upper bound for a single comments request
    #[serde(default)]
    pub timeout_secs: u64,
}

impl Default for GiteeConfig {
    fn default() -> Self {
        Self {
            api_url: default_gitee_api(),
            timeout_secs: 0,
        }
    }
}

fn default_gitee_api() -> Url {
    Url::parse(DEFAULT_GITEE_API).expect("default Gitee API url is valid")
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookConfig {
    /// Secret configured on the Gitee side, used to check `X-Gitee-Token`
    pub secret: String,
}

/// The only repository whose pull requests are reported.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub org: String,
    #[serde(default)]
    pub repo: String,
}

impl RelayConfig {
    /// Reads the YAML file at `path`, fills in defaults and validates every section.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file =
            File::open(path).with_context(|| format!("couldn't open {}", path.display()))?;
        let config: RelayConfig =
            serde_yaml::from_reader(BufReader::new(file)).context("couldn't parse config file")?;

        config.prepare()
    }

    fn prepare(mut self) -> anyhow::Result<Self> {
        self.set_default();
        self.validate()?;

        Ok(self)
    }

    fn set_default(&mut self) {
        self.nats.set_default();
        self.gitee.set_default();
        self.repository.set_default();
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.user_agent.is_empty(), "missing user_agent");
        ensure!(!self.group_name.is_empty(), "missing group_name");
        ensure!(!self.token.is_empty(), "missing token");
        ensure!(!self.ci_robot_name.is_empty(), "missing ci_robot_name");

        self.topics.validate().context("invalid topics section")?;
        self.nats.validate().context("invalid nats section")?;

        if let Some(webhook) = &self.webhook {
            ensure!(!webhook.secret.is_empty(), "missing webhook secret");
        }

        Ok(())
    }
}

impl Topics {
    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            !self.software_pkg_hook_event.is_empty(),
            "missing software_pkg_hook_event"
        );
        ensure!(
            !self.software_pkg_ci_checked.is_empty(),
            "missing software_pkg_ci_checked"
        );

        Ok(())
    }
}

impl NatsConfig {
    fn set_default(&mut self) {
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = DEFAULT_CONNECT_TIMEOUT_SECS;
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.url.scheme() == "nats" || self.url.scheme() == "tls",
            "unsupported NATS url scheme `{}`",
            self.url.scheme()
        );

        Ok(())
    }
}

impl GiteeConfig {
    fn set_default(&mut self) {
        if self.timeout_secs == 0 {
            self.timeout_secs = DEFAULT_GITEE_TIMEOUT_SECS;
        }
    }
}

impl Repository {
    fn set_default(&mut self) {
        if self.org.is_empty() {
            self.org = DEFAULT_ORG.to_owned();
        }

        if self.repo.is_empty() {
            self.repo = DEFAULT_REPO.to_owned();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const MINIMAL: &str = r#"
user_agent: Robot-Gitee-Access
group_name: software-pkg-ci
token: secret
ci_robot_name: openeuler-ci-bot
topics:
  software_pkg_hook_event: gitee_pr_hook
  software_pkg_ci_checked: software_pkg_ci_checked
nats:
  url: nats://127.0.0.1:4222
"#;

    pub(crate) fn parse(yaml: &str) -> anyhow::Result<RelayConfig> {
        let config: RelayConfig = serde_yaml::from_str(yaml)?;
        config.prepare()
    }

    #[test]
    fn fills_defaults() {
        let config = parse(MINIMAL).unwrap();

        assert_eq!(config.repository.org, "src-openeuler");
        assert_eq!(config.repository.repo, "software-package-server");
        assert_eq!(config.gitee.api_url.as_str(), "https://gitee.com/api/v5");
        assert_eq!(config.gitee.timeout_secs, 30);
        assert_eq!(config.nats.connect_timeout_secs, 10);
        assert!(config.webhook.is_none());
    }

    #[test]
    fn keeps_explicit_gitee_timeout() {
        let yaml = format!("{}gitee:\n  timeout_secs: 5\n", MINIMAL);
        let config = parse(&yaml).unwrap();

        assert_eq!(config.gitee.timeout_secs, 5);
        assert_eq!(config.gitee.api_url.as_str(), "https://gitee.com/api/v5");
    }

    #[test]
    fn reads_webhook_secret() {
        let yaml = format!("{}webhook:\n  secret: s3cr3t\n", MINIMAL);
        let config = parse(&yaml).unwrap();

        assert_eq!(config.webhook.unwrap().secret, "s3cr3t");
    }

    #[test]
    fn rejects_empty_webhook_secret() {
        let yaml = format!("{}webhook:\n  secret: \"\"\n", MINIMAL);
        let err = parse(&yaml).unwrap_err();

        assert_eq!(err.to_string(), "missing webhook secret");
    }

    #[test]
    fn keeps_explicit_repository() {
        let yaml = format!("{}repository:\n  org: openeuler\n  repo: infra\n", MINIMAL);
        let config = parse(&yaml).unwrap();

        assert_eq!(config.repository.org, "openeuler");
        assert_eq!(config.repository.repo, "infra");
    }

    #[test]
    fn rejects_empty_robot_name() {
        let yaml = MINIMAL.replace("openeuler-ci-bot", "\"\"");
        let err = parse(&yaml).unwrap_err();

        assert!(err.to_string().contains("ci_robot_name"));
    }

    #[test]
    fn rejects_empty_topic() {
        let yaml = MINIMAL.replace("gitee_pr_hook", "\"\"");
        let err = parse(&yaml).unwrap_err();

        assert_eq!(err.to_string(), "invalid topics section");
    }

    #[test]
    fn rejects_http_nats_url() {
        let yaml = MINIMAL.replace("nats://", "http://");

        assert!(parse(&yaml).is_err());
    }
}
