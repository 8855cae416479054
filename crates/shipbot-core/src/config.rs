//! Immutable bot configuration assembled once at startup.

use anyhow::{bail, Result};

/// Where deployments go: source repository, image naming, and the
/// Kubernetes object the image lands on. Shared read-only by the
/// deploy handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub github_org: String,
    pub github_repo: String,
    pub image_prefix: String,
    pub kube_namespace: String,
    pub kube_deployment: String,
}

/// Full runtime configuration. Built by the CLI, validated once, then
/// passed by reference; nothing reads the process environment after
/// startup.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub slack_token: String,
    pub github_token: String,
    pub target: DeployTarget,
    pub slack_api_base: String,
    pub github_api_base: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub reconnect_delay_ms: u64,
}

impl BotConfig {
    /// Rejects the configuration unless every required value is
    /// non-empty. The error lists every missing key at once so a
    /// misconfigured deployment surfaces in a single round trip.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("slack token", self.slack_token.as_str()),
            ("github token", self.github_token.as_str()),
            ("github org", self.target.github_org.as_str()),
            ("github repo", self.target.github_repo.as_str()),
            ("image prefix", self.target.image_prefix.as_str()),
            ("kube namespace", self.target.kube_namespace.as_str()),
            ("kube deployment", self.target.kube_deployment.as_str()),
        ];
        let missing = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            bail!("missing required configuration: {}", missing.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BotConfig, DeployTarget};

    fn complete_config() -> BotConfig {
        BotConfig {
            slack_token: "xoxb-token".to_string(),
            github_token: "ghp-token".to_string(),
            target: DeployTarget {
                github_org: "acme".to_string(),
                github_repo: "widgets".to_string(),
                image_prefix: "registry.example.com/widgets".to_string(),
                kube_namespace: "production".to_string(),
                kube_deployment: "widgets-api".to_string(),
            },
            slack_api_base: "https://slack.com/api".to_string(),
            github_api_base: "https://api.github.com".to_string(),
            request_timeout_ms: 30_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 200,
            reconnect_delay_ms: 5_000,
        }
    }

    #[test]
    fn unit_validate_accepts_complete_configuration() {
        assert!(complete_config().validate().is_ok());
    }

    #[test]
    fn unit_validate_lists_every_missing_key() {
        let mut config = complete_config();
        config.github_token = String::new();
        config.target.kube_deployment = "   ".to_string();
        let error = config.validate().expect_err("validation should fail");
        let message = error.to_string();
        assert!(message.contains("github token"));
        assert!(message.contains("kube deployment"));
        assert!(!message.contains("slack token"));
    }

    #[test]
    fn regression_validate_treats_whitespace_as_missing() {
        let mut config = complete_config();
        config.target.image_prefix = "\t\n".to_string();
        assert!(config.validate().is_err());
    }
}
