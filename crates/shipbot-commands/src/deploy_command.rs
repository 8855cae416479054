//! `!deploy` — resolve the latest revision, retag, apply, confirm rollout.
//!
//! Every external call either succeeds and advances the sequence or is
//! reported to the channel and stops it. There is no retry and no
//! rollback; the operator watches the transcript and intervenes by hand.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use shipbot_core::DeployTarget;

use crate::command_router::{CommandArgs, CommandHandler};
use crate::github_commits::{RepoCommit, SourceControl};
use crate::kubectl::Orchestrator;
use crate::progress::ProgressSink;

const SHORT_REVISION_LEN: usize = 12;

pub struct DeployHandler {
    source_control: Arc<dyn SourceControl>,
    orchestrator: Arc<dyn Orchestrator>,
    target: DeployTarget,
}

impl DeployHandler {
    pub fn new(
        source_control: Arc<dyn SourceControl>,
        orchestrator: Arc<dyn Orchestrator>,
        target: DeployTarget,
    ) -> Self {
        Self {
            source_control,
            orchestrator,
            target,
        }
    }
}

/// First non-empty identifier in listing order, shortened to twelve
/// characters. The listing is newest-first, so this is the latest
/// deployable revision.
fn resolve_short_revision(commits: &[RepoCommit]) -> Option<String> {
    commits
        .iter()
        .find(|commit| !commit.sha.is_empty())
        .map(|commit| commit.sha.chars().take(SHORT_REVISION_LEN).collect())
}

#[async_trait]
impl CommandHandler for DeployHandler {
    async fn execute(&self, sink: &dyn ProgressSink, _args: &CommandArgs) -> Result<()> {
        sink.send("about to deploy").await;

        let commits = self
            .source_control
            .latest_commits(&self.target.github_org, &self.target.github_repo)
            .await?;
        let Some(revision) = resolve_short_revision(&commits) else {
            bail!("no sha found");
        };
        sink.send(&format!("{} commits", commits.len())).await;

        let image = format!("{}:{}", self.target.image_prefix, revision);
        sink.send(&format!("deploying image {image}")).await;

        let outcome = self
            .orchestrator
            .set_image(&self.target.kube_namespace, &self.target.kube_deployment, &image)
            .await?;
        if !outcome.success {
            sink.send(&format!("ERROR: {}", outcome.output)).await;
            return Ok(());
        }
        sink.send(&outcome.output).await;

        let outcome = self
            .orchestrator
            .wait_for_rollout(&self.target.kube_namespace, &self.target.kube_deployment)
            .await?;
        if !outcome.success {
            sink.send(&format!("ERROR: {}", outcome.output)).await;
            return Ok(());
        }
        sink.send(&outcome.output).await;

        sink.send("finished deployment").await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use shipbot_core::DeployTarget;

    use super::{resolve_short_revision, DeployHandler};
    use crate::command_router::{CommandArgs, CommandHandler};
    use crate::github_commits::{RepoCommit, SourceControl};
    use crate::kubectl::{CommandOutcome, Orchestrator};
    use crate::progress::test_support::MemorySink;

    fn target() -> DeployTarget {
        DeployTarget {
            github_org: "acme".to_string(),
            github_repo: "widgets".to_string(),
            image_prefix: "myimage".to_string(),
            kube_namespace: "production".to_string(),
            kube_deployment: "widgets-api".to_string(),
        }
    }

    struct StaticCommits(Vec<&'static str>);

    #[async_trait]
    impl SourceControl for StaticCommits {
        async fn latest_commits(&self, _org: &str, _repo: &str) -> Result<Vec<RepoCommit>> {
            Ok(self
                .0
                .iter()
                .map(|sha| RepoCommit {
                    sha: sha.to_string(),
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct ScriptedOrchestrator {
        set_image_fails: bool,
        rollout_fails: bool,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Orchestrator for ScriptedOrchestrator {
        async fn list_workloads(&self, _namespace: Option<&str>) -> Result<CommandOutcome> {
            unreachable!("deploy never lists workloads")
        }

        async fn set_image(
            &self,
            namespace: &str,
            deployment: &str,
            image: &str,
        ) -> Result<CommandOutcome> {
            self.calls
                .lock()
                .expect("lock")
                .push(format!("set_image {namespace} {deployment} {image}"));
            if self.set_image_fails {
                Ok(CommandOutcome {
                    output: "image update rejected".to_string(),
                    success: false,
                })
            } else {
                Ok(CommandOutcome {
                    output: "deployment.apps/widgets-api image updated".to_string(),
                    success: true,
                })
            }
        }

        async fn wait_for_rollout(
            &self,
            namespace: &str,
            deployment: &str,
        ) -> Result<CommandOutcome> {
            self.calls
                .lock()
                .expect("lock")
                .push(format!("rollout {namespace} {deployment}"));
            if self.rollout_fails {
                Ok(CommandOutcome {
                    output: "deployment exceeded its progress deadline".to_string(),
                    success: false,
                })
            } else {
                Ok(CommandOutcome {
                    output: "deployment \"widgets-api\" successfully rolled out".to_string(),
                    success: true,
                })
            }
        }
    }

    #[test]
    fn unit_resolve_short_revision_skips_empty_identifiers() {
        let commits = vec![
            RepoCommit { sha: String::new() },
            RepoCommit {
                sha: "abcdef1234567890".to_string(),
            },
        ];
        assert_eq!(
            resolve_short_revision(&commits),
            Some("abcdef123456".to_string())
        );
    }

    #[test]
    fn unit_resolve_short_revision_handles_empty_and_short_listings() {
        assert_eq!(resolve_short_revision(&[]), None);
        let short = vec![RepoCommit {
            sha: "abc".to_string(),
        }];
        assert_eq!(resolve_short_revision(&short), Some("abc".to_string()));
    }

    #[tokio::test]
    async fn functional_deploy_full_success_path_emits_exact_sequence() {
        let orchestrator = Arc::new(ScriptedOrchestrator::default());
        let handler = DeployHandler::new(
            Arc::new(StaticCommits(vec!["1234567890ab"])),
            orchestrator.clone(),
            target(),
        );
        let sink = MemorySink::default();

        handler
            .execute(&sink, &CommandArgs::default())
            .await
            .expect("deploy");

        assert_eq!(
            sink.messages(),
            vec![
                "about to deploy".to_string(),
                "1 commits".to_string(),
                "deploying image myimage:1234567890ab".to_string(),
                "deployment.apps/widgets-api image updated".to_string(),
                "deployment \"widgets-api\" successfully rolled out".to_string(),
                "finished deployment".to_string(),
            ]
        );
        assert_eq!(
            orchestrator.calls.lock().expect("lock").as_slice(),
            &[
                "set_image production widgets-api myimage:1234567890ab".to_string(),
                "rollout production widgets-api".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn functional_deploy_empty_commit_list_fails_without_orchestrator_calls() {
        let orchestrator = Arc::new(ScriptedOrchestrator::default());
        let handler = DeployHandler::new(
            Arc::new(StaticCommits(Vec::new())),
            orchestrator.clone(),
            target(),
        );
        let sink = MemorySink::default();

        let error = handler
            .execute(&sink, &CommandArgs::default())
            .await
            .expect_err("no deployable revision");

        assert_eq!(error.to_string(), "no sha found");
        assert_eq!(sink.messages(), vec!["about to deploy".to_string()]);
        assert!(orchestrator.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn regression_deploy_all_empty_shas_count_as_no_revision() {
        let orchestrator = Arc::new(ScriptedOrchestrator::default());
        let handler = DeployHandler::new(
            Arc::new(StaticCommits(vec!["", ""])),
            orchestrator.clone(),
            target(),
        );
        let sink = MemorySink::default();

        let error = handler
            .execute(&sink, &CommandArgs::default())
            .await
            .expect_err("no deployable revision");

        assert_eq!(error.to_string(), "no sha found");
        assert!(orchestrator.calls.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn functional_deploy_set_image_failure_reports_and_skips_rollout() {
        let orchestrator = Arc::new(ScriptedOrchestrator {
            set_image_fails: true,
            ..ScriptedOrchestrator::default()
        });
        let handler = DeployHandler::new(
            Arc::new(StaticCommits(vec!["1234567890ab"])),
            orchestrator.clone(),
            target(),
        );
        let sink = MemorySink::default();

        handler
            .execute(&sink, &CommandArgs::default())
            .await
            .expect("reported failure is not a handler error");

        let messages = sink.messages();
        assert_eq!(
            messages.last(),
            Some(&"ERROR: image update rejected".to_string())
        );
        assert!(!messages.contains(&"finished deployment".to_string()));
        assert_eq!(
            orchestrator.calls.lock().expect("lock").as_slice(),
            &["set_image production widgets-api myimage:1234567890ab".to_string()]
        );
    }

    #[tokio::test]
    async fn functional_deploy_rollout_failure_reports_and_stops() {
        let orchestrator = Arc::new(ScriptedOrchestrator {
            rollout_fails: true,
            ..ScriptedOrchestrator::default()
        });
        let handler = DeployHandler::new(
            Arc::new(StaticCommits(vec!["1234567890ab"])),
            orchestrator.clone(),
            target(),
        );
        let sink = MemorySink::default();

        handler
            .execute(&sink, &CommandArgs::default())
            .await
            .expect("reported failure is not a handler error");

        let messages = sink.messages();
        assert_eq!(
            messages.last(),
            Some(&"ERROR: deployment exceeded its progress deadline".to_string())
        );
        assert!(!messages.contains(&"finished deployment".to_string()));
    }
}
