//! Orchestrator gateway: subprocess-backed `kubectl` operations.

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

/// Combined output plus success flag of one orchestrator operation,
/// mirroring what a human would see running the command by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub output: String,
    pub success: bool,
}

/// The three control-plane operations the handlers consume. Failures the
/// operator should see (non-zero exit, unspawnable binary) come back as a
/// failed `CommandOutcome`; `Err` is reserved for conditions no operator
/// message can describe.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn list_workloads(&self, namespace: Option<&str>) -> Result<CommandOutcome>;
    async fn set_image(
        &self,
        namespace: &str,
        deployment: &str,
        image: &str,
    ) -> Result<CommandOutcome>;
    async fn wait_for_rollout(&self, namespace: &str, deployment: &str) -> Result<CommandOutcome>;
}

/// Shells out to `kubectl`. `wait_for_rollout` blocks until the rollout
/// settles; no timeout is applied, matching the single-in-flight
/// deployment model.
pub struct KubectlCli {
    program: String,
}

impl KubectlCli {
    pub fn new() -> Self {
        Self::with_program("kubectl")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[String]) -> CommandOutcome {
        let mut command = Command::new(&self.program);
        command.args(args).kill_on_drop(true);
        match command.output().await {
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                CommandOutcome {
                    output: combined,
                    success: output.status.success(),
                }
            }
            Err(error) => CommandOutcome {
                output: format!("failed to run {}: {error}", self.program),
                success: false,
            },
        }
    }
}

impl Default for KubectlCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Orchestrator for KubectlCli {
    async fn list_workloads(&self, namespace: Option<&str>) -> Result<CommandOutcome> {
        Ok(self.run(&list_workloads_args(namespace)).await)
    }

    async fn set_image(
        &self,
        namespace: &str,
        deployment: &str,
        image: &str,
    ) -> Result<CommandOutcome> {
        Ok(self.run(&set_image_args(namespace, deployment, image)).await)
    }

    async fn wait_for_rollout(&self, namespace: &str, deployment: &str) -> Result<CommandOutcome> {
        Ok(self.run(&rollout_status_args(namespace, deployment)).await)
    }
}

fn list_workloads_args(namespace: Option<&str>) -> Vec<String> {
    let mut args = vec!["get".to_string(), "pods".to_string()];
    if let Some(namespace) = namespace {
        args.push("-n".to_string());
        args.push(namespace.to_string());
    }
    args
}

// Wildcard container selector: the image applies to every container in
// the pod template.
fn set_image_args(namespace: &str, deployment: &str, image: &str) -> Vec<String> {
    vec![
        "-n".to_string(),
        namespace.to_string(),
        "set".to_string(),
        "image".to_string(),
        format!("deployments/{deployment}"),
        format!("*={image}"),
    ]
}

fn rollout_status_args(namespace: &str, deployment: &str) -> Vec<String> {
    vec![
        "-n".to_string(),
        namespace.to_string(),
        "rollout".to_string(),
        "status".to_string(),
        format!("deployments/{deployment}"),
    ]
}
