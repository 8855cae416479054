//! Chat command layer: router, handlers, and the gateways they call.
//!
//! The router maps a tokenized chat line onto a fixed command table and
//! invokes the matching handler with a per-invocation progress sink.
//! Handlers talk to the outside world only through the `Orchestrator` and
//! `SourceControl` seams so the whole layer is testable without a cluster.

pub mod command_router;
pub mod deploy_command;
pub mod github_commits;
pub mod kubectl;
pub mod pods_command;
pub mod progress;

pub use command_router::{CommandArgs, CommandHandler, CommandRouter};
pub use deploy_command::DeployHandler;
pub use github_commits::{GithubCommitsClient, RepoCommit, SourceControl};
pub use kubectl::{CommandOutcome, KubectlCli, Orchestrator};
pub use pods_command::PodsHandler;
pub use progress::{CapturedBuffer, ProgressSink};
