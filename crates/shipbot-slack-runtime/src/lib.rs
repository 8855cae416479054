//! Slack transport runtime for shipbot.
//!
//! Hosts the Socket Mode event feed, the single-channel guard, and the
//! sequential loop that bridges chat messages into the command router.

mod slack_runtime;

pub use slack_runtime::{run_deploy_bridge, SlackDeployRuntime};
