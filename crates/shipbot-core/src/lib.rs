//! Foundational types shared across shipbot crates.
//!
//! Provides the immutable startup configuration plus the HTTP transport
//! retry/truncation helpers used by the Slack and GitHub clients.

pub mod config;
pub mod transport_helpers;

pub use config::{BotConfig, DeployTarget};
pub use transport_helpers::{
    is_retryable_status, is_retryable_transport_error, parse_retry_after, retry_delay,
    truncate_for_error,
};
