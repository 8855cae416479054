//! `!pods` — report current workload status, optionally scoped.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::command_router::{CommandArgs, CommandHandler};
use crate::kubectl::Orchestrator;
use crate::progress::ProgressSink;

pub struct PodsHandler {
    orchestrator: Arc<dyn Orchestrator>,
}

impl PodsHandler {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

#[async_trait]
impl CommandHandler for PodsHandler {
    async fn execute(&self, sink: &dyn ProgressSink, args: &CommandArgs) -> Result<()> {
        sink.send("about to list pods").await;
        let outcome = self.orchestrator.list_workloads(args.flag("namespace")).await?;
        if !outcome.success {
            // Listing failures stay out of chat; only the local log sees
            // the raw output. The deploy path reports its failures to the
            // channel instead.
            tracing::warn!(output = %outcome.output, "pod listing failed");
            return Ok(());
        }
        sink.send(&format!("```{}```", outcome.output)).await;
        Ok(())
    }
}
