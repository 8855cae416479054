//! Fixed-table command dispatch with string-flag parsing.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use shipbot_core::DeployTarget;

use crate::deploy_command::DeployHandler;
use crate::github_commits::SourceControl;
use crate::kubectl::Orchestrator;
use crate::pods_command::PodsHandler;
use crate::progress::{CapturedBuffer, ProgressSink};

/// Parsed invocation arguments: declared `--flag value` pairs plus any
/// remaining positional tokens.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CommandArgs {
    flags: HashMap<String, String>,
    positional: Vec<String>,
}

impl CommandArgs {
    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).map(String::as_str)
    }

    pub fn positional(&self) -> &[String] {
        &self.positional
    }
}

/// A handler executes one command against the progress sink. Returning an
/// error never reaches chat; user-facing feedback is the handler's own
/// responsibility before it returns.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(&self, sink: &dyn ProgressSink, args: &CommandArgs) -> Result<()>;
}

struct CommandSpec {
    name: &'static str,
    flags: &'static [&'static str],
    handler: Arc<dyn CommandHandler>,
}

/// String-keyed registry mapping command name to handler plus declared
/// flags. The table is fixed at startup; per-invocation state (sink,
/// captured buffer) is passed into `dispatch` explicitly.
pub struct CommandRouter {
    commands: Vec<CommandSpec>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// The production command table: `pods` and `deploy`.
    pub fn with_standard_commands(
        source_control: Arc<dyn SourceControl>,
        orchestrator: Arc<dyn Orchestrator>,
        target: DeployTarget,
    ) -> Self {
        let mut router = Self::new();
        router.register(
            "pods",
            &["namespace"],
            Arc::new(PodsHandler::new(orchestrator.clone())),
        );
        router.register(
            "deploy",
            &[],
            Arc::new(DeployHandler::new(source_control, orchestrator, target)),
        );
        router
    }

    pub fn register(
        &mut self,
        name: &'static str,
        flags: &'static [&'static str],
        handler: Arc<dyn CommandHandler>,
    ) {
        self.commands.push(CommandSpec {
            name,
            flags,
            handler,
        });
    }

    pub fn usage(&self) -> String {
        let mut lines = vec!["supported commands:".to_string()];
        for spec in &self.commands {
            let flags = spec
                .flags
                .iter()
                .map(|flag| format!(" [--{flag} <value>]"))
                .collect::<String>();
            lines.push(format!("- !{}{}", spec.name, flags));
        }
        lines.join("\n")
    }

    /// Dispatches `[name, ...args]`. Unknown commands and malformed flags
    /// write usage text into `captured`; handler errors are logged and
    /// swallowed so a failing command can never tear down the event loop.
    pub async fn dispatch(
        &self,
        tokens: &[String],
        sink: &dyn ProgressSink,
        captured: &mut CapturedBuffer,
    ) {
        let Some(name) = tokens.first() else {
            captured.write_line(&self.usage());
            return;
        };
        let Some(spec) = self.commands.iter().find(|spec| spec.name == name) else {
            captured.write_line(&format!("unknown command: {name}"));
            captured.write_line(&self.usage());
            return;
        };
        let args = match parse_args(spec.flags, &tokens[1..]) {
            Ok(args) => args,
            Err(message) => {
                captured.write_line(&format!("incorrect usage of {name}: {message}"));
                captured.write_line(&self.usage());
                return;
            }
        };
        if let Err(error) = spec.handler.execute(sink, &args).await {
            tracing::warn!(command = spec.name, "command failed: {error:#}");
        }
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_args(declared: &[&str], tokens: &[String]) -> Result<CommandArgs, String> {
    let mut flags = HashMap::new();
    let mut positional = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        let token = &tokens[index];
        if let Some(flag) = token.strip_prefix("--") {
            if let Some((name, value)) = flag.split_once('=') {
                if !declared.contains(&name) {
                    return Err(format!("unknown flag --{name}"));
                }
                flags.insert(name.to_string(), value.to_string());
            } else {
                if !declared.contains(&flag) {
                    return Err(format!("unknown flag --{flag}"));
                }
                let value = tokens
                    .get(index + 1)
                    .ok_or_else(|| format!("flag --{flag} requires a value"))?;
                flags.insert(flag.to_string(), value.clone());
                index += 1;
            }
        } else {
            positional.push(token.clone());
        }
        index += 1;
    }
    Ok(CommandArgs { flags, positional })
}
