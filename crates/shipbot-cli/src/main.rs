//! shipbot binary: argument parsing, logging setup, and runtime wiring.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use shipbot_commands::{CommandRouter, GithubCommitsClient, KubectlCli};
use shipbot_core::{BotConfig, DeployTarget};
use shipbot_slack_runtime::run_deploy_bridge;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "shipbot",
    about = "Slack-operated Kubernetes deployment bot",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "SLACK_TOKEN",
        help = "Slack bot token used for the Web API and Socket Mode"
    )]
    slack_token: String,
    #[arg(
        long,
        env = "GITHUB_TOKEN",
        help = "GitHub token used to list repository commits"
    )]
    github_token: String,
    #[arg(
        long,
        env = "GITHUB_ORG",
        help = "GitHub organization owning the deployed repository"
    )]
    github_org: String,
    #[arg(
        long,
        env = "GITHUB_REPO",
        help = "GitHub repository whose latest commit gets deployed"
    )]
    github_repo: String,
    #[arg(
        long,
        env = "DOCKER_IMAGE_PREFIX",
        help = "Container image name prefix; the short revision becomes the tag"
    )]
    image_prefix: String,
    #[arg(
        long,
        env = "K8S_NAMESPACE",
        help = "Kubernetes namespace of the managed deployment"
    )]
    kube_namespace: String,
    #[arg(
        long,
        env = "K8S_DEPLOYMENT",
        help = "Kubernetes deployment receiving image updates"
    )]
    kube_deployment: String,
    #[arg(
        long,
        env = "SLACK_API_BASE",
        default_value = "https://slack.com/api",
        help = "Slack Web API base URL"
    )]
    slack_api_base: String,
    #[arg(
        long,
        env = "GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub REST API base URL"
    )]
    github_api_base: String,
    #[arg(
        long,
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Per-request HTTP timeout in milliseconds"
    )]
    request_timeout_ms: u64,
    #[arg(
        long,
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Maximum attempts for retryable HTTP failures"
    )]
    retry_max_attempts: usize,
    #[arg(
        long,
        default_value_t = 200,
        value_parser = parse_positive_u64,
        help = "Base delay in milliseconds for HTTP retry backoff"
    )]
    retry_base_delay_ms: u64,
    #[arg(
        long,
        default_value_t = 5_000,
        value_parser = parse_positive_u64,
        help = "Delay in milliseconds before reconnecting a dropped socket"
    )]
    reconnect_delay_ms: u64,
}

fn bot_config_from_cli(cli: Cli) -> BotConfig {
    BotConfig {
        slack_token: cli.slack_token,
        github_token: cli.github_token,
        target: DeployTarget {
            github_org: cli.github_org,
            github_repo: cli.github_repo,
            image_prefix: cli.image_prefix,
            kube_namespace: cli.kube_namespace,
            kube_deployment: cli.kube_deployment,
        },
        slack_api_base: cli.slack_api_base,
        github_api_base: cli.github_api_base,
        request_timeout_ms: cli.request_timeout_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_base_delay_ms: cli.retry_base_delay_ms,
        reconnect_delay_ms: cli.reconnect_delay_ms,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = bot_config_from_cli(cli);
    config.validate()?;

    let source_control = Arc::new(GithubCommitsClient::new(
        config.github_api_base.clone(),
        config.github_token.clone(),
        config.request_timeout_ms,
        config.retry_max_attempts,
        config.retry_base_delay_ms,
    )?);
    let orchestrator = Arc::new(KubectlCli::new());
    let router =
        CommandRouter::with_standard_commands(source_control, orchestrator, config.target.clone());
    run_deploy_bridge(&config, router).await
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(error) = run().await {
        tracing::error!("shipbot failed: {error:#}");
        std::process::exit(1);
    }
}
