//! Socket Mode runtime: resolve identity, guard the single channel, then
//! consume the event feed one message at a time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use shipbot_commands::{CapturedBuffer, CommandRouter, ProgressSink};
use shipbot_core::BotConfig;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

mod slack_api_client;

use slack_api_client::{SlackApiClient, SlackChannel};

const COMMAND_MARKER: char = '!';
const GREETING: &str = "Hi there";

#[derive(Debug, Clone, Deserialize)]
struct SocketEnvelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Debug, Deserialize)]
struct EventCallbackEnvelope {
    #[serde(rename = "type")]
    callback_type: String,
    #[serde(default)]
    event: MessageEventPayload,
}

#[derive(Debug, Default, Deserialize)]
struct MessageEventPayload {
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    channel: Option<String>,
}

/// A chat message as the dispatch path sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct InboundMessage {
    channel: String,
    user: String,
    text: String,
}

/// Runs the deploy bridge until ctrl-c. Startup failures (auth, channel
/// guard) surface here before any event is consumed.
pub async fn run_deploy_bridge(config: &BotConfig, router: CommandRouter) -> Result<()> {
    let mut runtime = SlackDeployRuntime::connect(config, router).await?;
    runtime.run().await
}

pub struct SlackDeployRuntime {
    client: SlackApiClient,
    router: Arc<CommandRouter>,
    bot_user_id: String,
    active_channel: String,
    reconnect_delay: Duration,
}

impl std::fmt::Debug for SlackDeployRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackDeployRuntime")
            .field("bot_user_id", &self.bot_user_id)
            .field("active_channel", &self.active_channel)
            .field("reconnect_delay", &self.reconnect_delay)
            .finish_non_exhaustive()
    }
}

impl SlackDeployRuntime {
    /// Authenticates, lists channels, and enforces the single-channel
    /// invariant. Fails before any event is processed if the bot is a
    /// member of zero or more than one channel.
    pub async fn connect(config: &BotConfig, router: CommandRouter) -> Result<Self> {
        let client = SlackApiClient::new(
            config.slack_api_base.clone(),
            config.slack_token.clone(),
            config.request_timeout_ms,
            config.retry_max_attempts,
            config.retry_base_delay_ms,
        )?;
        let bot_user_id = client.auth_test().await?;
        let channels = client.list_channels(true).await?;
        let active_channel = select_active_channel(&channels)?;
        tracing::info!(user = %bot_user_id, channel = %active_channel, "slack identity resolved");
        Ok(Self {
            client,
            router: Arc::new(router),
            bot_user_id,
            active_channel,
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms.max(1)),
        })
    }

    pub fn active_channel(&self) -> &str {
        &self.active_channel
    }

    pub async fn run(&mut self) -> Result<()> {
        loop {
            let socket_url = match self.client.open_socket_connection().await {
                Ok(url) => url,
                Err(error) => {
                    tracing::warn!("failed to open slack socket connection: {error:#}");
                    if self.pause_or_shutdown().await {
                        return Ok(());
                    }
                    continue;
                }
            };

            tracing::info!("slack socket connected");
            if let Err(error) = self.run_socket_session(&socket_url).await {
                tracing::warn!("slack socket session error: {error:#}");
            }
            if self.pause_or_shutdown().await {
                return Ok(());
            }
        }
    }

    /// Waits out the reconnect delay; true means ctrl-c arrived and the
    /// caller should exit instead of reconnecting.
    async fn pause_or_shutdown(&self) -> bool {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                true
            }
            _ = tokio::time::sleep(self.reconnect_delay) => false,
        }
    }

    async fn run_socket_session(&mut self, socket_url: &str) -> Result<()> {
        let (stream, _response) = connect_async(socket_url)
            .await
            .context("failed to connect slack socket mode websocket")?;
        let (mut sink, mut source) = stream.split();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    return Ok(());
                }
                maybe_message = source.next() => {
                    let Some(message_result) = maybe_message else {
                        return Ok(());
                    };
                    let message = message_result.context("failed reading slack websocket message")?;
                    let Some(envelope) = parse_socket_envelope(message)? else {
                        continue;
                    };
                    if let Some(envelope_id) = envelope.envelope_id.as_deref() {
                        ack_envelope(&mut sink, envelope_id).await?;
                    }
                    // Dispatch completes before the next event is read, so
                    // at most one command (and one deployment) is ever in
                    // flight.
                    self.handle_envelope(envelope).await;
                }
            }
        }
    }

    async fn handle_envelope(&self, envelope: SocketEnvelope) {
        match envelope.envelope_type.as_str() {
            "hello" => {
                if let Err(error) = self
                    .client
                    .post_message(&self.active_channel, GREETING)
                    .await
                {
                    tracing::warn!("failed to send greeting: {error:#}");
                }
            }
            "events_api" => match normalize_message_event(&envelope.payload) {
                Ok(Some(message)) => self.handle_message(message).await,
                Ok(None) => {}
                Err(error) => tracing::warn!("failed to decode slack event: {error:#}"),
            },
            other => tracing::debug!(kind = other, "ignoring slack envelope"),
        }
    }

    async fn handle_message(&self, message: InboundMessage) {
        let Some(line) = command_line(&self.bot_user_id, &message) else {
            return;
        };
        let sink = SlackProgressSink {
            client: self.client.clone(),
            channel: message.channel.clone(),
        };
        let tokens = match shell_words::split(line) {
            Ok(tokens) => tokens,
            Err(error) => {
                sink.send(&format!("error: {error}")).await;
                return;
            }
        };
        let mut captured = CapturedBuffer::new();
        self.router.dispatch(&tokens, &sink, &mut captured).await;
        if !captured.is_empty() {
            sink.send(&format!("```{}```", captured.as_str())).await;
        }
    }
}

/// Posts each progress line to the invoking message's channel as its own
/// outbound message. Delivery failures are logged, never propagated.
struct SlackProgressSink {
    client: SlackApiClient,
    channel: String,
}

#[async_trait]
impl ProgressSink for SlackProgressSink {
    async fn send(&self, text: &str) {
        if let Err(error) = self.client.post_message(&self.channel, text).await {
            tracing::warn!(channel = %self.channel, "failed to send progress message: {error:#}");
        }
    }
}

/// Exactly one member channel determines where the bot speaks; zero or
/// several means there is no authoritative channel and startup must fail.
fn select_active_channel(channels: &[SlackChannel]) -> Result<String> {
    let member = channels
        .iter()
        .filter(|channel| channel.is_member)
        .collect::<Vec<_>>();
    if member.len() != 1 {
        bail!("must only be in one channel (member of {})", member.len());
    }
    Ok(member[0].id.clone())
}

/// Anti-echo plus command gating: drops the bot's own messages and any
/// text without the command marker, and strips the marker otherwise.
fn command_line<'a>(own_user_id: &str, message: &'a InboundMessage) -> Option<&'a str> {
    if message.user == own_user_id {
        return None;
    }
    message.text.strip_prefix(COMMAND_MARKER)
}

fn parse_socket_envelope(message: WsMessage) -> Result<Option<SocketEnvelope>> {
    match message {
        WsMessage::Text(text) => {
            let envelope = serde_json::from_str::<SocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Binary(bytes) => {
            let text =
                String::from_utf8(bytes.to_vec()).context("invalid utf-8 slack socket payload")?;
            let envelope = serde_json::from_str::<SocketEnvelope>(&text)
                .context("failed to parse slack socket envelope")?;
            Ok(Some(envelope))
        }
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            Ok(None)
        }
    }
}

async fn ack_envelope<S>(sink: &mut S, envelope_id: &str) -> Result<()>
where
    S: futures_util::Sink<WsMessage> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let ack = json!({ "envelope_id": envelope_id }).to_string();
    sink.send(WsMessage::Text(ack.into()))
        .await
        .context("failed to send slack socket ack")
}

fn normalize_message_event(payload: &Value) -> Result<Option<InboundMessage>> {
    let callback = serde_json::from_value::<EventCallbackEnvelope>(payload.clone())
        .context("failed to decode slack event callback payload")?;
    if callback.callback_type != "event_callback" {
        return Ok(None);
    }
    let event = callback.event;
    if event.event_type != "message" {
        return Ok(None);
    }
    if event.subtype.as_deref() == Some("bot_message") {
        return Ok(None);
    }
    let (Some(user), Some(channel), Some(text)) = (event.user, event.channel, event.text) else {
        return Ok(None);
    };
    if user.trim().is_empty() || channel.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(InboundMessage {
        channel,
        user,
        text,
    }))
}
