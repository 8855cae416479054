//! Per-invocation output channels for command handlers.

use async_trait::async_trait;

/// Write-only progress channel bound to the invoking message's source
/// channel. Every call forwards text immediately as a new outbound chat
/// message; delivery failures are the transport's problem, not the
/// handler's, so `send` is fire-and-forget.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn send(&self, text: &str);
}

/// Accumulates framework-level text (usage, unknown-command errors)
/// produced while dispatching one invocation. The event loop flushes a
/// non-empty buffer as a single fenced chat message after dispatch.
#[derive(Debug, Default)]
pub struct CapturedBuffer {
    buffer: String,
}

impl CapturedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_line(&mut self, text: &str) {
        self.buffer.push_str(text);
        self.buffer.push('\n');
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::ProgressSink;

    /// Captures progress messages in memory for assertions.
    #[derive(Debug, Default)]
    pub(crate) struct MemorySink {
        messages: Mutex<Vec<String>>,
    }

    impl MemorySink {
        pub(crate) fn messages(&self) -> Vec<String> {
            self.messages.lock().expect("sink lock").clone()
        }
    }

    #[async_trait]
    impl ProgressSink for MemorySink {
        async fn send(&self, text: &str) {
            self.messages
                .lock()
                .expect("sink lock")
                .push(text.to_string());
        }
    }
}
