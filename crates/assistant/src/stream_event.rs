//! Client-facing stream events and the streamer that emits them.
//!
//! The wire protocol is deliberately small:
//! - `text`: a fragment of assistant text, in order
//! - `done`: the turn finished and was saved
//! - `error`: the turn failed
//!
//! Exactly one of `done` / `error` ends every stream that got past validation.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events delivered to the client during a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A fragment of assistant text.
    Text { content: String },

    /// The turn completed; the assistant message is persisted.
    #[serde(rename_all = "camelCase")]
    Done { conversation_id: String },

    /// The turn failed.
    Error { content: String },
}

impl StreamEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Text { .. })
    }
}

/// The sending half of one turn's client stream.
///
/// `done` and `error` take `self`, so a turn cannot emit two terminal events;
/// the channel closes when the streamer is dropped.
#[derive(Debug)]
pub struct OutputStreamer {
    tx: mpsc::Sender<StreamEvent>,
}

impl OutputStreamer {
    /// Open a stream with room for `buffer` undelivered events.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Forward a text fragment. Returns `false` once the client is gone.
    pub async fn text(&self, fragment: impl Into<String>) -> bool {
        let content = fragment.into();
        if content.is_empty() {
            return !self.tx.is_closed();
        }
        self.tx.send(StreamEvent::Text { content }).await.is_ok()
    }

    /// End the stream successfully.
    pub async fn done(self, conversation_id: impl Into<String>) {
        let _ = self
            .tx
            .send(StreamEvent::Done {
                conversation_id: conversation_id.into(),
            })
            .await;
    }

    /// End the stream with a failure.
    pub async fn error(self, message: impl Into<String>) {
        let _ = self
            .tx
            .send(StreamEvent::Error {
                content: message.into(),
            })
            .await;
    }

    /// Resolves when the client has gone away.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
