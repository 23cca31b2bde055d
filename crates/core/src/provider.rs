//! Provider trait: the abstraction over streaming model backends.
//!
//! A Provider opens one streaming call per round and exposes it as an ordered
//! sequence of typed [`ModelEvent`]s. For any block index the sequence is
//! `BlockStart → BlockDelta* → BlockStop`; different indices may interleave.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::ModelMessage;

/// One request to the model: a full round's worth of context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "claude-sonnet-4-20250514")
    pub model: String,

    /// System instructions, sent out of band from the history
    pub system: String,

    /// The working history (durable window plus this turn's rounds)
    pub messages: Vec<ModelMessage>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Tool catalog advertised to the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.3
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    /// What the tool does, in words the model can act on
    pub description: String,

    /// JSON Schema of the tool input
    pub parameters: serde_json::Value,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// What kind of content a block carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    Text,
    ToolUse { id: String, name: String },
}

/// A fragment belonging to one open block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "fragment", rename_all = "snake_case")]
pub enum BlockDelta {
    /// Verbatim text to append
    Text(String),
    /// A raw substring of the tool input JSON
    Json(String),
}

/// One incremental event of a streaming model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModelEvent {
    BlockStart { index: usize, kind: BlockKind },
    BlockDelta { index: usize, delta: BlockDelta },
    BlockStop { index: usize },
    TurnDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stop_reason: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
}

/// The receiving half of one streaming call.
///
/// A mid-flight failure arrives as a single `Err` item, after which the
/// channel closes. Dropping the receiver cancels the call.
pub type ModelEventStream = mpsc::Receiver<Result<ModelEvent, ProviderError>>;

/// The core Provider trait.
///
/// Implementations are constructed once at startup and shared behind an
/// `Arc<dyn Provider>`; they hold no per-turn state.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "anthropic").
    fn name(&self) -> &str;

    /// Open one streaming call.
    ///
    /// Errors establishing the call (network, auth, non-2xx status) are
    /// returned here; nothing is sent on the stream in that case.
    async fn stream(&self, request: ProviderRequest) -> Result<ModelEventStream, ProviderError>;

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
