//! Conversation, Message and model-facing content types.
//!
//! Two families live here:
//! - durable records ([`Conversation`], [`Message`]) that the store persists;
//! - transient, round-scoped values ([`ContentBlock`], [`ModelMessage`]) that
//!   only exist while a turn is running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tool::ToolResult;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a durable message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// What a conversation is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversationScope {
    /// General questions across the whole pipeline.
    Global,
    /// Bound to a single deal.
    Deal { deal_id: String },
}

impl ConversationScope {
    pub fn deal_id(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Deal { deal_id } => Some(deal_id),
        }
    }
}

/// A persisted conversation header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,

    /// Owning organization (tenant)
    pub organization_id: String,

    /// Owning user; the only principal allowed to read or append
    pub user_id: String,

    pub scope: ConversationScope,

    pub title: String,

    pub created_at: DateTime<Utc>,

    /// When the last message was appended
    pub updated_at: DateTime<Utc>,
}

/// A single immutable transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: ConversationId,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Maximum title length in characters.
const TITLE_MAX_CHARS: usize = 60;

/// Derive a conversation title from the first user message.
///
/// Whitespace runs collapse to single spaces; long messages are cut at
/// [`TITLE_MAX_CHARS`] characters and end with an ellipsis.
pub fn derive_title(first_message: &str) -> String {
    let collapsed = first_message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= TITLE_MAX_CHARS {
        return collapsed;
    }
    let mut title: String = collapsed.chars().take(TITLE_MAX_CHARS - 1).collect();
    title.truncate(title.trim_end().len());
    title.push('…');
    title
}

// ── Transient, round-scoped content ─────────────────────────────────────

/// One finalized unit of a model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Free text
    Text { text: String },

    /// A request to run a named tool
    ToolInvocation {
        /// Correlation token, echoed back on the matching result
        id: String,
        name: String,
        /// Always a JSON object
        input: serde_json::Value,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn is_tool_invocation(&self) -> bool {
        matches!(self, Self::ToolInvocation { .. })
    }
}

/// One entry of the working history resent to the model every round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ModelMessage {
    /// A user turn (text only)
    User { content: String },

    /// An assistant turn, kept as structured blocks
    Assistant { blocks: Vec<ContentBlock> },

    /// The synthetic turn answering every invocation of the previous
    /// assistant turn, in invocation order
    ToolResults { results: Vec<ToolResult> },
}

impl ModelMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::Assistant {
            blocks: vec![ContentBlock::text(content)],
        }
    }

    /// Map a durable transcript entry onto the model history.
    pub fn from_stored(message: &Message) -> Self {
        match message.role {
            Role::User => Self::user(message.content.clone()),
            Role::Assistant => Self::assistant_text(message.content.clone()),
        }
    }
}
