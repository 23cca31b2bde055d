//! ConversationStore trait: durable conversation history.
//!
//! The assistant touches a conversation at most twice per turn: one append for
//! the user message at the start, one for the assistant message at the end.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::identity::Principal;
use crate::message::{Conversation, ConversationId, ConversationScope, Message, Role};

/// Everything needed to open a new conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConversation {
    pub organization_id: String,
    pub user_id: String,
    pub title: String,
    pub scope: ConversationScope,
}

/// Ordering by creation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Oldest first
    #[default]
    Ascending,
    /// Newest first
    Descending,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Create a conversation and return it with its assigned id.
    async fn create(&self, new: NewConversation) -> Result<Conversation, StoreError>;

    /// Fetch a conversation header.
    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError>;

    /// Whether `owner` (user and organization) owns the conversation.
    /// Unknown ids are not owned.
    async fn belongs_to(&self, id: &ConversationId, owner: &Principal) -> Result<bool, StoreError>;

    /// Append an immutable message and bump the conversation's `updated_at`.
    async fn append(
        &self,
        id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError>;

    /// Messages of one conversation ordered by creation time, at most `limit`.
    async fn list_messages(
        &self,
        id: &ConversationId,
        order: SortOrder,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;

    /// The owner's conversations, most recently updated first.
    async fn list_conversations(
        &self,
        owner: &Principal,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError>;
}
