//! In-memory store: useful for testing and ephemeral sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use dealroom_core::error::StoreError;
use dealroom_core::identity::Principal;
use dealroom_core::message::{Conversation, ConversationId, Message, Role};
use dealroom_core::store::{ConversationStore, NewConversation, SortOrder};
use tokio::sync::RwLock;
use uuid::Uuid;

struct Entry {
    conversation: Conversation,
    messages: Vec<Message>,
    /// Bumped on every append; breaks `updated_at` ties
    touched: u64,
}

#[derive(Default)]
struct State {
    conversations: HashMap<String, Entry>,
    clock: u64,
}

/// A conversation store that keeps everything in a `HashMap`.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create(&self, new: NewConversation) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            organization_id: new.organization_id,
            user_id: new.user_id,
            scope: new.scope,
            title: new.title,
            created_at: now,
            updated_at: now,
        };

        let mut state = self.state.write().await;
        state.clock += 1;
        let touched = state.clock;
        state.conversations.insert(
            conversation.id.as_str().to_string(),
            Entry {
                conversation: conversation.clone(),
                messages: Vec::new(),
                touched,
            },
        );
        Ok(conversation)
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .get(id.as_str())
            .map(|e| e.conversation.clone()))
    }

    async fn belongs_to(&self, id: &ConversationId, owner: &Principal) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .conversations
            .get(id.as_str())
            .is_some_and(|e| owned_by(&e.conversation, owner)))
    }

    async fn append(
        &self,
        id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        let mut state = self.state.write().await;
        state.clock += 1;
        let clock = state.clock;
        let entry = state
            .conversations
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: id.clone(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        entry.conversation.updated_at = message.created_at;
        entry.touched = clock;
        entry.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        id: &ConversationId,
        order: SortOrder,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let state = self.state.read().await;
        let Some(entry) = state.conversations.get(id.as_str()) else {
            return Ok(Vec::new());
        };
        // Messages are pushed in creation order
        let messages = match order {
            SortOrder::Ascending => entry.messages.iter().take(limit).cloned().collect(),
            SortOrder::Descending => entry.messages.iter().rev().take(limit).cloned().collect(),
        };
        Ok(messages)
    }

    async fn list_conversations(
        &self,
        owner: &Principal,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let state = self.state.read().await;
        let mut owned: Vec<&Entry> = state
            .conversations
            .values()
            .filter(|e| owned_by(&e.conversation, owner))
            .collect();
        owned.sort_by(|a, b| {
            b.conversation
                .updated_at
                .cmp(&a.conversation.updated_at)
                .then(b.touched.cmp(&a.touched))
        });
        Ok(owned
            .into_iter()
            .take(limit)
            .map(|e| e.conversation.clone())
            .collect())
    }
}

fn owned_by(conversation: &Conversation, owner: &Principal) -> bool {
    conversation.user_id == owner.user_id && conversation.organization_id == owner.organization_id
}
