//! The assistant service: one entry point per user message.
//!
//! [`AssistantService::start_turn`] validates the request and resolves the
//! conversation synchronously, then spawns the turn and hands back the event
//! receiver. Everything after that point is reported on the stream.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dealroom_config::AppConfig;
use dealroom_core::error::{Error, ProviderError, StoreError};
use dealroom_core::event::{DomainEvent, EventBus};
use dealroom_core::identity::Principal;
use dealroom_core::message::{
    Conversation, ConversationId, ConversationScope, Message, ModelMessage, Role, derive_title,
};
use dealroom_core::provider::{Provider, ToolDefinition};
use dealroom_core::store::{ConversationStore, NewConversation, SortOrder};
use dealroom_core::tool::ToolRegistry;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::controller::{RoundController, RoundError, RoundOutcome, RoundSettings};
use crate::locks::TurnLocks;
use crate::prompt::{DefaultPromptBuilder, PromptContext, SystemPromptBuilder};
use crate::stream_event::{OutputStreamer, StreamEvent};

/// Body of a chat request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Scopes a newly created conversation; ignored for existing ones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deal_id: Option<String>,
}

/// Tunables of the service.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub rounds: RoundSettings,
    /// Durable messages loaded as context, oldest first
    pub history_window: usize,
    pub turn_timeout: Duration,
    /// Undelivered events buffered per client stream
    pub stream_buffer: usize,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            rounds: RoundSettings::default(),
            history_window: 20,
            turn_timeout: Duration::from_secs(120),
            stream_buffer: 128,
        }
    }
}

impl AssistantSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            rounds: RoundSettings {
                model: config.provider.model.clone(),
                temperature: config.provider.temperature,
                max_tokens: Some(config.provider.max_tokens),
                max_rounds: config.assistant.max_rounds,
            },
            history_window: config.assistant.history_window,
            turn_timeout: Duration::from_secs(config.assistant.turn_timeout_secs),
            stream_buffer: config.assistant.stream_buffer,
        }
    }
}

/// Why a turn ended without `done`.
#[derive(Debug, thiserror::Error)]
enum TurnFailure {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("turn timed out")]
    TimedOut,

    #[error("client disconnected")]
    Disconnected,

    #[error("turn panicked: {0}")]
    Internal(String),
}

impl From<RoundError> for TurnFailure {
    fn from(e: RoundError) -> Self {
        match e {
            RoundError::Provider(e) => Self::Provider(e),
            RoundError::Disconnected => Self::Disconnected,
        }
    }
}

impl TurnFailure {
    /// What the client is told. Details stay in the logs.
    fn client_message(&self) -> String {
        match self {
            Self::TimedOut => "Response timed out".into(),
            Self::Provider(ProviderError::RateLimited { .. }) => {
                "The assistant is busy right now. Please try again in a moment.".into()
            }
            Self::Provider(_) => "The assistant could not complete a response.".into(),
            Self::Store(_) => "The conversation could not be saved.".into(),
            Self::Disconnected => "Client disconnected".into(),
            Self::Internal(_) => "Something went wrong while generating a response.".into(),
        }
    }
}

/// Orchestrates turns. Cheap to clone; every clone shares the same state.
#[derive(Clone)]
pub struct AssistantService {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    store: Arc<dyn ConversationStore>,
    prompts: Arc<dyn SystemPromptBuilder>,
    events: Arc<EventBus>,
    settings: Arc<AssistantSettings>,
    locks: TurnLocks,
}

impl AssistantService {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            store,
            prompts: Arc::new(DefaultPromptBuilder::new()),
            events: Arc::new(EventBus::default()),
            settings: Arc::new(settings),
            locks: TurnLocks::new(),
        }
    }

    /// Build with settings and prompt override taken from configuration.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        let service = Self::new(provider, tools, store, AssistantSettings::from_config(config));
        match &config.assistant.system_prompt_override {
            Some(base) => service.with_prompt_builder(Arc::new(DefaultPromptBuilder::with_base(base))),
            None => service,
        }
    }

    pub fn with_prompt_builder(mut self, prompts: Arc<dyn SystemPromptBuilder>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// The tool catalog advertised to the model.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.definitions()
    }

    /// Start a turn.
    ///
    /// Validation and ownership failures are returned here, before any event
    /// exists. On success the receiver yields zero or more `text` events and
    /// then exactly one `done` or `error`.
    pub async fn start_turn(
        &self,
        principal: Principal,
        request: ChatRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, Error> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(Error::Validation("message must not be empty".into()));
        }
        let message = message.to_string();

        let conversation = self
            .resolve_conversation(&principal, request.conversation_id.as_deref(), request.deal_id, &message)
            .await?;

        let (streamer, rx) = OutputStreamer::channel(self.settings.stream_buffer);
        let service = self.clone();
        tokio::spawn(async move {
            service.run_turn(principal, conversation, message, streamer).await;
        });
        Ok(rx)
    }

    async fn resolve_conversation(
        &self,
        principal: &Principal,
        conversation_id: Option<&str>,
        deal_id: Option<String>,
        first_message: &str,
    ) -> Result<Conversation, Error> {
        match conversation_id {
            Some(id) => {
                let id = ConversationId::from(id);
                if !self.store.belongs_to(&id, principal).await? {
                    return Err(Error::NotFound(format!("Conversation {id}")));
                }
                self.store
                    .get(&id)
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("Conversation {id}")))
            }
            None => {
                let scope = match deal_id.filter(|d| !d.trim().is_empty()) {
                    Some(deal_id) => ConversationScope::Deal { deal_id },
                    None => ConversationScope::Global,
                };
                let conversation = self
                    .store
                    .create(NewConversation {
                        organization_id: principal.organization_id.clone(),
                        user_id: principal.user_id.clone(),
                        title: derive_title(first_message),
                        scope,
                    })
                    .await?;
                info!(conversation_id = %conversation.id, "Started new conversation");
                Ok(conversation)
            }
        }
    }

    async fn run_turn(
        self,
        principal: Principal,
        conversation: Conversation,
        message: String,
        streamer: OutputStreamer,
    ) {
        let conversation_id = conversation.id.clone();
        self.events.publish(DomainEvent::TurnStarted {
            conversation_id: conversation_id.to_string(),
            organization_id: principal.organization_id.clone(),
            timestamp: Utc::now(),
        });

        let turn = async {
            match AssertUnwindSafe(self.execute(&principal, &conversation, &message, &streamer))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    Err(TurnFailure::Internal(message))
                }
            }
        };
        let result = tokio::select! {
            _ = streamer.closed() => Err(TurnFailure::Disconnected),
            timed = tokio::time::timeout(self.settings.turn_timeout, turn) => {
                timed.unwrap_or(Err(TurnFailure::TimedOut))
            }
        };

        match result {
            Ok(outcome) => {
                info!(
                    conversation_id = %conversation_id,
                    rounds = outcome.rounds,
                    tool_calls = outcome.tool_calls,
                    truncated = outcome.truncated,
                    tokens = outcome.usage.total(),
                    "Turn completed"
                );
                self.events.publish(DomainEvent::TurnCompleted {
                    conversation_id: conversation_id.to_string(),
                    rounds: outcome.rounds,
                    tool_calls: outcome.tool_calls,
                    truncated: outcome.truncated,
                    tokens_used: outcome.usage.total(),
                    timestamp: Utc::now(),
                });
                streamer.done(conversation_id.to_string()).await;
            }
            Err(failure) => {
                match &failure {
                    TurnFailure::Disconnected => {
                        info!(conversation_id = %conversation_id, "Client went away, turn abandoned")
                    }
                    other => warn!(conversation_id = %conversation_id, error = %other, "Turn failed"),
                }
                self.events.publish(DomainEvent::TurnFailed {
                    conversation_id: conversation_id.to_string(),
                    error_message: failure.to_string(),
                    timestamp: Utc::now(),
                });
                if !matches!(failure, TurnFailure::Disconnected) {
                    streamer.error(failure.client_message()).await;
                }
            }
        }
    }

    /// The turn body: everything between acquiring the conversation and
    /// saving the answer. Dropping this future abandons the turn.
    async fn execute(
        &self,
        principal: &Principal,
        conversation: &Conversation,
        message: &str,
        streamer: &OutputStreamer,
    ) -> Result<RoundOutcome, TurnFailure> {
        let _turn = self.locks.acquire(&conversation.id).await;

        let user_message = self
            .store
            .append(&conversation.id, Role::User, message)
            .await?;

        let window = self
            .store
            .list_messages(
                &conversation.id,
                SortOrder::Ascending,
                self.settings.history_window,
            )
            .await?;
        let mut history: Vec<ModelMessage> = window.iter().map(ModelMessage::from_stored).collect();
        // A full window of older messages can leave out the question itself
        if !window.iter().any(|m| m.id == user_message.id) {
            history.push(ModelMessage::user(message));
        }

        let system = self.prompts.build(&PromptContext {
            principal,
            scope: &conversation.scope,
            today: Utc::now().date_naive(),
        });

        let controller = RoundController::new(
            self.provider.as_ref(),
            &self.tools,
            &self.events,
            &self.settings.rounds,
        );
        let outcome = controller
            .run(&system, history, &principal.scope(), &conversation.id, streamer)
            .await?;

        self.store
            .append(&conversation.id, Role::Assistant, &outcome.text)
            .await?;
        Ok(outcome)
    }

    /// The caller's conversations, most recently active first.
    pub async fn list_conversations(
        &self,
        principal: &Principal,
        limit: usize,
    ) -> Result<Vec<Conversation>, Error> {
        Ok(self
            .store
            .list_conversations(principal, limit)
            .await?)
    }

    /// The transcript of one of the caller's conversations.
    pub async fn transcript(
        &self,
        principal: &Principal,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, Error> {
        let id = ConversationId::from(conversation_id);
        if !self.store.belongs_to(&id, principal).await? {
            return Err(Error::NotFound(format!("Conversation {id}")));
        }
        Ok(self
            .store
            .list_messages(&id, SortOrder::Ascending, limit)
            .await?)
    }
}
