//! HTTP API v1: the assistant's client surface.
//!
//! Endpoints:
//!
//! - `POST /v1/chat/stream`: Send a message, get an SSE stream
//! - `GET  /v1/conversations`: The caller's conversations
//! - `GET  /v1/conversations/{id}/messages`: One conversation's transcript
//! - `GET  /v1/tools`: The tool catalog
//!
//! Every handler runs behind the auth middleware and reads the resolved
//! [`Principal`] from the request extensions.

use axum::{
    Extension, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use dealroom_assistant::ChatRequest;
use dealroom_core::error::Error;
use dealroom_core::identity::Principal;
use dealroom_core::message::{Conversation, Message, Role};

use crate::SharedState;

const DEFAULT_PAGE: usize = 50;
const MAX_PAGE: usize = 200;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat/stream", post(chat_stream_handler))
        .route("/conversations", get(list_conversations_handler))
        .route("/conversations/{id}/messages", get(list_messages_handler))
        .route("/tools", get(list_tools_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    limit: Option<usize>,
}

impl PageParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationDto {
    id: String,
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    deal_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Conversation> for ConversationDto {
    fn from(c: Conversation) -> Self {
        Self {
            deal_id: c.scope.deal_id().map(str::to_string),
            id: c.id.to_string(),
            title: c.title,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationListResponse {
    conversations: Vec<ConversationDto>,
    count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageDto {
    id: String,
    role: Role,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<Message> for MessageDto {
    fn from(m: Message) -> Self {
        Self {
            id: m.id,
            role: m.role,
            content: m.content,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    conversation_id: String,
    messages: Vec<MessageDto>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
    count: usize,
}

/// Map a domain error onto a status code and a client-safe message.
pub(crate) fn error_response(err: Error) -> (StatusCode, Json<ErrorResponse>) {
    let (status, message) = match err {
        Error::Validation(message) => (StatusCode::BAD_REQUEST, message),
        Error::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
        other => {
            error!(error = %other, "Request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    };
    (status, Json(ErrorResponse { error: message }))
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /v1/chat/stream`: Send a message, receive an SSE stream of events.
///
/// Validation and ownership failures are plain JSON errors; once the stream
/// is open every outcome is reported as an event.
async fn chat_stream_handler(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<ChatRequest>,
) -> Result<
    Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>,
    (StatusCode, Json<ErrorResponse>),
> {
    info!(
        user_id = %principal.user_id,
        conversation_id = payload.conversation_id.as_deref().unwrap_or("new"),
        "v1/chat/stream request"
    );

    let rx = state
        .assistant
        .start_turn(principal, payload)
        .await
        .map_err(error_response)?;

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// `GET /v1/conversations`: The caller's conversations, most recent first.
async fn list_conversations_handler(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<PageParams>,
) -> Result<Json<ConversationListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let conversations: Vec<ConversationDto> = state
        .assistant
        .list_conversations(&principal, params.limit())
        .await
        .map_err(error_response)?
        .into_iter()
        .map(ConversationDto::from)
        .collect();

    Ok(Json(ConversationListResponse {
        count: conversations.len(),
        conversations,
    }))
}

/// `GET /v1/conversations/{id}/messages`: Transcript, oldest first.
async fn list_messages_handler(
    State(state): State<SharedState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<MessageListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let messages = state
        .assistant
        .transcript(&principal, &id, params.limit())
        .await
        .map_err(error_response)?;

    Ok(Json(MessageListResponse {
        conversation_id: id,
        messages: messages.into_iter().map(MessageDto::from).collect(),
    }))
}

/// `GET /v1/tools`: What the assistant can look up.
async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolInfo> = state
        .assistant
        .tool_definitions()
        .into_iter()
        .map(|d| ToolInfo {
            name: d.name,
            description: d.description,
            parameters: d.parameters,
        })
        .collect();

    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}
