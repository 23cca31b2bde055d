//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field
//! - Native tool use with `tool_use` / `tool_result` content blocks
//! - Streaming via SSE, translated to typed [`ModelEvent`]s in [`crate::sse`]

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use dealroom_core::error::ProviderError;
use dealroom_core::message::{ContentBlock, ModelMessage};
use dealroom_core::provider::*;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::sse::{EventTranslator, Flow, LineBuffer};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const EVENT_BUFFER: usize = 64;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with the given whole-request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert the working history to Anthropic API messages.
    ///
    /// Tool results travel as a `user` message of `tool_result` blocks.
    /// Messages that would end up with no content are dropped, since the API
    /// rejects them.
    fn to_api_messages(messages: &[ModelMessage]) -> Vec<AnthropicMessage> {
        let mut result = Vec::new();

        for msg in messages {
            match msg {
                ModelMessage::User { content } => {
                    if content.is_empty() {
                        continue;
                    }
                    result.push(AnthropicMessage {
                        role: "user",
                        content: AnthropicContent::Text(content.clone()),
                    });
                }
                ModelMessage::Assistant { blocks } => {
                    let api_blocks: Vec<ApiBlock> = blocks
                        .iter()
                        .filter_map(|block| match block {
                            ContentBlock::Text { text } if text.is_empty() => None,
                            ContentBlock::Text { text } => Some(ApiBlock::Text { text: text.clone() }),
                            ContentBlock::ToolInvocation { id, name, input } => {
                                Some(ApiBlock::ToolUse {
                                    id: id.clone(),
                                    name: name.clone(),
                                    input: input.clone(),
                                })
                            }
                        })
                        .collect();
                    if api_blocks.is_empty() {
                        continue;
                    }
                    result.push(AnthropicMessage {
                        role: "assistant",
                        content: AnthropicContent::Blocks(api_blocks),
                    });
                }
                ModelMessage::ToolResults { results } => {
                    if results.is_empty() {
                        continue;
                    }
                    let api_blocks = results
                        .iter()
                        .map(|r| ApiBlock::ToolResult {
                            tool_use_id: r.call_id.clone(),
                            content: r.output.to_content(),
                            is_error: r.output.is_error(),
                        })
                        .collect();
                    result.push(AnthropicMessage {
                        role: "user",
                        content: AnthropicContent::Blocks(api_blocks),
                    });
                }
            }
        }

        result
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
            "stream": true,
        });

        if !request.system.is_empty() {
            body["system"] = serde_json::json!(request.system);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    /// Map a non-success status to the provider error taxonomy.
    async fn status_error(response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        match status {
            429 => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5);
                ProviderError::RateLimited { retry_after_secs }
            }
            401 | 403 => ProviderError::AuthenticationFailed("Invalid Anthropic API key".into()),
            _ => {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Anthropic API error");
                ProviderError::ApiError {
                    status_code: status,
                    message: error_body,
                }
            }
        }
    }
}

#[async_trait]
impl dealroom_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ModelEventStream, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::request_body(&request);

        debug!(
            provider = "anthropic",
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut translator = EventTranslator::default();
            let mut events = Vec::new();

            loop {
                // Dropping the receiver ends the upstream request
                let next = tokio::select! {
                    _ = tx.closed() => {
                        debug!("Model stream consumer went away, aborting request");
                        return;
                    }
                    next = byte_stream.next() => next,
                };

                let bytes = match next {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                    None => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(
                                "connection closed before message_stop".into(),
                            )))
                            .await;
                        return;
                    }
                };

                for line in lines.push(&bytes) {
                    let flow = translator.translate_line(&line, &mut events);
                    for event in events.drain(..) {
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                    match flow {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Finished) => return,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ApiBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}
