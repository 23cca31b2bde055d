//! The round controller: the bounded model/tool loop of one turn.
//!
//! Each round:
//! 1. **Call** the model with the working history and tool catalog
//! 2. **Assemble** the streamed blocks, forwarding text to the client live
//! 3. **Decide**: no tool invocations means the turn is done
//! 4. **Dispatch** every invocation concurrently, append the assistant blocks
//!    and the tool results to the working history, and go again
//!
//! The loop stops after `max_rounds` rounds. The last round's tools are still
//! executed, but the model is not called again.

use std::time::Instant;

use chrono::Utc;
use dealroom_core::error::ProviderError;
use dealroom_core::event::{DomainEvent, EventBus};
use dealroom_core::identity::TenantScope;
use dealroom_core::message::{ContentBlock, ConversationId, ModelMessage};
use dealroom_core::provider::{ModelEvent, Provider, ProviderRequest, Usage};
use dealroom_core::tool::{ToolRegistry, ToolResult};
use futures::future::join_all;
use tracing::{debug, warn};

use crate::assembler::BlockAssembler;
use crate::stream_event::OutputStreamer;

/// Sent (and saved) when the round cap is hit before the model wrote anything.
pub const TRUNCATION_NOTICE: &str = "I wasn't able to finish answering within the allowed number \
of steps. Please try rephrasing or narrowing the question.";

/// Model parameters and the round cap.
#[derive(Debug, Clone)]
pub struct RoundSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub max_rounds: usize,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".into(),
            temperature: 0.3,
            max_tokens: Some(4096),
            max_rounds: 5,
        }
    }
}

/// What a finished loop produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundOutcome {
    /// Every text fragment streamed to the client, concatenated
    pub text: String,
    pub rounds: usize,
    pub tool_calls: usize,
    /// The round cap ended the loop
    pub truncated: bool,
    pub usage: Usage,
}

#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("client disconnected")]
    Disconnected,
}

pub struct RoundController<'a> {
    provider: &'a dyn Provider,
    tools: &'a ToolRegistry,
    events: &'a EventBus,
    settings: &'a RoundSettings,
}

impl<'a> RoundController<'a> {
    pub fn new(
        provider: &'a dyn Provider,
        tools: &'a ToolRegistry,
        events: &'a EventBus,
        settings: &'a RoundSettings,
    ) -> Self {
        Self {
            provider,
            tools,
            events,
            settings,
        }
    }

    /// Run the loop over `history` (the durable window plus the new user
    /// message) until the model stops asking for tools or the cap is hit.
    pub async fn run(
        &self,
        system: &str,
        mut history: Vec<ModelMessage>,
        scope: &TenantScope,
        conversation_id: &ConversationId,
        out: &OutputStreamer,
    ) -> Result<RoundOutcome, RoundError> {
        let definitions = self.tools.definitions();
        let mut outcome = RoundOutcome::default();

        for round in 1..=self.settings.max_rounds {
            outcome.rounds = round;
            debug!(
                conversation_id = %conversation_id,
                round,
                history = history.len(),
                "Calling model"
            );

            let request = ProviderRequest {
                model: self.settings.model.clone(),
                system: system.to_string(),
                messages: history.clone(),
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
                tools: definitions.clone(),
            };
            let mut stream = self.provider.stream(request).await?;

            let mut assembler = BlockAssembler::new();
            while let Some(item) = stream.recv().await {
                match item? {
                    ModelEvent::TurnDelta { stop_reason, usage } => {
                        if let Some(usage) = usage {
                            outcome.usage.add(usage);
                        }
                        if let Some(reason) = stop_reason {
                            debug!(conversation_id = %conversation_id, round, stop_reason = %reason, "Model finished");
                        }
                    }
                    event => {
                        if let Some(fragment) = assembler.apply(event) {
                            outcome.text.push_str(&fragment);
                            if !out.text(fragment).await {
                                return Err(RoundError::Disconnected);
                            }
                        }
                    }
                }
            }

            let blocks = assembler.finish();
            let invocations: Vec<(&str, &str, &serde_json::Value)> = blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolInvocation { id, name, input } => {
                        Some((id.as_str(), name.as_str(), input))
                    }
                    ContentBlock::Text { .. } => None,
                })
                .collect();

            if invocations.is_empty() {
                return Ok(outcome);
            }

            outcome.tool_calls += invocations.len();
            let results = join_all(invocations.iter().map(|(id, name, input)| {
                self.dispatch(conversation_id, id, name, (*input).clone(), scope)
            }))
            .await;

            history.push(ModelMessage::Assistant { blocks: blocks.clone() });
            history.push(ModelMessage::ToolResults { results });

            if round == self.settings.max_rounds {
                warn!(
                    conversation_id = %conversation_id,
                    rounds = round,
                    "Round limit reached with tool calls outstanding"
                );
                outcome.truncated = true;
            }
        }

        if outcome.truncated && outcome.text.is_empty() {
            outcome.text = TRUNCATION_NOTICE.to_string();
            if !out.text(TRUNCATION_NOTICE).await {
                return Err(RoundError::Disconnected);
            }
        }

        Ok(outcome)
    }

    async fn dispatch(
        &self,
        conversation_id: &ConversationId,
        call_id: &str,
        name: &str,
        input: serde_json::Value,
        scope: &TenantScope,
    ) -> ToolResult {
        debug!(conversation_id = %conversation_id, tool = %name, "Dispatching tool");
        let start = Instant::now();
        let output = self.tools.dispatch(name, input, scope).await;

        self.events.publish(DomainEvent::ToolExecuted {
            conversation_id: conversation_id.to_string(),
            tool_name: name.to_string(),
            success: !output.is_error(),
            duration_ms: start.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        ToolResult {
            call_id: call_id.to_string(),
            output,
        }
    }
}
