//! Turn orchestration for the Dealroom assistant.
//!
//! A turn takes one user message through:
//!
//! 1. **Resolve** the conversation (create it, or check the caller owns it)
//! 2. **Persist** the user message and load the history window
//! 3. **Loop** model calls and tool dispatch, streaming text as it arrives
//! 4. **Persist** the assistant's answer and finish the stream with `done`
//!
//! Turns on the same conversation are serialized. A turn that outlives its
//! timeout or loses its client is abandoned and nothing further is saved.

pub mod assembler;
pub mod controller;
pub mod locks;
pub mod prompt;
pub mod service;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use controller::{RoundController, RoundError, RoundOutcome, RoundSettings, TRUNCATION_NOTICE};
pub use locks::{TurnGuard, TurnLocks};
pub use prompt::{DefaultPromptBuilder, PromptContext, SystemPromptBuilder};
pub use service::{AssistantService, AssistantSettings, ChatRequest};
pub use stream_event::{OutputStreamer, StreamEvent};
