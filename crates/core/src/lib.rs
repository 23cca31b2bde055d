//! # Dealroom Core
//!
//! Domain types, traits, and error definitions for the Dealroom deal-tracking
//! assistant. This crate has **no framework dependencies**; it defines the
//! domain model that the provider, store, tool, assistant and gateway crates
//! implement against.
//!
//! ## Seams
//!
//! Every external collaborator of the assistant is a trait here:
//! - [`Provider`]: a streaming generative model
//! - [`Tool`]: one tenant-scoped capability the model may call
//! - [`ConversationStore`]: durable conversation history
//!
//! Implementations live in their respective crates.

pub mod error;
pub mod event;
pub mod identity;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use identity::{Principal, TenantScope};
pub use message::{
    ContentBlock, Conversation, ConversationId, ConversationScope, Message, ModelMessage, Role,
};
pub use provider::{
    BlockDelta, BlockKind, ModelEvent, ModelEventStream, Provider, ProviderRequest, ToolDefinition,
    Usage,
};
pub use store::{ConversationStore, NewConversation, SortOrder};
pub use tool::{Tool, ToolOutput, ToolRegistry, ToolResult};
