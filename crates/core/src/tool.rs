//! Tool trait and the dispatcher.
//!
//! Tools are the tenant-scoped capabilities the model may call: deal lookups,
//! pipeline statistics and the like. The [`ToolRegistry`] is the static
//! capability table; [`ToolRegistry::dispatch`] is the only way the assistant
//! runs a tool, and it always produces a value.

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::identity::TenantScope;
use crate::provider::ToolDefinition;

/// What a tool handed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "payload", rename_all = "snake_case")]
pub enum ToolOutput {
    Success(serde_json::Value),
    Error(String),
}

impl ToolOutput {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// The JSON value sent to the model: the payload itself, or
    /// `{"error": message}`.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Self::Success(value) => value.clone(),
            Self::Error(message) => serde_json::json!({ "error": message }),
        }
    }

    /// [`Self::to_value`] rendered as a JSON string.
    pub fn to_content(&self) -> String {
        self.to_value().to_string()
    }
}

/// The result of one invocation, linked back by correlation token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Equal to the originating invocation's id
    pub call_id: String,
    pub output: ToolOutput,
}

/// The core Tool trait.
///
/// Handlers receive the model-supplied input object and the caller's tenant
/// scope, and must only return data inside that scope.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "search_deals").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's input.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool.
    async fn execute(
        &self,
        input: serde_json::Value,
        scope: &TenantScope,
    ) -> Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The static capability table.
///
/// Keeps registration order so the advertised catalog is stable.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        match self.by_name.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.by_name.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.by_name.get(name).map(|&slot| self.tools[slot].as_ref())
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    /// All registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Run one tool against the caller's tenant scope.
    ///
    /// Never fails: an unknown name, a handler error and a handler panic all
    /// come back as [`ToolOutput::Error`].
    pub async fn dispatch(
        &self,
        name: &str,
        input: serde_json::Value,
        scope: &TenantScope,
    ) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            warn!(tool = %name, "Model requested an unknown tool");
            return ToolOutput::Error(format!("Unknown tool: {name}"));
        };

        let outcome = AssertUnwindSafe(tool.execute(input, scope))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(value)) => {
                debug!(tool = %name, "Tool succeeded");
                ToolOutput::Success(value)
            }
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "Tool returned an error");
                ToolOutput::Error(e.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "tool handler panicked".to_string());
                warn!(tool = %name, error = %message, "Tool panicked");
                ToolOutput::Error(message)
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
