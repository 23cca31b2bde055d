//! Checklist tool: diligence items of one deal.

use std::sync::Arc;

use async_trait::async_trait;
use dealroom_core::error::ToolError;
use dealroom_core::identity::TenantScope;
use dealroom_core::tool::Tool;

use crate::directory::DealDirectory;

pub struct ListChecklistItemsTool {
    directory: Arc<dyn DealDirectory>,
}

impl ListChecklistItemsTool {
    pub fn new(directory: Arc<dyn DealDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Tool for ListChecklistItemsTool {
    fn name(&self) -> &str {
        "list_checklist_items"
    }

    fn description(&self) -> &str {
        "List the diligence checklist items of a deal, optionally only the open ones."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "deal_id": {
                    "type": "string",
                    "description": "The deal id"
                },
                "open_only": {
                    "type": "boolean",
                    "description": "Only return items that are not completed (default false)",
                    "default": false
                }
            },
            "required": ["deal_id"]
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        scope: &TenantScope,
    ) -> Result<serde_json::Value, ToolError> {
        let deal_id = arguments["deal_id"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'deal_id' argument".into()))?;
        let open_only = arguments["open_only"].as_bool().unwrap_or(false);

        let items = self
            .directory
            .checklist(&scope.organization_id, deal_id)
            .await?
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: "list_checklist_items".into(),
                reason: format!("Deal '{deal_id}' not found"),
            })?;

        let items: Vec<_> = items
            .into_iter()
            .filter(|i| !open_only || !i.completed)
            .collect();

        Ok(serde_json::json!({
            "deal_id": deal_id,
            "count": items.len(),
            "items": items,
        }))
    }
}
