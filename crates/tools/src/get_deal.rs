//! Single-deal lookup tool.

use std::sync::Arc;

use async_trait::async_trait;
use dealroom_core::error::ToolError;
use dealroom_core::identity::TenantScope;
use dealroom_core::tool::Tool;

use crate::directory::DealDirectory;

pub struct GetDealTool {
    directory: Arc<dyn DealDirectory>,
}

impl GetDealTool {
    pub fn new(directory: Arc<dyn DealDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Tool for GetDealTool {
    fn name(&self) -> &str {
        "get_deal"
    }

    fn description(&self) -> &str {
        "Get the full record of one deal by id, including checklist progress."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "deal_id": {
                    "type": "string",
                    "description": "The deal id, as returned by search_deals"
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

        let deal = self
            .directory
            .get(&scope.organization_id, deal_id)
            .await?
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool_name: "get_deal".into(),
                reason: format!("Deal '{deal_id}' not found"),
            })?;

        let checklist = self
            .directory
            .checklist(&scope.organization_id, deal_id)
            .await?
            .unwrap_or_default();
        let completed = checklist.iter().filter(|i| i.completed).count();

        let mut record = serde_json::to_value(&deal).map_err(|e| ToolError::ExecutionFailed {
            tool_name: "get_deal".into(),
            reason: e.to_string(),
        })?;
        if let (Some(price), true) = (deal.asking_price, deal.bed_count > 0) {
            record["price_per_bed"] = serde_json::json!((price / deal.bed_count as f64).round());
        }
        record["checklist"] = serde_json::json!({
            "total": checklist.len(),
            "completed": completed,
        });
        Ok(record)
    }
}
