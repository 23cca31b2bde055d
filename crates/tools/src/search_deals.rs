//! Deal search tool: filtered listing of the caller's pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use dealroom_core::error::ToolError;
use dealroom_core::identity::TenantScope;
use dealroom_core::tool::Tool;

use crate::directory::{DealDirectory, DealFilter, DealStage, FacilityType};

const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 50;

pub struct SearchDealsTool {
    directory: Arc<dyn DealDirectory>,
}

impl SearchDealsTool {
    pub fn new(directory: Arc<dyn DealDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Tool for SearchDealsTool {
    fn name(&self) -> &str {
        "search_deals"
    }

    fn description(&self) -> &str {
        "Search the organization's acquisition deals by name or city, pipeline stage, facility type or state. Returns a summary of each matching deal, newest first."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Text to match against the deal name or city"
                },
                "stage": {
                    "type": "string",
                    "enum": ["sourcing", "letter_of_intent", "diligence", "closing", "closed", "dead"]
                },
                "facility_type": {
                    "type": "string",
                    "enum": ["skilled_nursing", "assisted_living", "memory_care", "independent_living", "behavioral_health", "hospital"]
                },
                "state": {
                    "type": "string",
                    "description": "Two-letter US state code, e.g. 'FL'"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of deals to return (default 10, max 50)",
                    "default": DEFAULT_LIMIT
                }
            }
        })
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        scope: &TenantScope,
    ) -> Result<serde_json::Value, ToolError> {
        let stage = match arguments["stage"].as_str() {
            Some(s) => Some(DealStage::parse(s).ok_or_else(|| {
                ToolError::InvalidArguments(format!("Unknown stage '{s}'"))
            })?),
            None => None,
        };
        let facility_type = match arguments["facility_type"].as_str() {
            Some(s) => Some(FacilityType::parse(s).ok_or_else(|| {
                ToolError::InvalidArguments(format!("Unknown facility type '{s}'"))
            })?),
            None => None,
        };

        let filter = DealFilter {
            query: arguments["query"]
                .as_str()
                .map(str::trim)
                .filter(|q| !q.is_empty())
                .map(String::from),
            stage,
            facility_type,
            state: arguments["state"].as_str().map(String::from),
            limit: arguments["limit"]
                .as_u64()
                .unwrap_or(DEFAULT_LIMIT)
                .clamp(1, MAX_LIMIT) as usize,
        };

        let deals = self
            .directory
            .search(&scope.organization_id, &filter)
            .await?;

        let summaries: Vec<serde_json::Value> = deals
            .iter()
            .map(|d| {
                serde_json::json!({
                    "id": d.id,
                    "name": d.name,
                    "facility_type": d.facility_type,
                    "location": format!("{}, {}", d.city, d.state),
                    "stage": d.stage,
                    "bed_count": d.bed_count,
                    "asking_price": d.asking_price,
                })
            })
            .collect();

        Ok(serde_json::json!({
            "count": summaries.len(),
            "deals": summaries,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDealDirectory;

    async fn tool() -> SearchDealsTool {
        let dir = InMemoryDealDirectory::new()
            .with_demo_data("org-a")
            .await
            .with_demo_data("org-b")
            .await;
        SearchDealsTool::new(Arc::new(dir))
    }

    #[tokio::test]
    async fn finds_by_query() {
        let result = tool()
            .await
            .execute(serde_json::json!({"query": "tampa"}), &TenantScope::new("org-a"))
            .await
            .unwrap();
        assert_eq!(result["count"], 1);
        assert_eq!(result["deals"][0]["name"], "Sunrise Manor");
        assert_eq!(result["deals"][0]["location"], "Tampa, FL");
    }

    #[tokio::test]
    async fn only_returns_the_callers_deals() {
        let result = tool()
            .await
            .execute(serde_json::json!({}), &TenantScope::new("org-b"))
            .await
            .unwrap();
        assert_eq!(result["count"], 4);
        for deal in result["deals"].as_array().unwrap() {
            assert!(deal["id"].as_str().unwrap().starts_with("org-b-"));
        }
    }

    #[tokio::test]
    async fn unknown_stage_is_invalid() {
        let err = tool()
            .await
            .execute(serde_json::json!({"stage": "won"}), &TenantScope::new("org-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn unknown_organization_sees_nothing() {
        let result = tool()
            .await
            .execute(serde_json::json!({}), &TenantScope::new("org-z"))
            .await
            .unwrap();
        assert_eq!(result["count"], 0);
    }
}
