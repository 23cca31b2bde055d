//! Pipeline statistics tool: aggregate counts over the caller's deals.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dealroom_core::error::ToolError;
use dealroom_core::identity::TenantScope;
use dealroom_core::tool::Tool;

use crate::directory::{Deal, DealDirectory};

pub struct DealStatisticsTool {
    directory: Arc<dyn DealDirectory>,
}

impl DealStatisticsTool {
    pub fn new(directory: Arc<dyn DealDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl Tool for DealStatisticsTool {
    fn name(&self) -> &str {
        "get_deal_statistics"
    }

    fn description(&self) -> &str {
        "Summarize the organization's deal pipeline: deal counts by stage, facility type and state, total beds, and total and average asking price of active deals."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(
        &self,
        _arguments: serde_json::Value,
        scope: &TenantScope,
    ) -> Result<serde_json::Value, ToolError> {
        let deals = self.directory.all(&scope.organization_id).await?;
        Ok(summarize(&deals))
    }
}

fn summarize(deals: &[Deal]) -> serde_json::Value {
    let mut by_stage: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_facility_type: BTreeMap<&str, usize> = BTreeMap::new();
    let mut by_state: BTreeMap<&str, usize> = BTreeMap::new();

    for deal in deals {
        *by_stage.entry(deal.stage.as_str()).or_default() += 1;
        *by_facility_type.entry(deal.facility_type.as_str()).or_default() += 1;
        *by_state.entry(deal.state.as_str()).or_default() += 1;
    }

    let active: Vec<&Deal> = deals.iter().filter(|d| d.stage.is_active()).collect();
    let priced: Vec<f64> = active.iter().filter_map(|d| d.asking_price).collect();
    let total_asking_price: f64 = priced.iter().sum();
    let average_asking_price = if priced.is_empty() {
        None
    } else {
        Some((total_asking_price / priced.len() as f64).round())
    };

    serde_json::json!({
        "total_deals": deals.len(),
        "active_deals": active.len(),
        "total_beds": deals.iter().map(|d| d.bed_count as u64).sum::<u64>(),
        "active_asking_price_total": total_asking_price,
        "active_asking_price_average": average_asking_price,
        "by_stage": by_stage,
        "by_facility_type": by_facility_type,
        "by_state": by_state,
    })
}
