//! Built-in tool implementations for Dealroom.
//!
//! Tools give the assistant read access to the caller's deal pipeline: search,
//! single-deal lookup, pipeline statistics and diligence checklists. Each tool
//! reads through a [`DealDirectory`] with the caller's organization id and
//! nothing else.

pub mod checklist;
pub mod deal_statistics;
pub mod directory;
pub mod get_deal;
pub mod search_deals;

use std::sync::Arc;

use dealroom_core::tool::ToolRegistry;

pub use directory::{
    ChecklistItem, Deal, DealDirectory, DealFilter, DealStage, FacilityType, InMemoryDealDirectory,
};

/// Create the registry with every built-in tool, in catalog order.
pub fn default_registry(directory: Arc<dyn DealDirectory>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(search_deals::SearchDealsTool::new(directory.clone())));
    registry.register(Arc::new(get_deal::GetDealTool::new(directory.clone())));
    registry.register(Arc::new(deal_statistics::DealStatisticsTool::new(
        directory.clone(),
    )));
    registry.register(Arc::new(checklist::ListChecklistItemsTool::new(directory)));
    registry
}
