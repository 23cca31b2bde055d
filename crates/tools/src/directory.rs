//! The deal data the tools read from.
//!
//! [`DealDirectory`] is the boundary to the application's deal records. Every
//! method takes the caller's organization id and must never return a record
//! belonging to another organization.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dealroom_core::error::ToolError;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Kind of healthcare facility being acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    SkilledNursing,
    AssistedLiving,
    MemoryCare,
    IndependentLiving,
    BehavioralHealth,
    Hospital,
}

impl FacilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SkilledNursing => "skilled_nursing",
            Self::AssistedLiving => "assisted_living",
            Self::MemoryCare => "memory_care",
            Self::IndependentLiving => "independent_living",
            Self::BehavioralHealth => "behavioral_health",
            Self::Hospital => "hospital",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase())).ok()
    }
}

/// Pipeline stage of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Sourcing,
    LetterOfIntent,
    Diligence,
    Closing,
    Closed,
    Dead,
}

impl DealStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sourcing => "sourcing",
            Self::LetterOfIntent => "letter_of_intent",
            Self::Diligence => "diligence",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(s.to_lowercase())).ok()
    }

    /// Still in the pipeline (not closed, not dead).
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Closed | Self::Dead)
    }
}

/// One acquisition target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub facility_type: FacilityType,
    pub city: String,
    /// Two-letter state code
    pub state: String,
    pub stage: DealStage,
    pub bed_count: u32,
    /// Asking price in USD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asking_price: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// One diligence checklist entry of a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub deal_id: String,
    pub title: String,
    pub category: String,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

/// Search criteria; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct DealFilter {
    /// Case-insensitive substring of name or city
    pub query: Option<String>,
    pub stage: Option<DealStage>,
    pub facility_type: Option<FacilityType>,
    pub state: Option<String>,
    pub limit: usize,
}

impl DealFilter {
    fn matches(&self, deal: &Deal) -> bool {
        if let Some(q) = &self.query {
            let q = q.to_lowercase();
            if !deal.name.to_lowercase().contains(&q) && !deal.city.to_lowercase().contains(&q) {
                return false;
            }
        }
        self.stage.is_none_or(|s| s == deal.stage)
            && self.facility_type.is_none_or(|f| f == deal.facility_type)
            && self
                .state
                .as_ref()
                .is_none_or(|s| s.eq_ignore_ascii_case(&deal.state))
    }
}

#[async_trait]
pub trait DealDirectory: Send + Sync {
    /// Deals of `organization_id` matching `filter`, newest first.
    async fn search(
        &self,
        organization_id: &str,
        filter: &DealFilter,
    ) -> Result<Vec<Deal>, ToolError>;

    /// One deal, if it exists inside `organization_id`.
    async fn get(&self, organization_id: &str, deal_id: &str) -> Result<Option<Deal>, ToolError>;

    /// Every deal of `organization_id`.
    async fn all(&self, organization_id: &str) -> Result<Vec<Deal>, ToolError>;

    /// The checklist of a deal, or `None` if the deal is not visible.
    async fn checklist(
        &self,
        organization_id: &str,
        deal_id: &str,
    ) -> Result<Option<Vec<ChecklistItem>>, ToolError>;
}

/// A directory held in memory. Backs the CLI and tests.
#[derive(Default)]
pub struct InMemoryDealDirectory {
    deals: RwLock<Vec<Deal>>,
    checklists: RwLock<HashMap<String, Vec<ChecklistItem>>>,
}

impl InMemoryDealDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_deal(&self, deal: Deal) {
        let mut deals = self.deals.write().await;
        deals.retain(|d| d.id != deal.id);
        deals.push(deal);
    }

    pub async fn insert_checklist_item(&self, item: ChecklistItem) {
        self.checklists
            .write()
            .await
            .entry(item.deal_id.clone())
            .or_default()
            .push(item);
    }

    /// A small demo portfolio for one organization.
    pub async fn with_demo_data(self, organization_id: &str) -> Self {
        let now = Utc::now();
        let deals = [
            ("sunrise-manor", "Sunrise Manor", FacilityType::SkilledNursing, "Tampa", "FL", DealStage::Diligence, 120, Some(14_500_000.0)),
            ("cedar-grove", "Cedar Grove Assisted Living", FacilityType::AssistedLiving, "Austin", "TX", DealStage::LetterOfIntent, 85, Some(9_200_000.0)),
            ("harbor-view", "Harbor View Memory Care", FacilityType::MemoryCare, "Portland", "ME", DealStage::Sourcing, 48, None),
            ("oak-terrace", "Oak Terrace Rehabilitation", FacilityType::SkilledNursing, "Orlando", "FL", DealStage::Closed, 150, Some(21_000_000.0)),
        ];
        for (i, (slug, name, facility_type, city, state, stage, beds, price)) in
            deals.into_iter().enumerate()
        {
            self.insert_deal(Deal {
                id: format!("{organization_id}-{slug}"),
                organization_id: organization_id.to_string(),
                name: name.to_string(),
                facility_type,
                city: city.to_string(),
                state: state.to_string(),
                stage,
                bed_count: beds,
                asking_price: price,
                created_at: now - chrono::Duration::days(30 * (i as i64 + 1)),
            })
            .await;
        }

        let diligence = format!("{organization_id}-sunrise-manor");
        let items = [
            ("Obtain last three CMS survey reports", "regulatory", true),
            ("Review Medicaid cost reports", "financial", true),
            ("Phase I environmental assessment", "real_estate", false),
            ("Confirm state licensure transfer requirements", "regulatory", false),
        ];
        for (i, (title, category, completed)) in items.into_iter().enumerate() {
            self.insert_checklist_item(ChecklistItem {
                id: format!("{diligence}-item-{}", i + 1),
                deal_id: diligence.clone(),
                title: title.to_string(),
                category: category.to_string(),
                completed,
                due_date: None,
            })
            .await;
        }
        self
    }
}

#[async_trait]
impl DealDirectory for InMemoryDealDirectory {
    async fn search(
        &self,
        organization_id: &str,
        filter: &DealFilter,
    ) -> Result<Vec<Deal>, ToolError> {
        let mut found: Vec<Deal> = self
            .deals
            .read()
            .await
            .iter()
            .filter(|d| d.organization_id == organization_id && filter.matches(d))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(filter.limit);
        Ok(found)
    }

    async fn get(&self, organization_id: &str, deal_id: &str) -> Result<Option<Deal>, ToolError> {
        Ok(self
            .deals
            .read()
            .await
            .iter()
            .find(|d| d.id == deal_id && d.organization_id == organization_id)
            .cloned())
    }

    async fn all(&self, organization_id: &str) -> Result<Vec<Deal>, ToolError> {
        Ok(self
            .deals
            .read()
            .await
            .iter()
            .filter(|d| d.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn checklist(
        &self,
        organization_id: &str,
        deal_id: &str,
    ) -> Result<Option<Vec<ChecklistItem>>, ToolError> {
        if self.get(organization_id, deal_id).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(
            self.checklists
                .read()
                .await
                .get(deal_id)
                .cloned()
                .unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn organizations_are_isolated() {
        let dir = InMemoryDealDirectory::new()
            .with_demo_data("org-a")
            .await
            .with_demo_data("org-b")
            .await;

        let a = dir.all("org-a").await.unwrap();
        assert_eq!(a.len(), 4);
        assert!(a.iter().all(|d| d.organization_id == "org-a"));

        assert!(dir.get("org-a", "org-b-sunrise-manor").await.unwrap().is_none());
        assert!(
            dir.checklist("org-a", "org-b-sunrise-manor")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn filter_combines_criteria() {
        let dir = InMemoryDealDirectory::new().with_demo_data("org-a").await;
        let filter = DealFilter {
            facility_type: Some(FacilityType::SkilledNursing),
            state: Some("fl".into()),
            stage: Some(DealStage::Diligence),
            limit: 10,
            ..DealFilter::default()
        };
        let found = dir.search("org-a", &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Sunrise Manor");
    }

    #[tokio::test]
    async fn search_is_newest_first_and_limited() {
        let dir = InMemoryDealDirectory::new().with_demo_data("org-a").await;
        let filter = DealFilter {
            limit: 2,
            ..DealFilter::default()
        };
        let found = dir.search("org-a", &filter).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].created_at >= found[1].created_at);
    }

    #[test]
    fn enums_parse_from_wire_names() {
        assert_eq!(DealStage::parse("Letter_Of_Intent"), Some(DealStage::LetterOfIntent));
        assert_eq!(FacilityType::parse("memory_care"), Some(FacilityType::MemoryCare));
        assert_eq!(DealStage::parse("won"), None);
        assert_eq!(FacilityType::SkilledNursing.as_str(), "skilled_nursing");
    }
}
