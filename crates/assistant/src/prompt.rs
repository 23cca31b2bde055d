//! System prompt construction.

use chrono::NaiveDate;
use dealroom_core::identity::Principal;
use dealroom_core::message::ConversationScope;

const BASE_PROMPT: &str = "You are the Dealroom assistant, helping a healthcare acquisitions team \
track and analyze the facilities in their deal pipeline. Use the available tools to look up \
deals, pipeline statistics and diligence checklists rather than guessing. Only discuss data the \
tools return. Be concise, lead with the answer, and format figures with units (beds, USD).";

/// What the prompt may depend on for one turn.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub principal: &'a Principal,
    pub scope: &'a ConversationScope,
    pub today: NaiveDate,
}

/// Builds the system instructions sent with every round of a turn.
pub trait SystemPromptBuilder: Send + Sync {
    fn build(&self, ctx: &PromptContext<'_>) -> String;
}

/// Base instructions plus the date and, for deal conversations, the deal in
/// focus.
#[derive(Debug, Clone)]
pub struct DefaultPromptBuilder {
    base: String,
}

impl DefaultPromptBuilder {
    pub fn new() -> Self {
        Self {
            base: BASE_PROMPT.to_string(),
        }
    }

    /// Replace the base instructions.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

impl Default for DefaultPromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemPromptBuilder for DefaultPromptBuilder {
    fn build(&self, ctx: &PromptContext<'_>) -> String {
        let mut prompt = self.base.clone();
        prompt.push_str(&format!("\n\nToday's date is {}.", ctx.today.format("%Y-%m-%d")));
        if let Some(deal_id) = ctx.scope.deal_id() {
            prompt.push_str(&format!(
                "\n\nThis conversation is about the deal with id \"{deal_id}\". When the user says \
                 \"this deal\" or \"the facility\", they mean that deal; look it up with get_deal."
            ));
        }
        prompt
    }
}
