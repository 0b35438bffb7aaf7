//! Relevance filter for discovered events

use super::MarketEvent;
use crate::parser::{contains_dollar_amount, find_date_phrase};

/// Which events are worth trying to link
#[derive(Debug, Clone)]
pub struct EventFilter {
    /// Gamma tag to list (e.g. "crypto")
    pub tag_slug: String,
    /// Question must mention one of these (case-insensitive)
    pub keywords: Vec<String>,
    /// Question must contain a `$` amount
    pub require_dollar_amount: bool,
    /// Question must contain an "on <Month> <day>" phrase
    pub require_date_phrase: bool,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            tag_slug: "crypto".to_string(),
            keywords: vec!["bitcoin".to_string(), "btc".to_string()],
            require_dollar_amount: true,
            require_date_phrase: true,
        }
    }
}

impl EventFilter {
    /// Check whether an event should be considered for linking
    pub fn matches(&self, event: &MarketEvent) -> bool {
        if event.closed {
            return false;
        }

        let question = event.question.to_lowercase();
        let mentions_keyword = self.keywords.is_empty()
            || self
                .keywords
                .iter()
                .any(|k| question.contains(&k.to_lowercase()));

        mentions_keyword
            && (!self.require_dollar_amount || contains_dollar_amount(&event.question))
            && (!self.require_date_phrase || find_date_phrase(&event.question).is_some())
    }
}
