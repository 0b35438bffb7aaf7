//! Market discovery module
//!
//! Finds Polymarket price markets via the Gamma API and re-fetches their
//! quotes while a pair is tracked

mod filter;
mod gamma;

pub use filter::EventFilter;
pub use gamma::{GammaClient, GammaConfig, GAMMA_API_URL};

use crate::error::FetchError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Best bid and ask for one outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
}

/// Quotes for both outcomes of a binary market
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeQuotes {
    pub yes: Quote,
    pub no: Quote,
}

impl OutcomeQuotes {
    /// Build from the YES side only (NO bid = 1 - YES ask, NO ask = 1 - YES bid)
    pub fn from_yes(yes: Quote) -> Self {
        Self {
            yes,
            no: Quote {
                bid: yes.ask.map(|a| Decimal::ONE - a),
                ask: yes.bid.map(|b| Decimal::ONE - b),
            },
        }
    }
}

/// A single tradable Polymarket market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketEvent {
    /// Market slug, stable for the market's lifetime
    pub slug: String,
    /// Free-text question, e.g. "Will Bitcoin be above $70,000 on June 30?"
    pub question: String,
    /// End date as sent by the source
    pub expiry_hint: Option<String>,
    /// Current quotes
    pub outcomes: OutcomeQuotes,
    pub active: bool,
    pub closed: bool,
}

/// Source of prediction-market events
#[async_trait]
pub trait EventSource: Send + Sync {
    /// List open events passing the filter
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<MarketEvent>, FetchError>;
    /// Fetch one event by slug; `None` when the source does not know it
    async fn get_event(&self, slug: &str) -> Result<Option<MarketEvent>, FetchError>;
}
