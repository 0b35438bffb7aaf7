//! Options chain module
//!
//! Lists the Deribit option chain for a currency and fetches per-instrument
//! quotes for matched pairs

mod deribit;

pub use deribit::{
    parse_instrument_name, DeribitClient, DeribitConfig, Instrument, DERIBIT_API_URL,
};

use crate::error::FetchError;
use crate::parser::{ExpiryLike, FormatError};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Option right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl OptionKind {
    /// From the trailing letter of an instrument name
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "C" | "c" => Some(OptionKind::Call),
            "P" | "p" => Some(OptionKind::Put),
            _ => None,
        }
    }
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Call => write!(f, "call"),
            OptionKind::Put => write!(f, "put"),
        }
    }
}

/// Expiry as delivered by the chain source, normalised lazily
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawExpiry {
    Token(String),
    Date(NaiveDate),
}

impl ExpiryLike for RawExpiry {
    fn to_expiry(&self, reference: NaiveDate) -> Result<NaiveDate, FormatError> {
        match self {
            RawExpiry::Token(token) => token.to_expiry(reference),
            RawExpiry::Date(date) => Ok(*date),
        }
    }
}

/// Option sensitivities in Deribit's units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub vega: Decimal,
    pub theta: Decimal,
}

/// One listed option from a chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRecord {
    /// Exchange instrument name, e.g. `BTC-4JUL25-70000-C`
    pub symbol: String,
    pub kind: OptionKind,
    pub strike: Decimal,
    pub expiry: RawExpiry,
    /// Best bid in units of the underlying
    pub bid: Option<Decimal>,
    /// Best ask in units of the underlying
    pub ask: Option<Decimal>,
    pub mark_iv: Option<Decimal>,
    pub underlying_price: Option<Decimal>,
    pub greeks: Option<Greeks>,
}

impl OptionRecord {
    /// Whether the option has a live two-sided market
    pub fn is_quoted(&self) -> bool {
        self.bid.is_some() && self.ask.is_some()
    }
}

/// Point-in-time quote for a single option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub symbol: String,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub mark_iv: Option<Decimal>,
    pub underlying_price: Option<Decimal>,
    pub greeks: Option<Greeks>,
    /// Exchange timestamp of the quote
    pub timestamp: DateTime<Utc>,
}

impl OptionQuote {
    /// Bid converted to USD via the underlying price
    pub fn bid_usd(&self) -> Option<Decimal> {
        Some(self.bid? * self.underlying_price?)
    }

    /// Ask converted to USD via the underlying price
    pub fn ask_usd(&self) -> Option<Decimal> {
        Some(self.ask? * self.underlying_price?)
    }
}

/// Source of option chains and quotes
#[async_trait]
pub trait OptionChainSource: Send + Sync {
    /// List every option on the currency
    async fn fetch_chain(&self, currency: &str) -> Result<Vec<OptionRecord>, FetchError>;
    /// Fetch the current quote for one instrument
    async fn fetch_quote(&self, symbol: &str) -> Result<OptionQuote, FetchError>;
}
