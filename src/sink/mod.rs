//! Persistence for matched pairs and quote snapshots
//!
//! Rows go to Postgres when it is reachable and to an append-only CSV file
//! otherwise. Snapshots are immutable once written.

mod csv_file;
mod failover;
mod postgres;

pub use csv_file::{CsvSink, SNAPSHOT_FILE};
pub use failover::FailoverSink;
pub use postgres::{is_valid_identifier, PostgresSink, DEFAULT_SCHEMA};

use crate::error::SinkError;
use crate::market::OutcomeQuotes;
use crate::matcher::{MatchedPair, PairKey};
use crate::options::OptionQuote;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One observation of both sides of a pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub timestamp: DateTime<Utc>,
    pub slug: String,
    pub option_symbol: String,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub event_yes_bid: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub event_yes_ask: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub event_no_bid: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub event_no_ask: Option<Decimal>,
    /// In units of the underlying
    #[serde(with = "rust_decimal::serde::str_option")]
    pub option_bid: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub option_ask: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub option_bid_usd: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub option_ask_usd: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub mark_iv: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str_option")]
    pub underlying_price: Option<Decimal>,
}

impl QuoteSnapshot {
    /// Combine the two sides' quotes for a pair at `timestamp`
    pub fn assemble(
        pair: &MatchedPair,
        timestamp: DateTime<Utc>,
        event: &OutcomeQuotes,
        option: &OptionQuote,
    ) -> Self {
        Self {
            timestamp,
            slug: pair.event_slug.clone(),
            option_symbol: pair.option_symbol.clone(),
            event_yes_bid: event.yes.bid,
            event_yes_ask: event.yes.ask,
            event_no_bid: event.no.bid,
            event_no_ask: event.no.ask,
            option_bid: option.bid,
            option_ask: option.ask,
            option_bid_usd: option.bid_usd(),
            option_ask_usd: option.ask_usd(),
            mark_iv: option.mark_iv,
            underlying_price: option.underlying_price,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey {
            slug: self.slug.clone(),
            symbol: self.option_symbol.clone(),
        }
    }
}

/// Destination for pairs and snapshots
#[async_trait]
pub trait QuoteSink: Send + Sync {
    /// Make sure storage for the pair exists; safe to call repeatedly
    async fn ensure_pair(&self, pair: &MatchedPair) -> Result<(), SinkError>;
    /// Append one snapshot
    async fn write(&self, snapshot: &QuoteSnapshot) -> Result<(), SinkError>;
}
