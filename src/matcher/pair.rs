//! Matched event/option pairs

use crate::options::OptionRecord;
use crate::parser::ParsedTarget;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deribit options settle at 08:00 UTC on the expiry date
pub const OPTION_SETTLEMENT_HOUR: u32 = 8;

/// Identity of a pair: one event slug against one option symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub slug: String,
    pub symbol: String,
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.slug, self.symbol)
    }
}

/// An event linked to the option that best replicates it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub event_slug: String,
    pub option_symbol: String,
    pub target: ParsedTarget,
    pub matched_option: OptionRecord,
    /// Normalised expiry of the matched option
    pub option_expiry: NaiveDate,
    /// |option strike - target strike|
    pub match_distance: Decimal,
}

impl MatchedPair {
    pub fn key(&self) -> PairKey {
        PairKey {
            slug: self.event_slug.clone(),
            symbol: self.option_symbol.clone(),
        }
    }

    /// Settlement instant of the matched option
    pub fn option_expires_at(&self) -> DateTime<Utc> {
        let settle = NaiveTime::from_hms_opt(OPTION_SETTLEMENT_HOUR, 0, 0).unwrap_or_default();
        self.option_expiry.and_time(settle).and_utc()
    }

    /// Whether the option has settled at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.option_expires_at()
    }
}

impl fmt::Display for MatchedPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} ({}, distance {})",
            self.event_slug, self.option_symbol, self.target, self.match_distance
        )
    }
}
