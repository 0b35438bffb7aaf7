//! Question parsing module
//!
//! Turns a prediction-market question into a strike, direction and expiry

mod expiry;
mod strike;

pub use expiry::{find_date_phrase, normalize_expiry, ExpiryLike, FormatError};
pub use strike::{contains_dollar_amount, parse_strike};

use crate::market::MarketEvent;
use crate::options::OptionKind;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the strike the question asks about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    /// Option kind whose payoff mirrors the question
    pub fn option_kind(&self) -> OptionKind {
        match self {
            Direction::Above => OptionKind::Call,
            Direction::Below => OptionKind::Put,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Above => write!(f, "above"),
            Direction::Below => write!(f, "below"),
        }
    }
}

/// Strike and direction without an expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeTarget {
    pub direction: Direction,
    pub strike: Decimal,
}

/// What a market question is asking, in option terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTarget {
    pub direction: Direction,
    pub strike: Decimal,
    pub expiry: NaiveDate,
}

impl ParsedTarget {
    /// Build a target for an event
    ///
    /// The date phrase in the question wins; the event's own end date is used
    /// when the question does not name one.
    pub fn from_event(event: &MarketEvent, reference: NaiveDate) -> Option<Self> {
        if let Some(target) = parse_target(&event.question, reference) {
            return Some(target);
        }
        let StrikeTarget { direction, strike } = parse_strike(&event.question)?;
        let expiry = normalize_expiry(event.expiry_hint.as_deref()?, reference).ok()?;
        Some(Self {
            direction,
            strike,
            expiry,
        })
    }
}

impl fmt::Display for ParsedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on {}", self.direction, self.strike, self.expiry)
    }
}

/// Parse strike, direction and the "on <date>" phrase from a question
///
/// Returns `None` when any of the three is missing; the caller skips the
/// event.
pub fn parse_target(question: &str, reference: NaiveDate) -> Option<ParsedTarget> {
    let StrikeTarget { direction, strike } = parse_strike(question)?;
    let phrase = find_date_phrase(question)?;
    let expiry = normalize_expiry(phrase, reference).ok()?;
    Some(ParsedTarget {
        direction,
        strike,
        expiry,
    })
}
