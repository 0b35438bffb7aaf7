//! Option matching module
//!
//! Picks the listed option whose payoff best mirrors a parsed market
//! question: same right, earliest expiry on or after the question's date,
//! then the closest strike.

mod pair;

pub use pair::{MatchedPair, PairKey, OPTION_SETTLEMENT_HOUR};

use crate::options::OptionRecord;
use crate::parser::{normalize_expiry, ParsedTarget};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Matching limits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchPolicy {
    /// Latest option expiry accepted, in days after the target date
    pub max_expiry_lag_days: u32,
    /// Reject matches whose strike is further than this from the target
    pub max_strike_distance: Option<Decimal>,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            max_expiry_lag_days: 7,
            max_strike_distance: None,
        }
    }
}

/// Best option found for a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionMatch {
    pub option: OptionRecord,
    pub expiry: NaiveDate,
    pub distance: Decimal,
}

impl OptionMatch {
    /// Attach the event this match was made for
    pub fn into_pair(self, event_slug: &str, target: ParsedTarget) -> MatchedPair {
        MatchedPair {
            event_slug: event_slug.to_string(),
            option_symbol: self.option.symbol.clone(),
            target,
            matched_option: self.option,
            option_expiry: self.expiry,
            match_distance: self.distance,
        }
    }
}

/// Matches parsed targets against an option chain
#[derive(Debug, Clone, Default)]
pub struct OptionMatcher {
    policy: MatchPolicy,
}

impl OptionMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    /// Find the best option for `target` among `candidates`
    ///
    /// Candidates whose expiry cannot be normalised are skipped. Expiries are
    /// tried earliest first; within one expiry the smallest strike distance
    /// wins, a two-sided quote breaks ties, and remaining ties keep the
    /// candidate listed first.
    pub fn find_best_match(
        &self,
        target: &ParsedTarget,
        candidates: &[OptionRecord],
    ) -> Option<OptionMatch> {
        let kind = target.direction.option_kind();
        let latest = target.expiry + Duration::days(i64::from(self.policy.max_expiry_lag_days));

        let mut by_expiry: BTreeMap<NaiveDate, Vec<&OptionRecord>> = BTreeMap::new();
        for option in candidates.iter().filter(|o| o.kind == kind) {
            match normalize_expiry(&option.expiry, target.expiry) {
                Ok(expiry) if expiry >= target.expiry && expiry <= latest => {
                    by_expiry.entry(expiry).or_default().push(option);
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(
                        symbol = %option.symbol,
                        error = %e,
                        "Skipping option with unusable expiry"
                    );
                }
            }
        }

        by_expiry
            .into_iter()
            .find_map(|(expiry, options)| self.closest_strike(target, expiry, &options))
    }

    fn closest_strike(
        &self,
        target: &ParsedTarget,
        expiry: NaiveDate,
        options: &[&OptionRecord],
    ) -> Option<OptionMatch> {
        let mut best: Option<(Decimal, bool, &OptionRecord)> = None;

        for option in options {
            let distance = (option.strike - target.strike).abs();
            if self
                .policy
                .max_strike_distance
                .is_some_and(|max| distance > max)
            {
                continue;
            }

            let quoted = option.is_quoted();
            let better = match &best {
                None => true,
                Some((best_distance, best_quoted, _)) => {
                    distance < *best_distance
                        || (distance == *best_distance && quoted && !*best_quoted)
                }
            };
            if better {
                best = Some((distance, quoted, option));
            }
        }

        best.map(|(distance, _, option)| OptionMatch {
            option: option.clone(),
            expiry,
            distance,
        })
    }
}

/// Match with the default policy
pub fn find_best_match(
    target: &ParsedTarget,
    candidates: &[OptionRecord],
) -> Option<OptionMatch> {
    OptionMatcher::new().find_best_match(target, candidates)
}
