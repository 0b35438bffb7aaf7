//! Pair registry
//!
//! Tracks which events are linked to which option and moves pairs through
//! their lifecycle: Candidate -> Active -> Retired, or Candidate ->
//! Unmatched. Unmatched slugs are not retried by discovery; a retired slug
//! may be linked again as a new pair.

use crate::matcher::{MatchedPair, OptionMatcher, PairKey};
use crate::market::MarketEvent;
use crate::options::OptionRecord;
use crate::parser::ParsedTarget;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::fmt;

/// Why an event could not be linked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmatchedReason {
    /// Strike, direction or date missing from the question
    ParseFailure,
    /// No option passed the matching rules
    NoMatch,
}

impl UnmatchedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnmatchedReason::ParseFailure => "parse_failure",
            UnmatchedReason::NoMatch => "no_match",
        }
    }
}

/// Why a pair stopped being tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetireReason {
    EventClosed,
    OptionExpired,
    /// Source no longer lists the event or option
    Invalidated,
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetireReason::EventClosed => write!(f, "event closed"),
            RetireReason::OptionExpired => write!(f, "option expired"),
            RetireReason::Invalidated => write!(f, "invalidated"),
        }
    }
}

/// Lifecycle state of a slug
///
/// Candidates only exist inside [`PairRegistry::register`], so they have no
/// variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    Active,
    Retired(RetireReason),
    Unmatched(UnmatchedReason),
}

/// Result of a registration attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// A new pair was created and is now active
    Activated(MatchedPair),
    /// The slug already has an active pair; nothing changed
    AlreadyActive(PairKey),
    Unmatched(UnmatchedReason),
}

/// Registry of matched pairs
///
/// Not internally synchronised; share it as `Arc<RwLock<PairRegistry>>`.
#[derive(Debug, Default)]
pub struct PairRegistry {
    matcher: OptionMatcher,
    active: HashMap<String, MatchedPair>,
    retired: HashMap<String, (MatchedPair, RetireReason)>,
    unmatched: HashMap<String, UnmatchedReason>,
}

impl PairRegistry {
    pub fn new(matcher: OptionMatcher) -> Self {
        Self {
            matcher,
            ..Default::default()
        }
    }

    /// Parse the event and match it against the chain
    ///
    /// A slug holds at most one active pair, so registering an active slug
    /// again returns [`Registration::AlreadyActive`] without touching it.
    pub fn register(
        &mut self,
        event: &MarketEvent,
        chain: &[OptionRecord],
        reference: NaiveDate,
    ) -> Registration {
        if let Some(existing) = self.active.get(&event.slug) {
            return Registration::AlreadyActive(existing.key());
        }

        let Some(target) = ParsedTarget::from_event(event, reference) else {
            tracing::debug!(
                slug = %event.slug,
                question = %event.question,
                "Could not parse question"
            );
            return self.mark_unmatched(&event.slug, UnmatchedReason::ParseFailure);
        };

        let Some(found) = self.matcher.find_best_match(&target, chain) else {
            tracing::debug!(slug = %event.slug, %target, "No option matched");
            return self.mark_unmatched(&event.slug, UnmatchedReason::NoMatch);
        };

        let pair = found.into_pair(&event.slug, target);
        tracing::info!(pair = %pair, "Pair activated");

        self.unmatched.remove(&event.slug);
        self.active.insert(event.slug.clone(), pair.clone());
        Registration::Activated(pair)
    }

    fn mark_unmatched(&mut self, slug: &str, reason: UnmatchedReason) -> Registration {
        self.unmatched.insert(slug.to_string(), reason);
        Registration::Unmatched(reason)
    }

    /// Snapshot of all active pairs, ordered by key
    pub fn active_pairs(&self) -> Vec<MatchedPair> {
        let mut pairs: Vec<MatchedPair> = self.active.values().cloned().collect();
        pairs.sort_by(|a, b| a.key().cmp(&b.key()));
        pairs
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn is_active(&self, key: &PairKey) -> bool {
        self.active
            .get(&key.slug)
            .is_some_and(|p| p.option_symbol == key.symbol)
    }

    /// Retire an active pair; returns false if it was not active
    pub fn retire(&mut self, key: &PairKey, reason: RetireReason) -> bool {
        if !self.is_active(key) {
            return false;
        }
        let Some(pair) = self.active.remove(&key.slug) else {
            return false;
        };
        tracing::info!(pair = %key, %reason, "Pair retired");
        self.retired.insert(key.slug.clone(), (pair, reason));
        true
    }

    /// Retire every active pair whose option has settled at `now`
    pub fn retire_expired(&mut self, now: DateTime<Utc>) -> Vec<PairKey> {
        let expired: Vec<PairKey> = self
            .active
            .values()
            .filter(|p| p.is_expired(now))
            .map(MatchedPair::key)
            .collect();

        for key in &expired {
            self.retire(key, RetireReason::OptionExpired);
        }
        expired
    }

    /// Current state of a slug, `None` if it has never been seen
    pub fn state_of(&self, slug: &str) -> Option<PairState> {
        if self.active.contains_key(slug) {
            Some(PairState::Active)
        } else if let Some(reason) = self.unmatched.get(slug) {
            Some(PairState::Unmatched(*reason))
        } else {
            self.retired
                .get(slug)
                .map(|(_, reason)| PairState::Retired(*reason))
        }
    }

    /// Whether discovery should try to link this slug
    pub fn should_attempt(&self, slug: &str) -> bool {
        !self.active.contains_key(slug) && !self.unmatched.contains_key(slug)
    }
}
