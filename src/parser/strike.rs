//! Strike and direction extraction from market questions

use super::{Direction, StrikeTarget};
use regex::Regex;
use rust_decimal::Decimal;
use std::ops::Range;
use std::str::FromStr;
use std::sync::LazyLock;

/// `$70,000`, `$70000.50`, `$1.5M`, `$120k`
///
/// Digit groups and any letters glued to the amount are captured so that
/// malformed amounts can be rejected instead of truncated.
static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\s?(\d+(?:,\d+)*)(?:\.(\d+))?([kKmMbB])?(\w*)").unwrap()
});

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(above|over|greater\s+than|exceed(?:s|ing)?|reach(?:es|ing)?|hit(?:s|ting)?|below|under|less\s+than|(?:dip|fall|drop)s?\s+to)\b|[<>]",
    )
    .unwrap()
});

/// Direction implied by a keyword match
fn direction_of(keyword: &str) -> Direction {
    let k = keyword.to_ascii_lowercase();
    let below = ["<", "below", "under", "less", "dip", "fall", "drop"];
    if below.iter().any(|w| k.starts_with(w)) {
        Direction::Below
    } else {
        Direction::Above
    }
}

/// `70,000` and `70000` are fine; `7,0000` and `70,00` are not
fn well_grouped(digits: &str) -> bool {
    let mut groups = digits.split(',');
    let first = groups.next().unwrap_or_default();
    if !digits.contains(',') {
        return !first.is_empty();
    }
    (1..=3).contains(&first.len()) && groups.all(|g| g.len() == 3)
}

fn amount_value(caps: &regex::Captures) -> Option<Decimal> {
    let digits = caps.get(1)?.as_str();
    let glued = caps.get(4).is_some_and(|m| !m.as_str().is_empty());
    if glued || !well_grouped(digits) {
        return None;
    }
    let mut text = digits.replace(',', "");
    if let Some(cents) = caps.get(2) {
        text.push('.');
        text.push_str(cents.as_str());
    }
    let value = Decimal::from_str(&text).ok()?;
    let multiplier = match caps.get(3).map(|m| m.as_str().to_ascii_lowercase()) {
        None => Decimal::ONE,
        Some(s) if s == "k" => Decimal::from(1_000),
        Some(s) if s == "m" => Decimal::from(1_000_000),
        Some(_) => Decimal::from(1_000_000_000),
    };
    value.checked_mul(multiplier).map(|v| v.normalize())
}

fn amounts(question: &str) -> Vec<(Range<usize>, Decimal)> {
    AMOUNT_RE
        .captures_iter(question)
        .filter_map(|caps| {
            let span = caps.get(0)?.range();
            amount_value(&caps).map(|v| (span, v))
        })
        .collect()
}

/// Whether the text mentions a dollar amount at all
pub fn contains_dollar_amount(text: &str) -> bool {
    !amounts(text).is_empty()
}

/// Extract the strike and direction from a market question
///
/// Every direction keyword is paired with every dollar amount and the pair
/// with the smallest gap between them wins, so "from $60,000 to above
/// $70,000" yields 70000. On equal gaps an amount following its keyword is
/// preferred, then the earliest pair in the text.
pub fn parse_strike(question: &str) -> Option<StrikeTarget> {
    let amounts = amounts(question);
    if amounts.is_empty() {
        return None;
    }

    let mut best: Option<((usize, u8, usize), Direction, Decimal)> = None;

    for kw in KEYWORD_RE.find_iter(question) {
        let direction = direction_of(kw.as_str());
        for (span, value) in &amounts {
            let (gap, order) = if span.start >= kw.end() {
                (span.start - kw.end(), 0)
            } else if kw.start() >= span.end {
                (kw.start() - span.end, 1)
            } else {
                continue;
            };
            let key = (gap, order, kw.start().min(span.start));
            if best.as_ref().map_or(true, |(k, _, _)| key < *k) {
                best = Some((key, direction, *value));
            }
        }
    }

    best.map(|(_, direction, strike)| StrikeTarget { direction, strike })
}
