//! Expiry token normalisation
//!
//! Deribit encodes expiries as `4JUL25`, some feeds use compact `250624`,
//! Gamma sends RFC 3339 timestamps and market questions say "June 30".
//! Everything is reduced to a calendar date so the two sides compare.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Month names as they appear in questions ("Jun", "June", "Sept", ...)
pub(crate) const MONTH_PATTERN: &str = "jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";

static ALPHA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})([A-Za-z]{3})(\d{2})$").unwrap());

static HUMAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^({MONTH_PATTERN})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?(?:,?\s+(\d{{4}}|\d{{2}}))?$"
    ))
    .unwrap()
});

static DATE_PHRASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:on|by)\s+((?:{MONTH_PATTERN})\.?\s+\d{{1,2}}(?:st|nd|rd|th)?(?:,?\s+\d{{4}})?)\b"
    ))
    .unwrap()
});

/// An expiry token that could not be turned into a date
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognised expiry token: {0:?}")]
pub struct FormatError(pub String);

/// Anything that can be normalised into an expiry date
pub trait ExpiryLike {
    /// Resolve to a calendar date, using `reference` to place two-digit
    /// years and year-less dates
    fn to_expiry(&self, reference: NaiveDate) -> Result<NaiveDate, FormatError>;
}

impl ExpiryLike for NaiveDate {
    fn to_expiry(&self, _reference: NaiveDate) -> Result<NaiveDate, FormatError> {
        Ok(*self)
    }
}

impl ExpiryLike for DateTime<Utc> {
    fn to_expiry(&self, _reference: NaiveDate) -> Result<NaiveDate, FormatError> {
        Ok(self.date_naive())
    }
}

impl ExpiryLike for str {
    fn to_expiry(&self, reference: NaiveDate) -> Result<NaiveDate, FormatError> {
        parse_token(self, reference)
    }
}

impl ExpiryLike for String {
    fn to_expiry(&self, reference: NaiveDate) -> Result<NaiveDate, FormatError> {
        parse_token(self, reference)
    }
}

/// Normalise an expiry token or date-like value into a calendar date
pub fn normalize_expiry<T: ExpiryLike + ?Sized>(
    token: &T,
    reference: NaiveDate,
) -> Result<NaiveDate, FormatError> {
    token.to_expiry(reference)
}

/// Find an "on June 30" / "by Jul 4, 2025" phrase and return the date part
pub fn find_date_phrase(text: &str) -> Option<&str> {
    DATE_PHRASE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Month number from a name or abbreviation
pub(crate) fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// Date for a two-digit year in the reference century, moved one century
/// forward when it would fall before the reference; never moved back
fn resolve_two_digit_year(
    yy: i32,
    month: u32,
    day: u32,
    reference: NaiveDate,
) -> Option<NaiveDate> {
    let ref_year = reference.year();
    let year = ref_year - ref_year.rem_euclid(100) + yy;
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) if date >= reference => Some(date),
        _ => NaiveDate::from_ymd_opt(year + 100, month, day),
    }
}

fn parse_token(raw: &str, reference: NaiveDate) -> Result<NaiveDate, FormatError> {
    let token = raw.trim();
    let err = || FormatError(raw.to_string());

    if token.is_empty() {
        return Err(err());
    }

    // YYMMDD, five-digit tokens lost their leading zero upstream
    if token.chars().all(|c| c.is_ascii_digit()) {
        if !(5..=6).contains(&token.len()) {
            return Err(err());
        }
        let padded = format!("{:0>6}", token);
        let yy: i32 = padded[0..2].parse().map_err(|_| err())?;
        let mm: u32 = padded[2..4].parse().map_err(|_| err())?;
        let dd: u32 = padded[4..6].parse().map_err(|_| err())?;
        return resolve_two_digit_year(yy, mm, dd, reference).ok_or_else(err);
    }

    if let Some(caps) = ALPHA_RE.captures(token) {
        let day: u32 = caps[1].parse().map_err(|_| err())?;
        let month = month_number(&caps[2]).ok_or_else(err)?;
        let yy: i32 = caps[3].parse().map_err(|_| err())?;
        return resolve_two_digit_year(yy, month, day, reference).ok_or_else(err);
    }

    if let Ok(date) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        return Ok(date);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Ok(dt.with_timezone(&Utc).date_naive());
    }

    if let Some(caps) = HUMAN_RE.captures(token) {
        let month = month_number(&caps[1]).ok_or_else(err)?;
        let day: u32 = caps[2].parse().map_err(|_| err())?;
        return match caps.get(3) {
            Some(y) if y.as_str().len() == 4 => {
                let year: i32 = y.as_str().parse().map_err(|_| err())?;
                NaiveDate::from_ymd_opt(year, month, day).ok_or_else(err)
            }
            Some(y) => {
                let yy: i32 = y.as_str().parse().map_err(|_| err())?;
                resolve_two_digit_year(yy, month, day, reference).ok_or_else(err)
            }
            None => {
                // No year: this year, or next year if the date already passed
                let this_year = NaiveDate::from_ymd_opt(reference.year(), month, day);
                match this_year {
                    Some(date) if date >= reference => Ok(date),
                    _ => NaiveDate::from_ymd_opt(reference.year() + 1, month, day)
                        .ok_or_else(err),
                }
            }
        };
    }

    Err(err())
}
