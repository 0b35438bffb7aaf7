//! Deribit public API client
//!
//! Uses the unauthenticated REST endpoints: the book summary for the whole
//! option chain and the ticker for single instruments. Prices come back in
//! units of the underlying; a zero bid or ask means an empty side.

use super::{Greeks, OptionChainSource, OptionKind, OptionQuote, OptionRecord, RawExpiry};
use crate::decimal::parse_decimal;
use crate::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Deribit API v2 base URL
pub const DERIBIT_API_URL: &str = "https://www.deribit.com/api/v2";

/// Configuration for the Deribit client
#[derive(Debug, Clone)]
pub struct DeribitConfig {
    /// Base URL for the REST API
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for DeribitConfig {
    fn default() -> Self {
        Self {
            base_url: DERIBIT_API_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Client for Deribit's public REST API
pub struct DeribitClient {
    config: DeribitConfig,
    client: Client,
}

impl DeribitClient {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(DeribitConfig::default())
    }

    pub fn with_config(config: DeribitConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = format!("{}/public/{}", self.config.base_url, method);

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();

        // Deribit reports errors in the body with a 400, so decode either way
        let body = response.text().await?;
        match serde_json::from_str::<RpcResponse<T>>(&body) {
            Ok(RpcResponse {
                result: Some(result),
                ..
            }) => Ok(result),
            Ok(RpcResponse {
                error: Some(err), ..
            }) => Err(FetchError::Status {
                status: status.as_u16(),
                url,
                body: format!("{} ({})", err.message, err.code),
            }),
            Ok(_) if !status.is_success() => Err(FetchError::Status {
                status: status.as_u16(),
                url,
                body,
            }),
            Ok(_) => Err(FetchError::Decode(format!("{method}: empty result"))),
            Err(_) if !status.is_success() => Err(FetchError::Status {
                status: status.as_u16(),
                url,
                body,
            }),
            Err(e) => Err(FetchError::Decode(format!("{method}: {e}"))),
        }
    }
}

#[async_trait]
impl OptionChainSource for DeribitClient {
    async fn fetch_chain(&self, currency: &str) -> Result<Vec<OptionRecord>, FetchError> {
        let summaries: Vec<BookSummary> = self
            .call(
                "get_book_summary_by_currency",
                &[("currency", currency), ("kind", "option")],
            )
            .await?;

        let total = summaries.len();
        let chain: Vec<OptionRecord> = summaries
            .into_iter()
            .filter_map(|s| {
                let record = s.into_record();
                if record.is_none() {
                    tracing::debug!("Skipping unparseable Deribit instrument");
                }
                record
            })
            .collect();

        tracing::info!(
            currency,
            instruments = chain.len(),
            skipped = total - chain.len(),
            "Fetched Deribit option chain"
        );

        Ok(chain)
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<OptionQuote, FetchError> {
        let ticker: Ticker = match self.call("ticker", &[("instrument_name", symbol)]).await {
            Err(FetchError::Status { body, .. }) if body.contains("instrument_not_found") => {
                return Err(FetchError::NotFound(symbol.to_string()))
            }
            other => other?,
        };
        Ok(ticker.into_quote())
    }
}

/// Parts of a Deribit option instrument name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub currency: String,
    pub expiry_token: String,
    pub strike: Decimal,
    pub kind: OptionKind,
}

/// Split `BTC-4JUL25-70000-C` into currency, expiry token, strike and kind
///
/// Fractional strikes are written with a `d` (`XRP-4JUL25-0d55-C`).
pub fn parse_instrument_name(name: &str) -> Option<Instrument> {
    let mut parts = name.split('-');
    let currency = parts.next()?;
    let expiry_token = parts.next()?;
    let strike = parse_decimal(&parts.next()?.replace('d', "."))?;
    let kind = OptionKind::from_code(parts.next()?)?;
    if parts.next().is_some() || currency.is_empty() || expiry_token.is_empty() {
        return None;
    }

    Some(Instrument {
        currency: currency.to_string(),
        expiry_token: expiry_token.to_string(),
        strike,
        kind,
    })
}

/// A zero price is an empty book side
fn quoted(price: Option<Decimal>) -> Option<Decimal> {
    price.filter(|p| !p.is_zero())
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct BookSummary {
    instrument_name: String,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    bid_price: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    ask_price: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    mark_iv: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    underlying_price: Option<Decimal>,
}

impl BookSummary {
    fn into_record(self) -> Option<OptionRecord> {
        let instrument = parse_instrument_name(&self.instrument_name)?;
        Some(OptionRecord {
            symbol: self.instrument_name,
            kind: instrument.kind,
            strike: instrument.strike,
            expiry: RawExpiry::Token(instrument.expiry_token),
            bid: quoted(self.bid_price),
            ask: quoted(self.ask_price),
            mark_iv: self.mark_iv,
            underlying_price: self.underlying_price,
            greeks: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct Ticker {
    instrument_name: String,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    best_bid_price: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    best_ask_price: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    mark_iv: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    underlying_price: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    index_price: Option<Decimal>,
    greeks: Option<TickerGreeks>,
    /// Milliseconds since the epoch
    timestamp: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TickerGreeks {
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    delta: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    gamma: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    vega: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    theta: Option<Decimal>,
}

impl TickerGreeks {
    fn complete(&self) -> Option<Greeks> {
        Some(Greeks {
            delta: self.delta?,
            gamma: self.gamma?,
            vega: self.vega?,
            theta: self.theta?,
        })
    }
}

impl Ticker {
    fn into_quote(self) -> OptionQuote {
        let timestamp = self
            .timestamp
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);

        OptionQuote {
            symbol: self.instrument_name,
            bid: quoted(self.best_bid_price),
            ask: quoted(self.best_ask_price),
            mark_iv: self.mark_iv,
            underlying_price: self.underlying_price.or(self.index_price),
            greeks: self.greeks.as_ref().and_then(TickerGreeks::complete),
            timestamp,
        }
    }
}
