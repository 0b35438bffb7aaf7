//! Gamma API client for market discovery
//!
//! Lists open Polymarket events page by page and flattens each event into
//! its individual markets. A multi-strike event ("Bitcoin above ___ on June
//! 30?") carries one market per strike, and each market is linked on its own.

use super::{EventFilter, EventSource, MarketEvent, OutcomeQuotes, Quote};
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Gamma API base URL
pub const GAMMA_API_URL: &str = "https://gamma-api.polymarket.com";

/// Configuration for the Gamma client
#[derive(Debug, Clone)]
pub struct GammaConfig {
    /// Base URL for the Gamma API
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Events requested per page
    pub page_size: u32,
    /// Hard stop on pagination
    pub max_pages: u32,
}

impl Default for GammaConfig {
    fn default() -> Self {
        Self {
            base_url: GAMMA_API_URL.to_string(),
            timeout: Duration::from_secs(10),
            page_size: 100,
            max_pages: 50,
        }
    }
}

/// Client for Polymarket's Gamma API
pub struct GammaClient {
    config: GammaConfig,
    client: Client,
}

impl GammaClient {
    /// Create a new Gamma API client with default configuration
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(GammaConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: GammaConfig) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let url = format!("{}{}", self.config.base_url, path);

        let response = self.client.get(&url).query(query).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, url, body });
        }

        Ok(response.json().await?)
    }

    /// Fetch one page of open events
    async fn fetch_events_page(
        &self,
        tag_slug: &str,
        offset: u32,
    ) -> Result<Vec<GammaEvent>, FetchError> {
        let query = [
            ("tag_slug", tag_slug.to_string()),
            ("active", "true".to_string()),
            ("closed", "false".to_string()),
            ("archived", "false".to_string()),
            ("limit", self.config.page_size.to_string()),
            ("offset", offset.to_string()),
        ];
        self.get_json("/events", &query).await
    }
}

#[async_trait]
impl EventSource for GammaClient {
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<MarketEvent>, FetchError> {
        let mut events = Vec::new();
        let mut offset = 0u32;
        let mut scanned = 0usize;

        for _ in 0..self.config.max_pages {
            let page = self.fetch_events_page(&filter.tag_slug, offset).await?;
            if page.is_empty() {
                break;
            }

            tracing::debug!(offset, page_len = page.len(), "Fetched Gamma events page");
            offset += page.len() as u32;

            for event in page {
                for market in flatten_event(event) {
                    scanned += 1;
                    if filter.matches(&market) {
                        events.push(market);
                    }
                }
            }
        }

        tracing::info!(
            scanned,
            relevant = events.len(),
            tag = %filter.tag_slug,
            "Listed Polymarket events"
        );

        Ok(events)
    }

    async fn get_event(&self, slug: &str) -> Result<Option<MarketEvent>, FetchError> {
        let markets: Vec<GammaMarket> = self
            .get_json("/markets", &[("slug", slug.to_string())])
            .await?;

        Ok(markets
            .into_iter()
            .find(|m| m.slug.as_deref() == Some(slug))
            .map(|m| convert_market(m, None, None)))
    }
}

/// Event response from Gamma API (holds one market per outcome line)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaEvent {
    slug: String,
    title: Option<String>,
    end_date: Option<String>,
    #[serde(default)]
    markets: Vec<GammaMarket>,
}

/// Raw market response from Gamma API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    slug: Option<String>,
    question: Option<String>,
    end_date: Option<String>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    best_bid: Option<Decimal>,
    #[serde(default, deserialize_with = "crate::decimal::deserialize_opt")]
    best_ask: Option<Decimal>,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    closed: bool,
}

/// Split an event into its markets, inheriting slug, title and end date
/// where the market omits them
fn flatten_event(event: GammaEvent) -> Vec<MarketEvent> {
    let GammaEvent {
        slug,
        title,
        end_date,
        markets,
    } = event;

    markets
        .into_iter()
        .map(|m| {
            let fallback_slug = m.slug.is_none().then(|| slug.clone());
            let mut converted = convert_market(m, title.as_deref(), end_date.as_deref());
            if let Some(s) = fallback_slug {
                converted.slug = s;
            }
            converted
        })
        .collect()
}

fn convert_market(
    market: GammaMarket,
    event_title: Option<&str>,
    event_end: Option<&str>,
) -> MarketEvent {
    let yes = Quote {
        bid: market.best_bid,
        ask: market.best_ask,
    };

    MarketEvent {
        slug: market.slug.unwrap_or_default(),
        question: market
            .question
            .or_else(|| event_title.map(str::to_string))
            .unwrap_or_default(),
        expiry_hint: market.end_date.or_else(|| event_end.map(str::to_string)),
        outcomes: OutcomeQuotes::from_yes(yes),
        active: market.active,
        closed: market.closed,
    }
}
