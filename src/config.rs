//! Configuration types for poly-deribit-link

use crate::market::{EventFilter, GammaConfig, GAMMA_API_URL};
use crate::matcher::MatchPolicy;
use crate::options::{DeribitConfig, DERIBIT_API_URL};
use crate::poller::Schedule;
use crate::sink::{is_valid_identifier, DEFAULT_SCHEMA};
use crate::telemetry::LogFormat;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides `sink.database_url`
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Defaults shipped with the binary, used when no config file exists
pub const EXAMPLE_CONFIG: &str = include_str!("../config.toml.example");

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Polymarket discovery configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventsConfig {
    #[serde(default = "default_gamma_url")]
    pub gamma_url: String,
    /// Gamma tag to list
    #[serde(default = "default_tag_slug")]
    pub tag_slug: String,
    /// Question must mention one of these
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_gamma_url() -> String {
    GAMMA_API_URL.to_string()
}
fn default_tag_slug() -> String {
    "crypto".to_string()
}
fn default_keywords() -> Vec<String> {
    vec!["bitcoin".to_string(), "btc".to_string()]
}
fn default_page_size() -> u32 {
    100
}
fn default_max_pages() -> u32 {
    50
}
fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            gamma_url: default_gamma_url(),
            tag_slug: default_tag_slug(),
            keywords: default_keywords(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl EventsConfig {
    pub fn gamma(&self) -> GammaConfig {
        GammaConfig {
            base_url: self.gamma_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }

    pub fn filter(&self) -> EventFilter {
        EventFilter {
            tag_slug: self.tag_slug.clone(),
            keywords: self.keywords.clone(),
            require_dollar_amount: true,
            require_date_phrase: true,
        }
    }
}

/// Deribit configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OptionsConfig {
    #[serde(default = "default_deribit_url")]
    pub deribit_url: String,
    /// Underlying currency whose chain is matched against
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_deribit_url() -> String {
    DERIBIT_API_URL.to_string()
}
fn default_currency() -> String {
    "BTC".to_string()
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            deribit_url: default_deribit_url(),
            currency: default_currency(),
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl OptionsConfig {
    pub fn deribit(&self) -> DeribitConfig {
        DeribitConfig {
            base_url: self.deribit_url.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Matching limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatcherConfig {
    /// Latest accepted option expiry, in days after the question's date
    #[serde(default = "default_max_expiry_lag_days")]
    pub max_expiry_lag_days: u32,
    /// Optional bound on |option strike - question strike|
    #[serde(default)]
    pub max_strike_distance: Option<Decimal>,
}

fn default_max_expiry_lag_days() -> u32 {
    7
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_expiry_lag_days: default_max_expiry_lag_days(),
            max_strike_distance: None,
        }
    }
}

impl MatcherConfig {
    pub fn policy(&self) -> MatchPolicy {
        MatchPolicy {
            max_expiry_lag_days: self.max_expiry_lag_days,
            max_strike_distance: self.max_strike_distance,
        }
    }
}

/// Poll loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollerConfig {
    /// Seconds between snapshots of one pair
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// First retry delay after a failed tick, doubled up to the interval
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
    /// Timeout for each quote fetch
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Seconds between discovery passes in continuous mode
    #[serde(default = "default_discovery_interval_secs")]
    pub discovery_interval_secs: u64,
    /// Bound on listing events during one discovery pass
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    60
}
fn default_retry_delay_secs() -> u64 {
    5
}
fn default_fetch_timeout_secs() -> u64 {
    15
}
fn default_discovery_interval_secs() -> u64 {
    86_400 // daily
}
fn default_discovery_timeout_secs() -> u64 {
    300
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            discovery_interval_secs: default_discovery_interval_secs(),
            discovery_timeout_secs: default_discovery_timeout_secs(),
        }
    }
}

impl PollerConfig {
    pub fn schedule(&self) -> Schedule {
        Schedule {
            interval: Duration::from_secs(self.interval_secs),
            retry_delay: Duration::from_secs(self.retry_delay_secs),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            discovery_interval: Duration::from_secs(self.discovery_interval_secs),
            discovery_timeout: Duration::from_secs(self.discovery_timeout_secs),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    /// Postgres URL; CSV only when unset
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
    /// Directory for the CSV fallback
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: PathBuf,
    /// Seconds to skip the primary after it fails
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,
}

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}
fn default_max_connections() -> u32 {
    5
}
fn default_acquire_timeout_secs() -> u64 {
    5
}
fn default_fallback_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_retry_after_secs() -> u64 {
    60
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            schema: default_schema(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            fallback_dir: default_fallback_dir(),
            retry_after_secs: default_retry_after_secs(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus scrape port; exporter disabled when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// The configuration embedded in the binary
    pub fn example() -> anyhow::Result<Self> {
        Self::from_toml(EXAMPLE_CONFIG)
    }

    /// Apply environment overrides
    pub fn with_env(mut self) -> Self {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.sink.database_url = Some(url);
            }
        }
        self
    }

    /// Copy safe to print: the database password is masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        config.sink.database_url = self.sink.database_url.as_deref().map(redact_url);
        config
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        let p = &self.poller;
        if p.interval_secs == 0 {
            anyhow::bail!("poller.interval_secs must be positive");
        }
        if p.retry_delay_secs == 0 {
            anyhow::bail!("poller.retry_delay_secs must be positive");
        }
        if p.fetch_timeout_secs == 0 {
            anyhow::bail!("poller.fetch_timeout_secs must be positive");
        }
        if p.discovery_interval_secs == 0 {
            anyhow::bail!("poller.discovery_interval_secs must be positive");
        }
        if p.discovery_timeout_secs == 0 {
            anyhow::bail!("poller.discovery_timeout_secs must be positive");
        }
        if self.events.page_size == 0 {
            anyhow::bail!("events.page_size must be positive");
        }
        if self.options.currency.trim().is_empty() {
            anyhow::bail!("options.currency must not be empty");
        }
        if !is_valid_identifier(&self.sink.schema) {
            anyhow::bail!(
                "sink.schema {:?} is not a valid identifier (lowercase letters, digits, underscore)",
                self.sink.schema
            );
        }
        if self
            .matcher
            .max_strike_distance
            .is_some_and(|d| d.is_sign_negative())
        {
            anyhow::bail!("matcher.max_strike_distance must not be negative");
        }
        Ok(())
    }
}

/// Mask the password of a connection URL; unparseable URLs are masked whole
pub fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() && parsed.set_password(Some("****")).is_err() {
                return "****".to_string();
            }
            parsed.to_string()
        }
        Err(_) => "****".to_string(),
    }
}
