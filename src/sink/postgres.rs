//! Postgres sink

use super::{QuoteSink, QuoteSnapshot};
use crate::error::SinkError;
use crate::matcher::MatchedPair;
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Schema used when none is configured
pub const DEFAULT_SCHEMA: &str = "deribit_polymarket";

/// Whether `name` can be spliced into SQL as a Postgres identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63
}

/// Writes pairs and snapshots into `<schema>.matched_pairs` and
/// `<schema>.quote_snapshots`
pub struct PostgresSink {
    pool: PgPool,
    schema: String,
    initialized: OnceCell<()>,
}

impl PostgresSink {
    /// Build the pool without connecting; the first statement connects
    pub fn connect_lazy(
        database_url: &str,
        schema: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, SinkError> {
        if !is_valid_identifier(schema) {
            return Err(SinkError::Unavailable(format!(
                "invalid schema name: {schema:?}"
            )));
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_lazy(database_url)?;

        Ok(Self {
            pool,
            schema: schema.to_string(),
            initialized: OnceCell::new(),
        })
    }

    /// Create schema and tables once per process
    async fn ensure_schema(&self) -> Result<(), SinkError> {
        self.initialized
            .get_or_try_init(|| async {
                for statement in self.ddl() {
                    sqlx::query(&statement).execute(&self.pool).await?;
                }
                tracing::info!(schema = %self.schema, "Postgres schema ready");
                Ok::<(), SinkError>(())
            })
            .await?;
        Ok(())
    }

    fn ddl(&self) -> Vec<String> {
        let s = &self.schema;
        vec![
            format!("CREATE SCHEMA IF NOT EXISTS {s}"),
            format!(
                "CREATE TABLE IF NOT EXISTS {s}.matched_pairs (
                    slug TEXT NOT NULL,
                    option_symbol TEXT NOT NULL,
                    direction TEXT NOT NULL,
                    target_strike NUMERIC NOT NULL,
                    target_expiry DATE NOT NULL,
                    option_kind TEXT NOT NULL,
                    option_strike NUMERIC NOT NULL,
                    option_expiry DATE NOT NULL,
                    match_distance NUMERIC NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                    PRIMARY KEY (slug, option_symbol)
                )"
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {s}.quote_snapshots (
                    ts_utc TIMESTAMPTZ NOT NULL,
                    slug TEXT NOT NULL,
                    option_symbol TEXT NOT NULL,
                    pm_yes_bid NUMERIC,
                    pm_yes_ask NUMERIC,
                    pm_no_bid NUMERIC,
                    pm_no_ask NUMERIC,
                    opt_bid NUMERIC,
                    opt_ask NUMERIC,
                    opt_bid_usd NUMERIC,
                    opt_ask_usd NUMERIC,
                    mark_iv NUMERIC,
                    underlying_price NUMERIC,
                    PRIMARY KEY (ts_utc, slug, option_symbol)
                )"
            ),
        ]
    }
}

#[async_trait]
impl QuoteSink for PostgresSink {
    async fn ensure_pair(&self, pair: &MatchedPair) -> Result<(), SinkError> {
        self.ensure_schema().await?;

        let sql = format!(
            "INSERT INTO {}.matched_pairs
                (slug, option_symbol, direction, target_strike, target_expiry,
                 option_kind, option_strike, option_expiry, match_distance)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (slug, option_symbol) DO NOTHING",
            self.schema
        );

        sqlx::query(&sql)
            .bind(&pair.event_slug)
            .bind(&pair.option_symbol)
            .bind(pair.target.direction.to_string())
            .bind(pair.target.strike)
            .bind(pair.target.expiry)
            .bind(pair.matched_option.kind.to_string())
            .bind(pair.matched_option.strike)
            .bind(pair.option_expiry)
            .bind(pair.match_distance)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn write(&self, snapshot: &QuoteSnapshot) -> Result<(), SinkError> {
        self.ensure_schema().await?;

        let sql = format!(
            "INSERT INTO {}.quote_snapshots
                (ts_utc, slug, option_symbol, pm_yes_bid, pm_yes_ask, pm_no_bid, pm_no_ask,
                 opt_bid, opt_ask, opt_bid_usd, opt_ask_usd, mark_iv, underlying_price)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             ON CONFLICT (ts_utc, slug, option_symbol) DO NOTHING",
            self.schema
        );

        sqlx::query(&sql)
            .bind(snapshot.timestamp)
            .bind(&snapshot.slug)
            .bind(&snapshot.option_symbol)
            .bind(snapshot.event_yes_bid)
            .bind(snapshot.event_yes_ask)
            .bind(snapshot.event_no_bid)
            .bind(snapshot.event_no_ask)
            .bind(snapshot.option_bid)
            .bind(snapshot.option_ask)
            .bind(snapshot.option_bid_usd)
            .bind(snapshot.option_ask_usd)
            .bind(snapshot.mark_iv)
            .bind(snapshot.underlying_price)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
