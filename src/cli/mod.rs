//! CLI interface for poly-deribit-link
//!
//! Provides subcommands for:
//! - `link`: Track a single event by slug
//! - `discover`: Continuous discovery and polling (default)
//! - `match`: Dry run of parse and match for one event
//! - `config`: Show the effective configuration

mod discover;
mod link;
mod match_cmd;

pub use discover::DiscoverArgs;
pub use link::LinkArgs;
pub use match_cmd::MatchArgs;

use crate::config::Config;
use crate::market::GammaClient;
use crate::matcher::OptionMatcher;
use crate::options::DeribitClient;
use crate::poller::{LinkRunner, ShutdownHandle};
use crate::registry::PairRegistry;
use crate::sink::{CsvSink, FailoverSink, PostgresSink, QuoteSink};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "poly-deribit-link")]
#[command(about = "Links Polymarket BTC price events to Deribit options and logs paired quotes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Track one event until it closes or its option expires
    Link(LinkArgs),
    /// Discover events continuously and poll every matched pair
    Discover(DiscoverArgs),
    /// Parse and match one event without polling
    Match(MatchArgs),
    /// Show the effective configuration
    Config,
}

/// Event and option clients built from configuration
pub(crate) fn build_sources(
    config: &Config,
) -> anyhow::Result<(Arc<GammaClient>, Arc<DeribitClient>)> {
    let gamma = GammaClient::with_config(config.events.gamma())?;
    let deribit = DeribitClient::with_config(config.options.deribit())?;
    Ok((Arc::new(gamma), Arc::new(deribit)))
}

/// Postgres behind a CSV fallback when a database is configured, CSV alone otherwise
pub(crate) fn build_sink(config: &Config) -> anyhow::Result<Arc<dyn QuoteSink>> {
    let sink = &config.sink;
    let fallback = CsvSink::new(&sink.fallback_dir);

    let Some(url) = sink.database_url.as_deref() else {
        tracing::warn!(
            path = %fallback.path().display(),
            "No database configured, writing snapshots to CSV only"
        );
        return Ok(Arc::new(fallback));
    };

    let primary = PostgresSink::connect_lazy(
        url,
        &sink.schema,
        sink.max_connections,
        Duration::from_secs(sink.acquire_timeout_secs),
    )?;
    tracing::info!(schema = %sink.schema, "Writing snapshots to Postgres");

    Ok(Arc::new(FailoverSink::new(
        Arc::new(primary),
        fallback,
        Duration::from_secs(sink.retry_after_secs),
    )))
}

pub(crate) fn build_runner(config: &Config) -> anyhow::Result<LinkRunner> {
    let (events, options) = build_sources(config)?;
    let sink = build_sink(config)?;
    let registry = PairRegistry::new(OptionMatcher::with_policy(config.matcher.policy()));

    Ok(LinkRunner::new(
        events,
        options,
        sink,
        registry,
        config.events.filter(),
        config.options.currency.clone(),
        config.poller.schedule(),
    ))
}

/// Trigger shutdown on Ctrl-C
pub(crate) fn shutdown_on_ctrl_c(handle: ShutdownHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Ctrl-C received, shutting down");
                handle.shutdown();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}
