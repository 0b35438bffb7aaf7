//! Per-pair polling task

use super::{next_timestamp, shutdown_signalled, Schedule};
use crate::error::{with_timeout, FetchError};
use crate::market::{EventSource, MarketEvent, OutcomeQuotes};
use crate::matcher::{MatchedPair, PairKey};
use crate::options::{OptionChainSource, OptionQuote};
use crate::registry::{PairRegistry, RetireReason};
use crate::sink::{QuoteSink, QuoteSnapshot};
use crate::telemetry::metrics::{self, FetchSide};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};

/// Why a poller stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerExit {
    Retired(RetireReason),
    Shutdown,
}

enum Tick {
    Quotes {
        event: OutcomeQuotes,
        option: OptionQuote,
    },
    Retire(RetireReason),
}

/// Samples one pair until it retires or shutdown is signalled
pub struct PairPoller {
    pair: MatchedPair,
    events: Arc<dyn EventSource>,
    options: Arc<dyn OptionChainSource>,
    sink: Arc<dyn QuoteSink>,
    registry: Arc<RwLock<PairRegistry>>,
    schedule: Schedule,
    last_timestamp: Option<DateTime<Utc>>,
    failures: u32,
}

impl PairPoller {
    pub fn new(
        pair: MatchedPair,
        events: Arc<dyn EventSource>,
        options: Arc<dyn OptionChainSource>,
        sink: Arc<dyn QuoteSink>,
        registry: Arc<RwLock<PairRegistry>>,
        schedule: Schedule,
    ) -> Self {
        Self {
            pair,
            events,
            options,
            sink,
            registry,
            schedule,
            last_timestamp: None,
            failures: 0,
        }
    }

    pub fn key(&self) -> PairKey {
        self.pair.key()
    }

    /// Poll until retirement or shutdown
    ///
    /// Shutdown is observed while fetching or sleeping. A snapshot that has
    /// been assembled is always written before the signal is checked again.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PollerExit {
        let key = self.key();
        tracing::info!(
            pair = %key,
            interval_secs = self.schedule.interval.as_secs(),
            "Poller started"
        );

        if let Err(e) = self.sink.ensure_pair(&self.pair).await {
            tracing::error!(pair = %key, error = %e, "Failed to record pair");
        }

        loop {
            let tick = tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => break,
                tick = self.fetch(Utc::now()) => tick,
            };

            let delay = match tick {
                Ok(Tick::Retire(reason)) => {
                    self.registry.write().await.retire(&key, reason);
                    tracing::info!(pair = %key, %reason, "Poller stopped");
                    return PollerExit::Retired(reason);
                }
                Ok(Tick::Quotes { event, option }) => {
                    self.record(&event, &option).await;
                    self.failures = 0;
                    self.schedule.interval
                }
                Err(e) => {
                    self.failures += 1;
                    let delay = self.schedule.backoff(self.failures);
                    tracing::warn!(
                        pair = %key,
                        error = %e,
                        failures = self.failures,
                        retry_in_secs = delay.as_secs(),
                        "Tick skipped"
                    );
                    delay
                }
            };

            tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!(pair = %key, "Poller shut down");
        PollerExit::Shutdown
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<Tick, FetchError> {
        if self.pair.is_expired(now) {
            return Ok(Tick::Retire(RetireReason::OptionExpired));
        }

        let (event, option) = tokio::join!(self.fetch_event(), self.fetch_option());

        let event = event?
            .ok_or_else(|| FetchError::NotFound(self.pair.event_slug.clone()))?;
        if event.closed {
            return Ok(Tick::Retire(RetireReason::EventClosed));
        }

        match option {
            Ok(option) => Ok(Tick::Quotes {
                event: event.outcomes,
                option,
            }),
            Err(FetchError::NotFound(_)) => Ok(Tick::Retire(RetireReason::Invalidated)),
            Err(e) => Err(e),
        }
    }

    async fn fetch_event(&self) -> Result<Option<MarketEvent>, FetchError> {
        let started = Instant::now();
        let result = with_timeout(
            self.schedule.fetch_timeout,
            self.events.get_event(&self.pair.event_slug),
        )
        .await;
        metrics::record_fetch_latency(FetchSide::Event, started.elapsed());
        if result.is_err() {
            metrics::record_fetch_failure(FetchSide::Event);
        }
        result
    }

    async fn fetch_option(&self) -> Result<OptionQuote, FetchError> {
        let started = Instant::now();
        let result = with_timeout(
            self.schedule.fetch_timeout,
            self.options.fetch_quote(&self.pair.option_symbol),
        )
        .await;
        metrics::record_fetch_latency(FetchSide::Option, started.elapsed());
        if result.is_err() {
            metrics::record_fetch_failure(FetchSide::Option);
        }
        result
    }

    async fn record(&mut self, event: &OutcomeQuotes, option: &OptionQuote) {
        let timestamp = next_timestamp(self.last_timestamp, Utc::now());
        self.last_timestamp = Some(timestamp);

        let snapshot = QuoteSnapshot::assemble(&self.pair, timestamp, event, option);
        match self.sink.write(&snapshot).await {
            Ok(()) => {
                metrics::record_snapshot_written();
                tracing::debug!(
                    pair = %snapshot.key(),
                    yes_bid = ?snapshot.event_yes_bid,
                    option_bid = ?snapshot.option_bid,
                    "Snapshot recorded"
                );
            }
            Err(e) => {
                tracing::error!(pair = %snapshot.key(), error = %e, "Failed to persist snapshot");
            }
        }
    }
}
