//! Discovery and task supervision

use super::{shutdown_signalled, PairPoller, PollerExit, Schedule};
use crate::error::{with_timeout, FetchError};
use crate::market::{EventFilter, EventSource, MarketEvent};
use crate::matcher::{MatchedPair, PairKey};
use crate::options::{OptionChainSource, OptionRecord};
use crate::registry::{PairRegistry, Registration};
use crate::sink::QuoteSink;
use crate::telemetry::metrics::{self, FetchSide};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, RwLock};
use tokio::task::{JoinError, JoinSet};

/// Signals every poller and the discovery loop to stop
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

/// Links events to options and supervises one poller per pair
pub struct LinkRunner {
    events: Arc<dyn EventSource>,
    options: Arc<dyn OptionChainSource>,
    sink: Arc<dyn QuoteSink>,
    registry: Arc<RwLock<PairRegistry>>,
    filter: EventFilter,
    currency: String,
    schedule: Schedule,
    shutdown: Arc<watch::Sender<bool>>,
}

impl LinkRunner {
    pub fn new(
        events: Arc<dyn EventSource>,
        options: Arc<dyn OptionChainSource>,
        sink: Arc<dyn QuoteSink>,
        registry: PairRegistry,
        filter: EventFilter,
        currency: impl Into<String>,
        schedule: Schedule,
    ) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            events,
            options,
            sink,
            registry: Arc::new(RwLock::new(registry)),
            filter,
            currency: currency.into(),
            schedule,
            shutdown: Arc::new(tx),
        }
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown.clone())
    }

    pub fn registry(&self) -> Arc<RwLock<PairRegistry>> {
        self.registry.clone()
    }

    async fn fetch_chain(&self) -> Result<Vec<OptionRecord>, FetchError> {
        let started = Instant::now();
        let result = with_timeout(
            self.schedule.fetch_timeout,
            self.options.fetch_chain(&self.currency),
        )
        .await;
        metrics::record_fetch_latency(FetchSide::Discovery, started.elapsed());
        if result.is_err() {
            metrics::record_fetch_failure(FetchSide::Discovery);
        }
        result
    }

    /// Fetch one event by slug and try to link it
    pub async fn link(&self, slug: &str, reference: NaiveDate) -> anyhow::Result<Registration> {
        let event = with_timeout(self.schedule.fetch_timeout, self.events.get_event(slug))
            .await
            .with_context(|| format!("Failed to fetch event {slug}"))?
            .ok_or_else(|| anyhow::anyhow!("Event {slug} not found"))?;

        let chain = self
            .fetch_chain()
            .await
            .with_context(|| format!("Failed to fetch {} option chain", self.currency))?;

        let registration = self.registry.write().await.register(&event, &chain, reference);
        if let Registration::Unmatched(reason) = &registration {
            metrics::record_unmatched(reason.as_str());
        }
        Ok(registration)
    }

    /// One discovery pass over the event source; returns new pairs
    ///
    /// The chain is only fetched when there is at least one event the
    /// registry has not seen.
    pub async fn discover(&self, reference: NaiveDate) -> Result<Vec<MatchedPair>, FetchError> {
        let started = Instant::now();
        let listed = with_timeout(
            self.schedule.discovery_timeout,
            self.events.list_events(&self.filter),
        )
        .await;
        metrics::record_fetch_latency(FetchSide::Discovery, started.elapsed());
        let listed = listed.inspect_err(|_| metrics::record_fetch_failure(FetchSide::Discovery))?;

        let listed_count = listed.len();
        let candidates: Vec<MarketEvent> = {
            let registry = self.registry.read().await;
            listed
                .into_iter()
                .filter(|e| registry.should_attempt(&e.slug))
                .collect()
        };

        if candidates.is_empty() {
            tracing::info!(listed = listed_count, "Discovery found no new events");
            return Ok(Vec::new());
        }

        let chain = self.fetch_chain().await?;

        let mut activated = Vec::new();
        let mut unmatched = 0usize;
        let active_count = {
            let mut registry = self.registry.write().await;
            for event in &candidates {
                match registry.register(event, &chain, reference) {
                    Registration::Activated(pair) => activated.push(pair),
                    Registration::Unmatched(reason) => {
                        unmatched += 1;
                        metrics::record_unmatched(reason.as_str());
                    }
                    Registration::AlreadyActive(_) => {}
                }
            }
            registry.active_count()
        };
        metrics::set_active_pairs(active_count);

        tracing::info!(
            listed = listed_count,
            candidates = candidates.len(),
            activated = activated.len(),
            unmatched,
            chain = chain.len(),
            "Discovery pass complete"
        );

        Ok(activated)
    }

    fn spawn_poller(&self, pair: MatchedPair, tasks: &mut JoinSet<(PairKey, PollerExit)>) {
        let poller = PairPoller::new(
            pair,
            self.events.clone(),
            self.options.clone(),
            self.sink.clone(),
            self.registry.clone(),
            self.schedule,
        );
        let key = poller.key();
        let shutdown = self.shutdown.subscribe();
        tasks.spawn(async move {
            let exit = poller.run(shutdown).await;
            (key, exit)
        });
    }

    async fn on_exit(&self, joined: Result<(PairKey, PollerExit), JoinError>) {
        match joined {
            Ok((key, PollerExit::Retired(reason))) => {
                tracing::info!(pair = %key, %reason, "Pair finished");
            }
            Ok((_, PollerExit::Shutdown)) => {}
            Err(e) => tracing::error!(error = %e, "Poller task failed"),
        }
        metrics::set_active_pairs(self.registry.read().await.active_count());
    }

    async fn drain(&self, tasks: &mut JoinSet<(PairKey, PollerExit)>) {
        while let Some(joined) = tasks.join_next().await {
            self.on_exit(joined).await;
        }
    }

    /// Link one event and poll it until it retires or shutdown is signalled
    pub async fn run_single(&self, slug: &str) -> anyhow::Result<()> {
        let reference = Utc::now().date_naive();

        match self.link(slug, reference).await? {
            Registration::Activated(pair) => {
                tracing::info!(pair = %pair, "Tracking single pair");
                let mut tasks = JoinSet::new();
                self.spawn_poller(pair, &mut tasks);
                self.drain(&mut tasks).await;
            }
            Registration::AlreadyActive(key) => {
                tracing::warn!(pair = %key, "Pair is already being tracked");
            }
            Registration::Unmatched(reason) => {
                tracing::warn!(slug, reason = reason.as_str(), "Event could not be linked");
            }
        }

        Ok(())
    }

    /// Discover and poll until shutdown
    ///
    /// A failed first discovery pass is fatal; later failures are logged and
    /// the existing pairs keep running. Shutdown interrupts a pass in progress.
    pub async fn run_continuous(&self) -> anyhow::Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        let mut tasks = JoinSet::new();

        let initial = tokio::select! {
            _ = shutdown_signalled(&mut shutdown) => return Ok(()),
            pass = self.discover(Utc::now().date_naive()) => pass,
        };
        for pair in initial.context("Initial discovery failed")? {
            self.spawn_poller(pair, &mut tasks);
        }

        let interval = self.schedule.discovery_interval;
        let mut next_discovery = tokio::time::Instant::now() + interval;

        loop {
            tokio::select! {
                _ = shutdown_signalled(&mut shutdown) => break,
                _ = tokio::time::sleep_until(next_discovery) => {
                    next_discovery += interval;

                    let expired = self.registry.write().await.retire_expired(Utc::now());
                    if !expired.is_empty() {
                        tracing::info!(count = expired.len(), "Retired expired pairs");
                    }

                    let pass = tokio::select! {
                        _ = shutdown_signalled(&mut shutdown) => break,
                        pass = self.discover(Utc::now().date_naive()) => pass,
                    };
                    match pass {
                        Ok(pairs) => {
                            for pair in pairs {
                                self.spawn_poller(pair, &mut tasks);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Discovery failed, keeping existing pairs");
                        }
                    }
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    self.on_exit(joined).await;
                }
            }
        }

        tracing::info!(pollers = tasks.len(), "Shutdown requested, waiting for pollers");
        self.drain(&mut tasks).await;
        Ok(())
    }
}
