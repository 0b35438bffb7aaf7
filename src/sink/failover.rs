//! Primary store with a local CSV fallback

use super::{CsvSink, QuoteSink, QuoteSnapshot};
use crate::error::SinkError;
use crate::matcher::MatchedPair;
use crate::telemetry::metrics;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Default)]
struct FailoverState {
    /// Primary is skipped until this instant
    down_until: Option<Instant>,
    /// Pairs whose `ensure_pair` has not reached the primary yet
    pending_pairs: Vec<MatchedPair>,
}

/// Writes to the primary sink, diverting to CSV while it is failing
///
/// A row goes to exactly one destination. After a primary failure the
/// primary is not retried for `retry_after`; rows written to the fallback in
/// the meantime stay there and are never replayed.
pub struct FailoverSink {
    primary: Arc<dyn QuoteSink>,
    fallback: CsvSink,
    retry_after: Duration,
    state: Mutex<FailoverState>,
}

impl FailoverSink {
    pub fn new(primary: Arc<dyn QuoteSink>, fallback: CsvSink, retry_after: Duration) -> Self {
        Self {
            primary,
            fallback,
            retry_after,
            state: Mutex::new(FailoverState::default()),
        }
    }

    pub fn fallback_path(&self) -> &Path {
        self.fallback.path()
    }

    /// Whether the primary should be tried now
    pub async fn primary_available(&self) -> bool {
        let state = self.state.lock().await;
        state.down_until.map_or(true, |t| Instant::now() >= t)
    }

    async fn mark_down(&self, error: &SinkError) {
        let mut state = self.state.lock().await;
        let was_up = state.down_until.is_none();
        state.down_until = Some(Instant::now() + self.retry_after);
        if was_up {
            tracing::warn!(
                error = %error,
                retry_after_secs = self.retry_after.as_secs(),
                fallback = %self.fallback.path().display(),
                "Primary store failed, writing to fallback"
            );
        } else {
            tracing::debug!(error = %error, "Primary store still failing");
        }
    }

    async fn mark_up(&self) {
        let mut state = self.state.lock().await;
        if state.down_until.take().is_some() {
            tracing::info!("Primary store recovered");
        }
    }

    /// Re-issue pair creation that failed while the primary was down
    async fn flush_pending_pairs(&self) -> Result<(), SinkError> {
        let pending = std::mem::take(&mut self.state.lock().await.pending_pairs);
        if pending.is_empty() {
            return Ok(());
        }

        let mut remaining = Vec::new();
        let mut failure = None;
        for pair in pending {
            if failure.is_some() {
                remaining.push(pair);
                continue;
            }
            if let Err(e) = self.primary.ensure_pair(&pair).await {
                remaining.push(pair);
                failure = Some(e);
            }
        }

        if !remaining.is_empty() {
            self.state.lock().await.pending_pairs.extend(remaining);
        }
        failure.map_or(Ok(()), Err)
    }

    async fn defer_pair(&self, pair: &MatchedPair) {
        let mut state = self.state.lock().await;
        if !state.pending_pairs.iter().any(|p| p.key() == pair.key()) {
            state.pending_pairs.push(pair.clone());
        }
    }

    async fn try_primary(&self, snapshot: &QuoteSnapshot) -> Result<(), SinkError> {
        self.flush_pending_pairs().await?;
        self.primary.write(snapshot).await
    }
}

#[async_trait]
impl QuoteSink for FailoverSink {
    async fn ensure_pair(&self, pair: &MatchedPair) -> Result<(), SinkError> {
        self.fallback.ensure_pair(pair).await?;

        if !self.primary_available().await {
            self.defer_pair(pair).await;
            return Ok(());
        }

        if let Err(e) = self.primary.ensure_pair(pair).await {
            self.mark_down(&e).await;
            self.defer_pair(pair).await;
        }
        Ok(())
    }

    async fn write(&self, snapshot: &QuoteSnapshot) -> Result<(), SinkError> {
        if self.primary_available().await {
            match self.try_primary(snapshot).await {
                Ok(()) => {
                    self.mark_up().await;
                    return Ok(());
                }
                Err(e) => self.mark_down(&e).await,
            }
        }

        self.fallback.write(snapshot).await?;
        metrics::record_fallback_write();
        Ok(())
    }
}
