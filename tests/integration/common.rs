//! In-memory sources and sinks shared by the integration tests

use async_trait::async_trait;
use chrono::{Duration as Days, NaiveDate, Utc};
use poly_deribit_link::error::{FetchError, SinkError};
use poly_deribit_link::market::{EventFilter, EventSource, MarketEvent, OutcomeQuotes, Quote};
use poly_deribit_link::matcher::{MatchedPair, OptionMatcher, PairKey};
use poly_deribit_link::options::{
    OptionChainSource, OptionKind, OptionQuote, OptionRecord, RawExpiry,
};
use poly_deribit_link::poller::{LinkRunner, Schedule};
use poly_deribit_link::registry::PairRegistry;
use poly_deribit_link::sink::{QuoteSink, QuoteSnapshot};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn reference() -> NaiveDate {
    Utc::now().date_naive()
}

/// Date named in the default event questions
pub fn event_date() -> NaiveDate {
    reference() + Days::days(60)
}

/// Expiry of every option in [`chain`]
pub fn option_expiry() -> NaiveDate {
    event_date() + Days::days(4)
}

/// Deribit token for [`option_expiry`], e.g. `4JUL27`
pub fn expiry_token() -> String {
    option_expiry().format("%-d%b%y").to_string().to_uppercase()
}

pub fn call_symbol(strike: u32) -> String {
    format!("BTC-{}-{}-C", expiry_token(), strike)
}

/// e.g. "Will Bitcoin be above $70,000 on July 4, 2027?"
pub fn question(direction: &str, amount: &str, date: NaiveDate) -> String {
    format!(
        "Will Bitcoin be {direction} ${amount} on {}?",
        date.format("%B %-d, %Y")
    )
}

pub fn above_70k() -> String {
    question("above", "70,000", event_date())
}

pub fn event(slug: &str, question: &str) -> MarketEvent {
    MarketEvent {
        slug: slug.to_string(),
        question: question.to_string(),
        expiry_hint: None,
        outcomes: OutcomeQuotes::from_yes(Quote {
            bid: Some(dec!(0.52)),
            ask: Some(dec!(0.55)),
        }),
        active: true,
        closed: false,
    }
}

pub fn option(kind: OptionKind, strike: Decimal) -> OptionRecord {
    let code = match kind {
        OptionKind::Call => "C",
        OptionKind::Put => "P",
    };
    let token = expiry_token();
    OptionRecord {
        symbol: format!("BTC-{token}-{strike}-{code}"),
        kind,
        strike,
        expiry: RawExpiry::Token(token),
        bid: Some(dec!(0.025)),
        ask: Some(dec!(0.027)),
        mark_iv: Some(dec!(51.2)),
        underlying_price: Some(dec!(68000)),
        greeks: None,
    }
}

/// Calls at 68000, 70000 and 72000 plus a 70000 put, one expiry
pub fn chain() -> Vec<OptionRecord> {
    vec![
        option(OptionKind::Call, dec!(68000)),
        option(OptionKind::Call, dec!(70000)),
        option(OptionKind::Call, dec!(72000)),
        option(OptionKind::Put, dec!(70000)),
    ]
}

/// Misbehaviour injected into one call
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Return a transport error
    Error,
    /// Sleep this long before answering normally
    Hang(Duration),
}

impl Fault {
    async fn apply(self) -> Result<(), FetchError> {
        match self {
            Fault::Error => Err(FetchError::Http("connection reset".to_string())),
            Fault::Hang(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
        }
    }
}

/// Event source backed by a map
///
/// Reads are counted per slug, so faults and closing can be scheduled for a
/// given read.
#[derive(Default)]
pub struct MockEvents {
    events: Mutex<HashMap<String, MarketEvent>>,
    reads: Mutex<HashMap<String, usize>>,
    close_after: Mutex<HashMap<String, usize>>,
    faults: Mutex<HashMap<(String, usize), Fault>>,
    fail_listing: AtomicBool,
    listing_delay: Mutex<Option<Duration>>,
}

impl MockEvents {
    pub fn with_events(events: Vec<MarketEvent>) -> Self {
        let mock = Self::default();
        for event in events {
            mock.insert(event);
        }
        mock
    }

    /// Report the event as closed from read number `reads + 1` onwards
    pub fn close_after(&self, slug: &str, reads: usize) {
        self.close_after.lock().unwrap().insert(slug.to_string(), reads);
    }

    /// Misbehave on the given reads of a slug (1-based)
    pub fn fault_on(&self, slug: &str, reads: impl IntoIterator<Item = usize>, fault: Fault) {
        let mut faults = self.faults.lock().unwrap();
        for read in reads {
            faults.insert((slug.to_string(), read), fault);
        }
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn delay_listing(&self, delay: Duration) {
        *self.listing_delay.lock().unwrap() = Some(delay);
    }

    pub fn insert(&self, event: MarketEvent) {
        self.events.lock().unwrap().insert(event.slug.clone(), event);
    }
}

#[async_trait]
impl EventSource for MockEvents {
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<MarketEvent>, FetchError> {
        let delay = *self.listing_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(FetchError::Http("connection refused".to_string()));
        }
        let mut events: Vec<MarketEvent> = self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(events)
    }

    async fn get_event(&self, slug: &str) -> Result<Option<MarketEvent>, FetchError> {
        let read = {
            let mut reads = self.reads.lock().unwrap();
            let count = reads.entry(slug.to_string()).or_default();
            *count += 1;
            *count
        };

        let fault = self.faults.lock().unwrap().get(&(slug.to_string(), read)).copied();
        if let Some(fault) = fault {
            fault.apply().await?;
        }

        let mut event = self.events.lock().unwrap().get(slug).cloned();
        let limit = self.close_after.lock().unwrap().get(slug).copied();
        if let (Some(event), Some(limit)) = (event.as_mut(), limit) {
            if read > limit {
                event.closed = true;
            }
        }
        Ok(event)
    }
}

/// Option source serving a fixed chain; unknown symbols are not found
pub struct MockOptions {
    chain: Vec<OptionRecord>,
    chain_fetches: AtomicUsize,
    quote_calls: Mutex<HashMap<String, usize>>,
    faults: Mutex<HashMap<(String, usize), Fault>>,
}

impl MockOptions {
    pub fn new(chain: Vec<OptionRecord>) -> Self {
        Self {
            chain,
            chain_fetches: AtomicUsize::new(0),
            quote_calls: Mutex::new(HashMap::new()),
            faults: Mutex::new(HashMap::new()),
        }
    }

    pub fn chain_fetches(&self) -> usize {
        self.chain_fetches.load(Ordering::SeqCst)
    }

    /// Misbehave on the given quote calls for a symbol (1-based)
    pub fn fault_on(&self, symbol: &str, calls: impl IntoIterator<Item = usize>, fault: Fault) {
        let mut faults = self.faults.lock().unwrap();
        for call in calls {
            faults.insert((symbol.to_string(), call), fault);
        }
    }
}

#[async_trait]
impl OptionChainSource for MockOptions {
    async fn fetch_chain(&self, _currency: &str) -> Result<Vec<OptionRecord>, FetchError> {
        self.chain_fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.chain.clone())
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<OptionQuote, FetchError> {
        let call = {
            let mut calls = self.quote_calls.lock().unwrap();
            let count = calls.entry(symbol.to_string()).or_default();
            *count += 1;
            *count
        };

        let fault = self.faults.lock().unwrap().get(&(symbol.to_string(), call)).copied();
        if let Some(fault) = fault {
            fault.apply().await?;
        }

        let record = self
            .chain
            .iter()
            .find(|o| o.symbol == symbol)
            .ok_or_else(|| FetchError::NotFound(symbol.to_string()))?;
        Ok(OptionQuote {
            symbol: record.symbol.clone(),
            bid: record.bid,
            ask: record.ask,
            mark_iv: record.mark_iv,
            underlying_price: record.underlying_price,
            greeks: None,
            timestamp: Utc::now(),
        })
    }
}

/// Sink that keeps everything in memory
#[derive(Default)]
pub struct MemorySink {
    pairs: Mutex<Vec<PairKey>>,
    snapshots: Mutex<Vec<QuoteSnapshot>>,
}

impl MemorySink {
    pub fn pairs(&self) -> Vec<PairKey> {
        self.pairs.lock().unwrap().clone()
    }

    pub fn snapshots(&self) -> Vec<QuoteSnapshot> {
        self.snapshots.lock().unwrap().clone()
    }

    pub fn snapshots_for(&self, slug: &str) -> Vec<QuoteSnapshot> {
        self.snapshots()
            .into_iter()
            .filter(|s| s.slug == slug)
            .collect()
    }
}

#[async_trait]
impl QuoteSink for MemorySink {
    async fn ensure_pair(&self, pair: &MatchedPair) -> Result<(), SinkError> {
        let mut pairs = self.pairs.lock().unwrap();
        let key = pair.key();
        if !pairs.contains(&key) {
            pairs.push(key);
        }
        Ok(())
    }

    async fn write(&self, snapshot: &QuoteSnapshot) -> Result<(), SinkError> {
        self.snapshots.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

pub fn schedule() -> Schedule {
    Schedule {
        interval: Duration::from_secs(60),
        retry_delay: Duration::from_secs(5),
        fetch_timeout: Duration::from_secs(15),
        discovery_interval: Duration::from_secs(3600),
        discovery_timeout: Duration::from_secs(120),
    }
}

pub fn runner(
    events: Arc<MockEvents>,
    options: Arc<MockOptions>,
    sink: Arc<dyn QuoteSink>,
) -> LinkRunner {
    LinkRunner::new(
        events,
        options,
        sink,
        PairRegistry::new(OptionMatcher::new()),
        EventFilter::default(),
        "BTC",
        schedule(),
    )
}
