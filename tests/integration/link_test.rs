//! Linking, discovery and poller lifecycle against in-memory sources

use crate::common::{
    above_70k, call_symbol, chain, event, event_date, option, question, reference, runner,
    MemorySink, MockEvents, MockOptions,
};
use chrono::Duration as Days;
use poly_deribit_link::options::OptionKind;
use poly_deribit_link::registry::{PairState, Registration, RetireReason, UnmatchedReason};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_link_picks_nearest_call() {
    let events = Arc::new(MockEvents::with_events(vec![event("btc-70k", &above_70k())]));
    let options = Arc::new(MockOptions::new(chain()));
    let runner = runner(events, options, Arc::new(MemorySink::default()));

    let Registration::Activated(pair) = runner.link("btc-70k", reference()).await.unwrap() else {
        panic!("expected activation");
    };
    assert_eq!(pair.option_symbol, call_symbol(70000));
    assert_eq!(pair.match_distance, dec!(0));

    // Linking again leaves the existing pair alone
    let again = runner.link("btc-70k", reference()).await.unwrap();
    assert_eq!(again, Registration::AlreadyActive(pair.key()));
}

#[tokio::test]
async fn test_link_below_question_matches_put() {
    let events = Arc::new(MockEvents::with_events(vec![event(
        "btc-below-69k",
        &question("below", "69,500", event_date()),
    )]));
    let options = Arc::new(MockOptions::new(chain()));
    let runner = runner(events, options, Arc::new(MemorySink::default()));

    let Registration::Activated(pair) = runner.link("btc-below-69k", reference()).await.unwrap()
    else {
        panic!("expected activation");
    };
    assert_eq!(pair.matched_option.kind, OptionKind::Put);
    assert_eq!(pair.match_distance, dec!(500));
}

#[tokio::test]
async fn test_link_unknown_slug_is_an_error() {
    let events = Arc::new(MockEvents::default());
    let options = Arc::new(MockOptions::new(chain()));
    let runner = runner(events, options.clone(), Arc::new(MemorySink::default()));

    assert_err!(runner.link("missing", reference()).await);
    assert_eq!(options.chain_fetches(), 0);
}

#[tokio::test]
async fn test_discover_records_unmatched_and_skips_known_slugs() {
    let events = Arc::new(MockEvents::with_events(vec![
        event("btc-70k", &above_70k()),
        // No listed expiry within a week of this date
        event("btc-far", &question("above", "70,000", event_date() + Days::days(180))),
        event(
            "eth-4k",
            &format!("Will Ethereum be above $4,000 on {}?", event_date().format("%B %-d, %Y")),
        ),
    ]));
    let options = Arc::new(MockOptions::new(chain()));
    let runner = runner(events.clone(), options.clone(), Arc::new(MemorySink::default()));

    let pairs = runner.discover(reference()).await.unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].event_slug, "btc-70k");
    assert_eq!(options.chain_fetches(), 1);

    let registry = runner.registry();
    {
        let registry = registry.read().await;
        assert_eq!(
            registry.state_of("btc-far"),
            Some(PairState::Unmatched(UnmatchedReason::NoMatch))
        );
        // Filtered out before matching
        assert_eq!(registry.state_of("eth-4k"), None);
    }

    // Nothing new: no chain fetch and no pairs
    let pairs = runner.discover(reference()).await.unwrap();
    assert!(pairs.is_empty());
    assert_eq!(options.chain_fetches(), 1);

    // A new event triggers one more fetch
    events.insert(event(
        "btc-72k",
        &question("above", "72,000", event_date() + Days::days(1)),
    ));
    let pairs = runner.discover(reference()).await.unwrap();
    assert_eq!(pairs.len(), 1);
    assert_eq!(pairs[0].option_symbol, call_symbol(72000));
    assert_eq!(options.chain_fetches(), 2);
    assert_eq!(registry.read().await.active_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_run_single_retires_when_event_closes() {
    let events = Arc::new(MockEvents::with_events(vec![event("btc-70k", &above_70k())]));
    // One read for linking, two polled ticks, then closed
    events.close_after("btc-70k", 3);
    let options = Arc::new(MockOptions::new(chain()));
    let sink = Arc::new(MemorySink::default());
    let runner = runner(events, options, sink.clone());

    assert_ok!(runner.run_single("btc-70k").await);

    let snapshots = sink.snapshots();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots[1].timestamp > snapshots[0].timestamp);
    assert_eq!(snapshots[0].option_symbol, call_symbol(70000));
    assert_eq!(snapshots[0].event_yes_bid, Some(dec!(0.52)));
    assert_eq!(snapshots[0].event_no_ask, Some(dec!(0.48)));
    assert_eq!(snapshots[0].option_bid_usd, Some(dec!(1700.000)));
    assert_eq!(sink.pairs().len(), 1);

    let registry = runner.registry();
    assert_eq!(
        registry.read().await.state_of("btc-70k"),
        Some(PairState::Retired(RetireReason::EventClosed))
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_option_invalidates_pair() {
    let events = Arc::new(MockEvents::with_events(vec![event("btc-70k", &above_70k())]));
    // The chain lists the option but quotes come from a source that no longer has it
    let listing = Arc::new(MockOptions::new(chain()));
    let sink = Arc::new(MemorySink::default());
    let runner = runner(events.clone(), listing, sink.clone());
    runner.link("btc-70k", reference()).await.unwrap();
    let pair = runner.registry().read().await.active_pairs().remove(0);

    let delisted = Arc::new(MockOptions::new(vec![option(OptionKind::Call, dec!(68000))]));
    let poller = poly_deribit_link::poller::PairPoller::new(
        pair,
        events,
        delisted,
        sink.clone(),
        runner.registry(),
        crate::common::schedule(),
    );
    let (_tx, rx) = tokio::sync::watch::channel(false);

    let exit = poller.run(rx).await;
    assert_eq!(
        exit,
        poly_deribit_link::poller::PollerExit::Retired(RetireReason::Invalidated)
    );
    assert!(sink.snapshots().is_empty());
    assert_eq!(
        runner.registry().read().await.state_of("btc-70k"),
        Some(PairState::Retired(RetireReason::Invalidated))
    );
}

#[tokio::test(start_paused = true)]
async fn test_continuous_run_stops_on_shutdown() {
    let events = Arc::new(MockEvents::with_events(vec![
        event("btc-70k", &above_70k()),
        event(
            "btc-72k",
            &question("above", "72,000", event_date() + Days::days(1)),
        ),
    ]));
    let options = Arc::new(MockOptions::new(chain()));
    let sink = Arc::new(MemorySink::default());
    let runner = Arc::new(runner(events, options, sink.clone()));
    let handle = runner.shutdown_handle();

    let task = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run_continuous().await })
    };

    while sink.snapshots_for("btc-70k").len() < 3 || sink.snapshots_for("btc-72k").len() < 3 {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    handle.shutdown();
    assert!(handle.is_shutdown());
    assert_ok!(task.await.unwrap());

    let written = sink.snapshots().len();
    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(sink.snapshots().len(), written);

    // Shutdown stops polling without retiring anything
    assert_eq!(runner.registry().read().await.active_count(), 2);

    for slug in ["btc-70k", "btc-72k"] {
        let snapshots = sink.snapshots_for(slug);
        assert!(snapshots.windows(2).all(|w| w[1].timestamp > w[0].timestamp));
    }
}

#[tokio::test]
async fn test_initial_discovery_failure_is_fatal() {
    let events = Arc::new(MockEvents::with_events(vec![event("btc-70k", &above_70k())]));
    events.fail_listing(true);
    let options = Arc::new(MockOptions::new(chain()));
    let runner = runner(events, options.clone(), Arc::new(MemorySink::default()));

    assert_err!(runner.run_continuous().await);
    assert_eq!(options.chain_fetches(), 0);
}
