//! Failure handling in the poll loop and discovery

use crate::common::{
    above_70k, call_symbol, chain, event, event_date, question, reference, runner, Fault,
    MemorySink, MockEvents, MockOptions,
};
use chrono::Duration as Days;
use poly_deribit_link::error::FetchError;
use poly_deribit_link::registry::{PairState, RetireReason};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_test::assert_ok;

#[tokio::test(start_paused = true)]
async fn test_failed_ticks_back_off_and_polling_resumes() {
    let events = Arc::new(MockEvents::with_events(vec![event("btc-70k", &above_70k())]));
    // Read 1 links; read 2 polls fine; 3-4 fail; 5 hangs past the timeout;
    // 6 recovers; 7 reports the event closed
    events.fault_on("btc-70k", [3, 4], Fault::Error);
    events.fault_on("btc-70k", [5], Fault::Hang(Duration::from_secs(100)));
    events.close_after("btc-70k", 6);
    let sink = Arc::new(MemorySink::default());
    let runner = runner(events, Arc::new(MockOptions::new(chain())), sink.clone());

    let started = Instant::now();
    assert_ok!(runner.run_single("btc-70k").await);
    let elapsed = started.elapsed();

    // 60 interval, 5 + 10 backoff, 15 timeout, 20 backoff, 60 interval
    assert!(elapsed >= Duration::from_secs(170), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(171), "elapsed {elapsed:?}");

    let snapshots = sink.snapshots();
    assert_eq!(snapshots.len(), 2);
    assert!(snapshots[1].timestamp > snapshots[0].timestamp);
    assert_eq!(
        runner.registry().read().await.state_of("btc-70k"),
        Some(PairState::Retired(RetireReason::EventClosed))
    );
}

#[tokio::test(start_paused = true)]
async fn test_option_timeout_skips_tick() {
    let events = Arc::new(MockEvents::with_events(vec![event("btc-70k", &above_70k())]));
    events.close_after("btc-70k", 3);
    let options = Arc::new(MockOptions::new(chain()));
    options.fault_on(&call_symbol(70000), [1], Fault::Hang(Duration::from_secs(100)));
    let sink = Arc::new(MemorySink::default());
    let runner = runner(events, options, sink.clone());

    let started = Instant::now();
    assert_ok!(runner.run_single("btc-70k").await);
    let elapsed = started.elapsed();

    // 15 timeout, 5 backoff, 60 interval
    assert!(elapsed >= Duration::from_secs(80), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(81), "elapsed {elapsed:?}");
    assert_eq!(sink.snapshots().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failing_pair_does_not_stall_others() {
    let events = Arc::new(MockEvents::with_events(vec![
        event("btc-70k", &above_70k()),
        event(
            "btc-72k",
            &question("above", "72,000", event_date() + Days::days(1)),
        ),
    ]));
    // Pollers make the first reads; btc-70k alternates errors and hangs
    events.fault_on("btc-70k", [1, 3, 5], Fault::Error);
    events.fault_on("btc-70k", [2, 4, 6], Fault::Hang(Duration::from_secs(1000)));
    let sink = Arc::new(MemorySink::default());
    let runner = Arc::new(runner(events, Arc::new(MockOptions::new(chain())), sink.clone()));
    let handle = runner.shutdown_handle();

    let task = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run_continuous().await })
    };

    while sink.snapshots_for("btc-70k").is_empty() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    // btc-70k recovers after 240s; btc-72k kept its 60s cadence meanwhile
    assert!(sink.snapshots_for("btc-72k").len() >= 4);

    handle.shutdown();
    assert_ok!(task.await.unwrap());
    assert_eq!(runner.registry().read().await.active_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_listing_is_bounded() {
    let events = Arc::new(MockEvents::with_events(vec![event("btc-70k", &above_70k())]));
    events.delay_listing(Duration::from_secs(1000));
    let options = Arc::new(MockOptions::new(chain()));
    let runner = runner(events, options.clone(), Arc::new(MemorySink::default()));

    let result = runner.discover(reference()).await;
    assert!(
        matches!(result, Err(FetchError::Timeout(d)) if d == Duration::from_secs(120)),
        "{result:?}"
    );
    assert_eq!(options.chain_fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_initial_discovery() {
    let events = Arc::new(MockEvents::with_events(vec![event("btc-70k", &above_70k())]));
    events.delay_listing(Duration::from_secs(1000));
    let runner = Arc::new(runner(
        events,
        Arc::new(MockOptions::new(chain())),
        Arc::new(MemorySink::default()),
    ));
    let handle = runner.shutdown_handle();

    let started = Instant::now();
    let task = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run_continuous().await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.shutdown();

    assert_ok!(task.await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(120));
    assert_eq!(runner.registry().read().await.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_interrupts_later_discovery() {
    let events = Arc::new(MockEvents::with_events(vec![event("btc-70k", &above_70k())]));
    let sink = Arc::new(MemorySink::default());
    let runner = Arc::new(runner(
        events.clone(),
        Arc::new(MockOptions::new(chain())),
        sink.clone(),
    ));
    let handle = runner.shutdown_handle();

    let started = Instant::now();
    let task = {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run_continuous().await })
    };
    while sink.snapshots().is_empty() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    // The second pass starts at 3600s and would hang until the 120s bound
    events.delay_listing(Duration::from_secs(1000));
    tokio::time::sleep_until(started + Duration::from_secs(3610)).await;
    handle.shutdown();

    assert_ok!(task.await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(3720));
    assert_eq!(runner.registry().read().await.active_count(), 1);
}
