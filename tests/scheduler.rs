// tests/scheduler.rs
//
// Timer behaviour on paused tokio time:
// - first cycle fires immediately, then every interval
// - a slow cycle coalesces ticks instead of overlapping
// - a tick that finds a manual cycle in flight is dropped
// - changing the interval re-arms the timer
// - shutdown stops all timers

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use saylor_watch::extract::RecordKind;
use saylor_watch::scheduler::Scheduler;
use saylor_watch::state::MemoryStore;
use saylor_watch::Classification;

const PAGE: &str = "https://watch.example/page";

fn page_watch(fetcher: &Arc<ScriptedFetcher>, secs: u64) -> Arc<saylor_watch::Watch> {
    Arc::new(watch(
        "page",
        RecordKind::Fingerprint,
        Duration::from_secs(secs),
        vec![source("page", 1, PAGE, fetcher.clone(), fingerprint())],
        Arc::new(MemoryStore::new()),
        notifier(RecordingSender::new()),
    ))
}

#[tokio::test(start_paused = true)]
async fn fires_immediately_then_every_interval() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(PAGE, "A");
    let mut sched = Scheduler::new();
    sched.spawn(page_watch(&fetcher, 10));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fetcher.calls(PAGE), 1);

    // ticks at 10, 20, 30
    tokio::time::sleep(Duration::from_secs(34)).await;
    assert_eq!(fetcher.calls(PAGE), 4);

    sched.shutdown().await;
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(fetcher.calls(PAGE), 4);
}

#[tokio::test(start_paused = true)]
async fn slow_cycles_never_overlap() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(PAGE, "A");
    fetcher.set_delay(Duration::from_secs(25));
    let mut sched = Scheduler::new();
    sched.spawn(page_watch(&fetcher, 10));

    tokio::time::sleep(Duration::from_secs(100)).await;
    let calls = fetcher.total_calls();
    assert_eq!(fetcher.max_in_flight(), 1);
    // 10 ticks would have fired without coalescing
    assert!(calls >= 3 && calls <= 5, "calls = {calls}");
    sched.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn tick_during_manual_cycle_is_dropped() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(PAGE, "A");
    fetcher.set_delay(Duration::from_secs(5));
    let w = page_watch(&fetcher, 60);

    let manual = tokio::spawn({
        let w = w.clone();
        async move { w.run_manual().await }
    });
    // let the manual cycle take the lock and park in the fetch
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert!(w.run_scheduled().await.is_none());

    let report = manual.await.unwrap().unwrap();
    assert_eq!(report.classification, Classification::InitialObservation);
    assert_eq!(fetcher.total_calls(), 1);

    // once the lock is free a scheduled cycle runs normally
    let next = w.run_scheduled().await.unwrap().unwrap();
    assert_eq!(next.classification, Classification::NoChange);
}

#[tokio::test(start_paused = true)]
async fn concurrent_manual_triggers_run_one_after_another() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(PAGE, "A");
    fetcher.set_delay(Duration::from_secs(3));
    let w = page_watch(&fetcher, 60);

    let (a, b) = tokio::join!(w.run_manual(), w.run_manual());
    let mut classes = vec![a.unwrap().classification, b.unwrap().classification];
    classes.sort_by_key(|c| c.as_str());
    assert_eq!(
        classes,
        vec![Classification::InitialObservation, Classification::NoChange]
    );
    assert_eq!(fetcher.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn interval_change_rearms_timer() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond(PAGE, "A");
    let w = page_watch(&fetcher, 100);
    let mut sched = Scheduler::new();
    sched.spawn(w.clone());

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(fetcher.calls(PAGE), 1);

    w.set_interval(Duration::from_secs(10)).await.unwrap();
    // re-armed one full period from the change (t = 11), not at t = 100
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(fetcher.calls(PAGE), 2);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fetcher.calls(PAGE), 3);

    sched.shutdown().await;
}
