// tests/app_context.rs
//
// AppContext wiring from a parsed config: rejected targets do not stop the
// others, operator commands route by target id, status report and startup
// message.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use saylor_watch::config::WatchConfig;
use saylor_watch::error::{ConfigError, WatchError};
use saylor_watch::notify::Delivery;
use saylor_watch::state::MemoryStore;
use saylor_watch::{AppContext, Classification};

const CONFIG: &str = r#"
    [[targets]]
    id = "purchases"
    interval_secs = 600
    kind = "structured"

    [[targets.sources]]
    name = "site"
    priority = 1
    endpoint = "https://site.example/purchases"
    extractor = { type = "html_table", anchor = "Date" }

    [[targets.sources]]
    name = "api"
    priority = 2
    endpoint = "https://api.example/purchases"
    extractor = { type = "json", records = "/data" }

    [[targets]]
    id = "broken"
    interval_secs = 0
    kind = "fingerprint"

    [[targets.sources]]
    name = "x"
    priority = 1
    endpoint = "https://x.example/"
    extractor = { type = "fingerprint" }
"#;

async fn context(fetcher: &Arc<ScriptedFetcher>, sender: &Arc<RecordingSender>) -> AppContext {
    let cfg: WatchConfig = toml::from_str(CONFIG).unwrap();
    let (plans, rejected) = cfg.validate();
    AppContext::from_parts(
        plans,
        rejected,
        fetcher.clone(),
        Arc::new(MemoryStore::new()),
        notifier(sender.clone()),
        false,
    )
    .await
}

#[tokio::test]
async fn rejected_target_is_reported_and_others_run() {
    let fetcher = ScriptedFetcher::new();
    let ctx = context(&fetcher, &RecordingSender::new()).await;
    assert_eq!(ctx.target_ids(), vec!["purchases"]);
    assert!(matches!(
        ctx.rejected(),
        [ConfigError::NonPositiveInterval { target }] if target == "broken"
    ));
    assert!(matches!(
        ctx.check_now("broken").await,
        Err(WatchError::UnknownTarget(_))
    ));
}

#[tokio::test]
async fn check_now_falls_back_to_json_api() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond("https://site.example/purchases", "<html>maintenance</html>");
    fetcher.respond("https://api.example/purchases", PURCHASES_JSON);
    let ctx = context(&fetcher, &RecordingSender::new()).await;

    let r = ctx.check_now("purchases").await.unwrap();
    assert_eq!(r.classification, Classification::InitialObservation);
    assert_eq!(r.source.as_deref(), Some("api"));
    assert_eq!(r.record.unwrap().change_key(), "2025-10-06");

    // site recovers with the same purchase: no change across providers
    fetcher.respond("https://site.example/purchases", PURCHASES_V1);
    let r = ctx.check_now("purchases").await.unwrap();
    assert_eq!(r.classification, Classification::NoChange);
    assert_eq!(r.source.as_deref(), Some("site"));
}

#[tokio::test]
async fn exhausted_manual_check_reports_failure_to_caller() {
    let fetcher = ScriptedFetcher::new();
    let sender = RecordingSender::new();
    let ctx = context(&fetcher, &sender).await;
    let r = ctx.check_now("purchases").await.unwrap();
    assert_eq!(r.classification, Classification::Exhausted);
    assert!(r.exhausted.unwrap().to_string().contains("all 2 sources exhausted"));
    assert!(sender.messages().is_empty());
}

#[tokio::test]
async fn commands_status_and_startup_message() {
    let fetcher = ScriptedFetcher::new();
    let sender = RecordingSender::new();
    let ctx = context(&fetcher, &sender).await;

    ctx.set_interval("purchases", Duration::from_secs(120)).await.unwrap();
    ctx.set_endpoint("purchases", "https://site.example/v2").await.unwrap();
    let st = ctx.status("purchases").await.unwrap();
    assert_eq!(st.interval_secs, 120);
    assert_eq!(st.endpoint, "https://site.example/v2");
    assert_eq!(st.sources, vec!["site", "api"]);
    assert!(!st.tracking);
    assert_eq!(st.state_location, "<memory>");

    assert_eq!(ctx.announce_startup().await, Some(Delivery::Delivered));
    let msgs = sender.messages();
    assert!(msgs[0].contains("Watcher started"));
    assert!(msgs[0].contains("every 120s"));
}

#[tokio::test]
async fn report_status_sends_status_to_chat() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond("https://site.example/purchases", PURCHASES_V1);
    let sender = RecordingSender::new();
    let ctx = context(&fetcher, &sender).await;
    ctx.check_now("purchases").await.unwrap();

    assert_eq!(
        ctx.report_status("purchases").await.unwrap(),
        Some(Delivery::Delivered)
    );
    let msgs = sender.messages();
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].contains("<b>Status</b> <code>purchases</code>"));
    assert!(msgs[0].contains("tracking: yes"));
    assert!(msgs[0].contains("last source: site"));

    assert!(matches!(
        ctx.report_status("broken").await,
        Err(WatchError::UnknownTarget(_))
    ));

    sender.set_failing(true);
    assert_eq!(ctx.report_status("purchases").await.unwrap(), None);
}

#[tokio::test]
async fn start_and_shutdown() {
    let fetcher = ScriptedFetcher::new();
    fetcher.respond("https://site.example/purchases", PURCHASES_V1);
    let mut ctx = context(&fetcher, &RecordingSender::new()).await;
    ctx.start();
    ctx.start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(fetcher.calls("https://site.example/purchases"), 1);
    ctx.shutdown().await;
}
