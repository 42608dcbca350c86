// tests/common/mod.rs
// Shared doubles: a scripted fetcher keyed by URL, a recording sender, and
// builders for watches over an in-memory store.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use saylor_watch::error::FetchError;
use saylor_watch::extract::{
    Extractor, FingerprintExtractor, HtmlTableExtractor, RecordKind, TableColumns,
};
use saylor_watch::fetch::Fetcher;
use saylor_watch::notify::{MessageSender, Notifier};
use saylor_watch::source_chain::{SourceChain, SourceDescriptor};
use saylor_watch::state::StateStore;
use saylor_watch::watch::{Watch, WatchTarget};

pub const PURCHASES_V1: &str = include_str!("../fixtures/purchases_v1.html");
pub const PURCHASES_V1_REFORMATTED: &str = include_str!("../fixtures/purchases_v1_reformatted.html");
pub const PURCHASES_V2: &str = include_str!("../fixtures/purchases_v2.html");
pub const PURCHASES_JSON: &str = include_str!("../fixtures/purchases.json");

/// Responds per URL with whatever was last scripted; unknown URLs are a
/// network error. Optional delay runs on tokio time (pausable).
#[derive(Default)]
pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Result<Vec<u8>, FetchError>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, url: &str, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.as_bytes().to_vec()));
    }

    pub fn fail(&self, url: &str, err: FetchError) {
        self.responses.lock().unwrap().insert(url.to_string(), Err(err));
    }

    pub fn set_delay(&self, d: Duration) {
        *self.delay.lock().unwrap() = d;
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, endpoint: &Url, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default() += 1;

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let out = self
            .responses
            .lock()
            .unwrap()
            .get(endpoint.as_str())
            .cloned()
            .unwrap_or_else(|| Err(FetchError::Network(format!("no script for {endpoint}"))));
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

/// Records every message; can be switched to fail.
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<String>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, _recipient: &str, text: &str) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("telegram unreachable");
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub fn notifier(sender: Arc<RecordingSender>) -> Arc<Notifier> {
    Arc::new(Notifier::new(sender, Some("chat-1".into())))
}

pub fn source(
    name: &str,
    priority: i64,
    url: &str,
    fetcher: Arc<ScriptedFetcher>,
    extractor: Arc<dyn Extractor>,
) -> SourceDescriptor {
    SourceDescriptor {
        name: name.into(),
        priority,
        endpoint: Url::parse(url).unwrap(),
        timeout: Duration::from_secs(5),
        cache_ttl: Duration::ZERO,
        fetcher,
        extractor,
    }
}

pub fn fingerprint() -> Arc<dyn Extractor> {
    Arc::new(FingerprintExtractor::default())
}

pub fn purchase_table() -> Arc<dyn Extractor> {
    Arc::new(HtmlTableExtractor::new("Date", TableColumns::default()))
}

pub fn watch(
    id: &str,
    kind: RecordKind,
    interval: Duration,
    sources: Vec<SourceDescriptor>,
    store: Arc<dyn StateStore>,
    notifier: Arc<Notifier>,
) -> Watch {
    Watch::new(
        WatchTarget {
            id: id.into(),
            kind,
            interval,
        },
        SourceChain::new(sources),
        store,
        notifier,
    )
}
