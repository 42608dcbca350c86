// src/watch.rs
//! One monitored fact at runtime.
//!
//! The source chain sits behind a `tokio::sync::Mutex` that doubles as the
//! single-flight guard: scheduled ticks `try_lock` and drop out when a cycle
//! is in progress; manual triggers and operator commands wait for it.
//!
//! Cycle ordering:
//! 1. load the persisted state (failure abandons the cycle);
//! 2. resolve through the chain;
//! 3. exhausted → only `lastCheckedAt` may move;
//!    initial observation / no change → persist;
//!    changed → notify first, persist only if the notification went out
//!    (or was suppressed), so an undelivered change is re-announced next cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use reqwest::Url;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::change_detector::{detect, Classification, Detection};
use crate::error::{ConfigError, Exhausted, WatchError};
use crate::extract::{ExtractedRecord, RecordKind};
use crate::notify::{message, Delivery, Notifier};
use crate::source_chain::SourceChain;
use crate::state::{Phase, StateStore, WatchState};

/// Static description of a target, as validated from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub id: String,
    pub kind: RecordKind,
    pub interval: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum DeliveryStatus {
    Delivered,
    Suppressed,
    Failed(String),
}

impl From<Delivery> for DeliveryStatus {
    fn from(d: Delivery) -> Self {
        match d {
            Delivery::Delivered => DeliveryStatus::Delivered,
            Delivery::Suppressed => DeliveryStatus::Suppressed,
        }
    }
}

/// Everything a caller (scheduler log line or "check now" command) needs.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub target_id: String,
    pub trigger: Trigger,
    pub classification: Classification,
    pub checked_at: DateTime<Utc>,
    pub source: Option<String>,
    pub record: Option<ExtractedRecord>,
    pub previous: Option<ExtractedRecord>,
    pub delivery: Option<DeliveryStatus>,
    pub exhausted: Option<Exhausted>,
}

/// Read-only status fields for an external reporter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStatus {
    pub target_id: String,
    pub kind: RecordKind,
    pub endpoint: String,
    pub sources: Vec<String>,
    pub interval_secs: u64,
    pub tracking: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_changed_at: Option<DateTime<Utc>>,
    pub source_used: Option<String>,
    pub state_location: String,
}

pub struct Watch {
    target: WatchTarget,
    chain: Mutex<SourceChain>,
    interval: watch::Sender<Duration>,
    store: Arc<dyn StateStore>,
    notifier: Arc<Notifier>,
    notify_on_baseline: bool,
}

/// Parses and checks an operator-supplied endpoint.
pub fn parse_endpoint(target: &str, raw: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        target: target.to_string(),
        endpoint: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(url)
}

impl Watch {
    pub fn new(
        target: WatchTarget,
        chain: SourceChain,
        store: Arc<dyn StateStore>,
        notifier: Arc<Notifier>,
    ) -> Self {
        let (interval, _) = watch::channel(target.interval);
        Self {
            target,
            chain: Mutex::new(chain),
            interval,
            store,
            notifier,
            notify_on_baseline: false,
        }
    }

    /// Also announce the first observation of a target.
    pub fn with_baseline_notifications(mut self, on: bool) -> Self {
        self.notify_on_baseline = on;
        self
    }

    pub fn id(&self) -> &str {
        &self.target.id
    }

    pub fn interval(&self) -> Duration {
        *self.interval.borrow()
    }

    pub fn subscribe_interval(&self) -> watch::Receiver<Duration> {
        self.interval.subscribe()
    }

    /// Re-apply operator overrides persisted by an earlier run.
    pub async fn restore(&self) -> Result<(), WatchError> {
        let Some(state) = self.store.load(self.id()).await? else {
            return Ok(());
        };
        if let Some(raw) = state.endpoint_override.as_deref() {
            match parse_endpoint(self.id(), raw) {
                Ok(url) => {
                    let mut chain = self.chain.lock().await;
                    if chain.primary_endpoint() != Some(&url) {
                        tracing::info!(target_id = self.id(), endpoint = %url, "restored endpoint override");
                        chain.set_primary_endpoint(url);
                    }
                }
                Err(e) => tracing::warn!(target_id = self.id(), error = %e, "ignoring persisted endpoint"),
            }
        }
        if let Some(secs) = state.interval_secs.filter(|s| *s > 0) {
            tracing::info!(target_id = self.id(), interval_secs = secs, "restored interval override");
            self.interval.send_replace(Duration::from_secs(secs));
        }
        Ok(())
    }

    /// Scheduled tick. `None` when a cycle for this target is already running;
    /// the tick is dropped, not queued.
    pub async fn run_scheduled(&self) -> Option<Result<CycleReport, WatchError>> {
        let Ok(mut chain) = self.chain.try_lock() else {
            tracing::debug!(target_id = self.id(), "cycle in flight, tick dropped");
            counter!("watch_ticks_dropped_total").increment(1);
            return None;
        };
        Some(self.cycle(&mut chain, Trigger::Scheduled).await)
    }

    /// Out-of-band "check now". Waits for an in-flight cycle, then runs.
    pub async fn run_manual(&self) -> Result<CycleReport, WatchError> {
        let mut chain = self.chain.lock().await;
        self.cycle(&mut chain, Trigger::Manual).await
    }

    /// Point the primary source at a new endpoint. The stored baseline is
    /// invalidated so the next read is an initial observation, never a change.
    pub async fn set_endpoint(&self, raw: &str) -> Result<Url, WatchError> {
        let url = parse_endpoint(self.id(), raw)?;
        let mut chain = self.chain.lock().await;

        let mut state = self
            .store
            .load(self.id())
            .await?
            .unwrap_or_else(|| WatchState::new(self.id()));
        state.invalidate();
        state.endpoint_override = Some(url.to_string());
        self.store.save(&state).await?;

        chain.set_primary_endpoint(url.clone());
        tracing::info!(target_id = self.id(), endpoint = %url, "endpoint changed, baseline cleared");
        Ok(url)
    }

    /// Change the period. Cached records are dropped so the next cycle reads
    /// upstream; the scheduler re-arms its timer on the next poll.
    pub async fn set_interval(&self, interval: Duration) -> Result<(), WatchError> {
        if interval.is_zero() {
            return Err(ConfigError::NonPositiveInterval {
                target: self.id().to_string(),
            }
            .into());
        }
        let mut chain = self.chain.lock().await;
        let mut state = self
            .store
            .load(self.id())
            .await?
            .unwrap_or_else(|| WatchState::new(self.id()));
        state.interval_secs = Some(interval.as_secs());
        self.store.save(&state).await?;
        chain.clear_cache();

        self.interval.send_replace(interval);
        tracing::info!(target_id = self.id(), interval_secs = interval.as_secs(), "interval changed");
        Ok(())
    }

    pub async fn status(&self) -> Result<WatchStatus, WatchError> {
        let (endpoint, sources) = {
            let chain = self.chain.lock().await;
            (
                chain
                    .primary_endpoint()
                    .map(|u| u.to_string())
                    .unwrap_or_default(),
                chain.sources().iter().map(|s| s.name.clone()).collect(),
            )
        };
        let state = self.store.load(self.id()).await?.unwrap_or_default();
        Ok(WatchStatus {
            target_id: self.id().to_string(),
            kind: self.target.kind,
            endpoint,
            sources,
            interval_secs: self.interval().as_secs(),
            tracking: state.phase() == Phase::Tracking,
            last_checked_at: state.last_checked_at,
            last_success_at: state.last_success_at,
            last_changed_at: state.last_changed_at,
            source_used: state.source_used,
            state_location: self.store.location(),
        })
    }

    async fn cycle(
        &self,
        chain: &mut SourceChain,
        trigger: Trigger,
    ) -> Result<CycleReport, WatchError> {
        let id = self.id();
        let checked_at = Utc::now();

        let previous = self.store.load(id).await.inspect_err(|e| {
            tracing::warn!(target_id = id, error_kind = "persistence", error = %e, "state unreadable, cycle abandoned");
        })?;

        let mut report = CycleReport {
            target_id: id.to_string(),
            trigger,
            classification: Classification::Exhausted,
            checked_at,
            source: None,
            record: None,
            previous: previous.as_ref().and_then(|p| p.last_record.clone()),
            delivery: None,
            exhausted: None,
        };

        let resolved = match chain.resolve(id).await {
            Ok(r) => r,
            Err(exhausted) => {
                tracing::warn!(target_id = id, ?trigger, error = %exhausted, "all sources failed");
                if let Some(mut state) = previous {
                    state.mark_checked(checked_at);
                    if let Err(e) = self.store.save(&state).await {
                        tracing::warn!(target_id = id, error = %e, "could not record failed check");
                    }
                }
                report.exhausted = Some(exhausted);
                self.finish(&report);
                return Ok(report);
            }
        };

        let detection = detect(previous.as_ref(), &resolved.record);
        report.classification = detection.into();
        report.source = Some(resolved.source.clone());
        report.record = Some(resolved.record.clone());

        let endpoint = chain
            .primary_endpoint()
            .map(|u| u.to_string())
            .unwrap_or_default();
        let mut state = previous.unwrap_or_else(|| WatchState::new(id));

        match detection {
            Detection::InitialObservation => {
                state.observe_baseline(resolved.record.clone(), &resolved.source, checked_at);
                self.store.save(&state).await?;
                tracing::info!(target_id = id, source = %resolved.source, key = %resolved.record.change_key(), "baseline recorded");
                if self.notify_on_baseline {
                    let text = message::baseline_message(id, &endpoint, &resolved, checked_at);
                    report.delivery = Some(self.deliver(&text).await);
                }
            }
            Detection::NoChange => {
                state.observe_unchanged(&resolved.source, checked_at);
                self.store.save(&state).await?;
                tracing::debug!(target_id = id, source = %resolved.source, "no change");
            }
            Detection::Changed => {
                let text = message::change_message(
                    id,
                    &endpoint,
                    report.previous.as_ref(),
                    &resolved,
                    checked_at,
                );
                let delivery = self.deliver(&text).await;
                if matches!(delivery, DeliveryStatus::Failed(_)) {
                    // Keep the old record so the change is announced again.
                    state.mark_checked(checked_at);
                    if let Err(e) = self.store.save(&state).await {
                        tracing::warn!(target_id = id, error = %e, "could not record check time");
                    }
                } else {
                    state.observe_change(resolved.record.clone(), &resolved.source, checked_at);
                    self.store.save(&state).await?;
                    tracing::info!(target_id = id, source = %resolved.source, key = %resolved.record.change_key(), "change detected");
                }
                report.delivery = Some(delivery);
            }
        }

        self.finish(&report);
        Ok(report)
    }

    async fn deliver(&self, text: &str) -> DeliveryStatus {
        match self.notifier.notify(text).await {
            Ok(d) => d.into(),
            Err(e) => {
                tracing::warn!(target_id = self.id(), error = %e, "notification dropped");
                DeliveryStatus::Failed(e.to_string())
            }
        }
    }

    fn finish(&self, report: &CycleReport) {
        counter!("watch_cycles_total", "classification" => report.classification.as_str())
            .increment(1);
        gauge!("watch_last_cycle_ts", "target" => self.id().to_string())
            .set(report.checked_at.timestamp() as f64);
    }
}
