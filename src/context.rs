// src/context.rs
//! Process-wide wiring: validated targets, shared store and notifier, the
//! scheduler, and the operator commands a command layer calls into.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use reqwest::Url;

use crate::config::{TargetPlan, WatchConfig};
use crate::error::{ConfigError, WatchError};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::notify::{message, Delivery, Notifier, TelegramSender};
use crate::scheduler::Scheduler;
use crate::state::{JsonFileStore, StateStore};
use crate::watch::{CycleReport, Watch, WatchStatus};

pub struct AppContext {
    watches: Vec<Arc<Watch>>,
    notifier: Arc<Notifier>,
    rejected: Vec<ConfigError>,
    scheduler: Option<Scheduler>,
}

impl AppContext {
    /// Production wiring from a loaded config: reqwest fetcher, JSON state
    /// file, Telegram sender when a token is configured.
    pub async fn build(config: &WatchConfig) -> anyhow::Result<Self> {
        let fetcher: Arc<dyn Fetcher> = Arc::new(
            HttpFetcher::new(config.max_body_bytes).context("building HTTP fetcher")?,
        );
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&config.state_file));

        let notify = config.notify.resolve();
        let notifier = match notify.bot_token {
            Some(token) => {
                let sender = TelegramSender::new(token)
                    .with_api_base(notify.api_base)
                    .with_timeout(config.request_timeout_secs);
                Notifier::new(Arc::new(sender), notify.chat_id)
            }
            None => {
                tracing::warn!("no bot token configured, notifications suppressed");
                Notifier::disabled()
            }
        };

        let (plans, rejected) = config.validate();
        Ok(Self::from_parts(plans, rejected, fetcher, store, Arc::new(notifier), config.notify_on_baseline).await)
    }

    /// Wiring with injected collaborators. Persisted overrides are re-applied;
    /// a target whose state cannot be read still starts with its configured values.
    pub async fn from_parts(
        plans: Vec<TargetPlan>,
        rejected: Vec<ConfigError>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn StateStore>,
        notifier: Arc<Notifier>,
        notify_on_baseline: bool,
    ) -> Self {
        for e in &rejected {
            tracing::error!(error_kind = "configuration", error = %e, "target rejected");
        }

        let mut watches = Vec::with_capacity(plans.len());
        for plan in plans {
            let chain = plan.build_chain(fetcher.clone());
            let watch = Watch::new(plan.target, chain, store.clone(), notifier.clone())
                .with_baseline_notifications(notify_on_baseline);
            if let Err(e) = watch.restore().await {
                tracing::warn!(target_id = watch.id(), error = %e, "could not restore overrides");
            }
            watches.push(Arc::new(watch));
        }

        Self {
            watches,
            notifier,
            rejected,
            scheduler: None,
        }
    }

    pub fn target_ids(&self) -> Vec<&str> {
        self.watches.iter().map(|w| w.id()).collect()
    }

    /// Targets that failed validation and were not started.
    pub fn rejected(&self) -> &[ConfigError] {
        &self.rejected
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn watch(&self, target_id: &str) -> Result<&Arc<Watch>, WatchError> {
        self.watches
            .iter()
            .find(|w| w.id() == target_id)
            .ok_or_else(|| WatchError::UnknownTarget(target_id.to_string()))
    }

    /// Spawn one timer per target. Idempotent.
    pub fn start(&mut self) {
        if self.scheduler.is_some() {
            return;
        }
        let mut scheduler = Scheduler::new();
        for w in &self.watches {
            scheduler.spawn(w.clone());
        }
        tracing::info!(targets = scheduler.len(), "scheduler running");
        self.scheduler = Some(scheduler);
    }

    /// "Check now": one synchronous cycle, single-flight with the scheduler.
    pub async fn check_now(&self, target_id: &str) -> Result<CycleReport, WatchError> {
        self.watch(target_id)?.run_manual().await
    }

    pub async fn set_endpoint(&self, target_id: &str, endpoint: &str) -> Result<Url, WatchError> {
        self.watch(target_id)?.set_endpoint(endpoint).await
    }

    pub async fn set_interval(&self, target_id: &str, interval: Duration) -> Result<(), WatchError> {
        self.watch(target_id)?.set_interval(interval).await
    }

    pub async fn status(&self, target_id: &str) -> Result<WatchStatus, WatchError> {
        self.watch(target_id)?.status().await
    }

    pub async fn statuses(&self) -> Vec<WatchStatus> {
        let mut out = Vec::with_capacity(self.watches.len());
        for w in &self.watches {
            match w.status().await {
                Ok(s) => out.push(s),
                Err(e) => tracing::warn!(target_id = w.id(), error = %e, "status unavailable"),
            }
        }
        out
    }

    /// Send one target's status to the chat. Delivery failure is logged and
    /// reported as `None`; an unknown target or unreadable state is an error.
    pub async fn report_status(&self, target_id: &str) -> Result<Option<Delivery>, WatchError> {
        let status = self.status(target_id).await?;
        match self.notifier.notify(&message::status_message(&status)).await {
            Ok(d) => Ok(Some(d)),
            Err(e) => {
                tracing::warn!(target_id, error = %e, "status message not delivered");
                Ok(None)
            }
        }
    }

    /// One "watch started" message. Failure is logged, never fatal.
    pub async fn announce_startup(&self) -> Option<Delivery> {
        let text = message::startup_message(&self.statuses().await);
        match self.notifier.notify(&text).await {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(error = %e, "startup message not delivered");
                None
            }
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(s) = self.scheduler.take() {
            s.shutdown().await;
        }
        tracing::info!("watchers stopped");
    }
}
