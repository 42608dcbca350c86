// src/scheduler.rs
//! One timer task per target.
//!
//! Each task owns a `tokio::time::interval` with `MissedTickBehavior::Skip`
//! and runs its cycle inline, so a slow cycle swallows the ticks that fall
//! inside it instead of queueing them. A tick that finds a manual cycle
//! holding the target lock is dropped by `Watch::run_scheduled`.
//! Interval changes arrive over a `watch` channel and re-arm the timer one
//! full period from the moment of the change.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};

use crate::watch::Watch;

pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn arm(first_tick: Option<Instant>, period: Duration) -> Interval {
    let mut ticker = match first_tick {
        Some(at) => interval_at(at, period),
        None => interval(period),
    };
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Start ticking `watch`. The first cycle runs immediately.
    pub fn spawn(&mut self, watch: Arc<Watch>) {
        let shutdown = self.shutdown.subscribe();
        self.tasks.push(tokio::spawn(run_target(watch, shutdown)));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stop every timer. A cycle in progress is cancelled at its next await
    /// point; state writes are atomic so nothing is left half-applied.
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "watch task ended abnormally");
            }
        }
    }
}

async fn run_target(watch: Arc<Watch>, mut shutdown: watch::Receiver<bool>) {
    let mut period_rx = watch.subscribe_interval();
    let mut ticker = arm(None, *period_rx.borrow_and_update());
    tracing::info!(target_id = watch.id(), interval_secs = watch.interval().as_secs(), "scheduler started");

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                tokio::select! {
                    outcome = watch.run_scheduled() => match outcome {
                        None => {}
                        Some(Ok(report)) => tracing::info!(
                            target_id = watch.id(),
                            classification = %report.classification,
                            source = report.source.as_deref().unwrap_or("-"),
                            "cycle finished"
                        ),
                        Some(Err(e)) => tracing::warn!(
                            target_id = watch.id(),
                            error_kind = %e.kind(),
                            error = %e,
                            "cycle abandoned, retrying next tick"
                        ),
                    },
                    _ = shutdown.changed() => break,
                }
            }
            changed = period_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = *period_rx.borrow_and_update();
                ticker = arm(Some(Instant::now() + period), period);
                tracing::info!(target_id = watch.id(), interval_secs = period.as_secs(), "timer re-armed");
            }
            _ = shutdown.changed() => break,
        }
    }
    tracing::info!(target_id = watch.id(), "scheduler stopped");
}
