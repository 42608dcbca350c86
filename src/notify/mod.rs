// src/notify/mod.rs
//! Delivery of formatted messages to the single configured recipient.
//!
//! - No recipient (or no sender) → `Suppressed`, nothing is sent.
//! - Transport failure → one immediate retry, then `NotifyError`. The caller
//!   decides what to do with the state; nothing here retries in the background.

pub mod message;
pub mod telegram;

use std::sync::Arc;

use anyhow::Result;
use metrics::counter;

use crate::error::NotifyError;

pub use telegram::TelegramSender;

const MAX_ATTEMPTS: u8 = 2;

/// Outbound capability the core calls. One call, one message.
#[async_trait::async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Delivered,
    /// No recipient configured; explicit no-op.
    Suppressed,
}

#[derive(Clone)]
pub struct Notifier {
    sender: Option<Arc<dyn MessageSender>>,
    recipient: Option<String>,
}

impl Notifier {
    pub fn new(sender: Arc<dyn MessageSender>, recipient: Option<String>) -> Self {
        let recipient = recipient.filter(|r| !r.trim().is_empty());
        Self {
            sender: Some(sender),
            recipient,
        }
    }

    /// Notifier that suppresses everything (no bot token configured).
    pub fn disabled() -> Self {
        Self {
            sender: None,
            recipient: None,
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some() && self.recipient.is_some()
    }

    pub async fn notify(&self, text: &str) -> Result<Delivery, NotifyError> {
        let (Some(sender), Some(recipient)) = (&self.sender, &self.recipient) else {
            tracing::info!(text, "no recipient configured, notification suppressed");
            counter!("watch_notifications_total", "result" => "suppressed").increment(1);
            return Ok(Delivery::Suppressed);
        };

        let mut last_err = None;
        for attempt in 1..=MAX_ATTEMPTS {
            match sender.send(recipient, text).await {
                Ok(()) => {
                    counter!("watch_notifications_total", "result" => "delivered").increment(1);
                    return Ok(Delivery::Delivered);
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %format!("{e:#}"), "notification send failed");
                    last_err = Some(e);
                }
            }
        }

        counter!("watch_notifications_total", "result" => "failed").increment(1);
        Err(NotifyError::Delivery {
            attempts: MAX_ATTEMPTS,
            message: last_err.map(|e| format!("{e:#}")).unwrap_or_default(),
        })
    }
}
