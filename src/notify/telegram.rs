use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::MessageSender;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Telegram Bot API `sendMessage`, HTML parse mode, link previews off.
#[derive(Clone)]
pub struct TelegramSender {
    token: String,
    api_base: String,
    client: Client,
    timeout: Duration,
}

impl TelegramSender {
    pub fn new(token: String) -> Self {
        Self {
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }
}

impl std::fmt::Debug for TelegramSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the token.
        f.debug_struct("TelegramSender")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct ApiReply {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait::async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, recipient: &str, text: &str) -> Result<()> {
        let body = SendMessage {
            chat_id: recipient,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let rsp = self
            .client
            .post(self.method_url("sendMessage"))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            // reqwest includes the URL (and thus the token) in its errors.
            .map_err(|e| anyhow!("telegram request failed: {}", e.without_url()))?;

        let status = rsp.status();
        let reply: ApiReply = rsp
            .json()
            .await
            .with_context(|| format!("telegram reply not JSON (HTTP {status})"))?;
        if !status.is_success() || !reply.ok {
            return Err(anyhow!(
                "telegram API error (HTTP {status}): {}",
                reply.description.unwrap_or_else(|| "no description".into())
            ));
        }
        Ok(())
    }
}
