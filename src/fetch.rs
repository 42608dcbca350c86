// src/fetch.rs
//! Bounded-time HTTP GET. No retries here; fallback and re-attempts belong
//! to the source chain and the scheduler.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, redirect, Client, Url};

use crate::error::FetchError;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
/// Bodies above this are truncated, not rejected.
pub const DEFAULT_MAX_BODY_BYTES: usize = 2_000_000;
const MAX_REDIRECTS: usize = 5;
const USER_AGENT: &str = concat!("SaylorWatch/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8";

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, endpoint: &Url, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(max_body_bytes: usize) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| FetchError::Network(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            max_body_bytes,
        })
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }
}

fn map_reqwest(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, endpoint: &Url, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let mut resp = self
            .client
            .get(endpoint.clone())
            .header(header::ACCEPT, ACCEPT)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        // Stream the body so a hostile page cannot make us buffer it whole.
        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await.map_err(map_reqwest)? {
            let room = self.max_body_bytes.saturating_sub(body.len());
            if chunk.len() > room {
                body.extend_from_slice(&chunk[..room]);
                tracing::debug!(
                    endpoint = %endpoint,
                    cap = self.max_body_bytes,
                    "body truncated at cap"
                );
                break;
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
