// src/source_chain.rs
//! Ordered fallback across independent providers of the same fact.
//!
//! Sources are tried in ascending priority. The first one that both fetches
//! and extracts wins; nothing is merged across sources. A per-source cache,
//! keyed by priority, skips the network while a previous record is younger
//! than `cache_ttl`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use reqwest::Url;
use tokio::time::Instant;

use crate::error::{Exhausted, SourceAttempt, SourceError};
use crate::extract::{ExtractedRecord, Extractor};
use crate::fetch::Fetcher;

pub struct SourceDescriptor {
    pub name: String,
    /// Unique per chain; lower is tried first.
    pub priority: i64,
    pub endpoint: Url,
    pub timeout: Duration,
    /// Zero disables caching.
    pub cache_ttl: Duration,
    pub fetcher: Arc<dyn Fetcher>,
    pub extractor: Arc<dyn Extractor>,
}

impl std::fmt::Debug for SourceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .field("cache_ttl", &self.cache_ttl)
            .field("kind", &self.extractor.kind())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub record: ExtractedRecord,
    pub source: String,
    pub from_cache: bool,
}

#[derive(Debug, Clone)]
struct CachedRecord {
    record: ExtractedRecord,
    stored_at: Instant,
}

#[derive(Debug)]
pub struct SourceChain {
    sources: Vec<SourceDescriptor>,
    cache: HashMap<i64, CachedRecord>,
}

impl SourceChain {
    pub fn new(mut sources: Vec<SourceDescriptor>) -> Self {
        sources.sort_by_key(|s| s.priority);
        Self {
            sources,
            cache: HashMap::new(),
        }
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.sources
    }

    /// Endpoint of the highest-priority source; the target's "endpoint".
    pub fn primary_endpoint(&self) -> Option<&Url> {
        self.sources.first().map(|s| &s.endpoint)
    }

    /// Repoint the primary source. Cached records are dropped so the next
    /// resolve reads the new endpoint.
    pub fn set_primary_endpoint(&mut self, endpoint: Url) {
        if let Some(first) = self.sources.first_mut() {
            first.endpoint = endpoint;
        }
        self.clear_cache();
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    fn cached(&self, source: &SourceDescriptor) -> Option<ExtractedRecord> {
        if source.cache_ttl.is_zero() {
            return None;
        }
        self.cache
            .get(&source.priority)
            .filter(|c| c.stored_at.elapsed() < source.cache_ttl)
            .map(|c| c.record.clone())
    }

    async fn attempt(source: &SourceDescriptor) -> Result<ExtractedRecord, SourceError> {
        let body = source.fetcher.fetch(&source.endpoint, source.timeout).await?;
        Ok(source.extractor.extract(&body)?)
    }

    pub async fn resolve(&mut self, target_id: &str) -> Result<Resolved, Exhausted> {
        let mut attempts = Vec::new();

        for source in &self.sources {
            if let Some(record) = self.cached(source) {
                tracing::debug!(target_id, source = %source.name, "served from cache");
                return Ok(Resolved {
                    record,
                    source: source.name.clone(),
                    from_cache: true,
                });
            }

            match Self::attempt(source).await {
                Ok(record) => {
                    if !source.cache_ttl.is_zero() {
                        self.cache.insert(
                            source.priority,
                            CachedRecord {
                                record: record.clone(),
                                stored_at: Instant::now(),
                            },
                        );
                    }
                    return Ok(Resolved {
                        record,
                        source: source.name.clone(),
                        from_cache: false,
                    });
                }
                Err(error) => {
                    tracing::warn!(
                        target_id,
                        source = %source.name,
                        endpoint = %source.endpoint,
                        error_kind = %error.kind(),
                        error = %error,
                        "source failed, falling back"
                    );
                    counter!(
                        "watch_source_errors_total",
                        "source" => source.name.clone(),
                        "kind" => error.kind().as_str()
                    )
                    .increment(1);
                    attempts.push(SourceAttempt {
                        source: source.name.clone(),
                        error,
                    });
                }
            }
        }

        Err(Exhausted { attempts })
    }
}
