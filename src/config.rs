// src/config.rs
//! Watch configuration.
//!
//! Lookup order (first hit wins):
//! 1) `$WATCH_CONFIG_PATH` (must exist)
//! 2) `config/watch.toml`
//! 3) `config/watch.json`
//! 4) legacy single-target env vars (`CHECK_URL`, `STATE_FILE`,
//!    `REQUEST_TIMEOUT`, `CHECK_INTERVAL_MIN`)
//!
//! Example:
//! ```toml
//! state_file = "state/watch_state.json"
//! [notify]
//! bot_token = "ENV"
//! chat_id = "123456"
//!
//! [[targets]]
//! id = "purchases"
//! interval_secs = 900
//! kind = "structured"
//!
//! [[targets.sources]]
//! name = "primary"
//! priority = 1
//! endpoint = "https://example.com/purchases"
//! extractor = { type = "html_table", anchor = "Date" }
//! ```

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ConfigError;
use crate::extract::{
    Extractor, FingerprintExtractor, HtmlTableExtractor, JsonFields, JsonRecordExtractor,
    Normalization, RecordKind, RecordPick, TableColumns,
};
use crate::fetch::{Fetcher, DEFAULT_MAX_BODY_BYTES};
use crate::notify::telegram::DEFAULT_API_BASE;
use crate::source_chain::{SourceChain, SourceDescriptor};
use crate::watch::{parse_endpoint, WatchTarget};

pub const ENV_PATH: &str = "WATCH_CONFIG_PATH";
/// Target id used by the legacy env configuration.
pub const LEGACY_TARGET_ID: &str = "page";

fn default_state_file() -> PathBuf {
    PathBuf::from("state/watch_state.json")
}
fn default_request_timeout() -> u64 {
    15
}
fn default_max_body() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_body")]
    pub max_body_bytes: usize,
    /// Also announce the first observation of each target.
    #[serde(default)]
    pub notify_on_baseline: bool,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    /// Absent or "ENV" means: read BOT_TOKEN / TELEGRAM_TOKEN
    #[serde(default)]
    pub bot_token: Option<String>,
    /// Absent means: read X_CHAT_ID / TELEGRAM_CHAT_ID
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub id: String,
    /// Signed so a negative value is reported instead of failing the parse.
    pub interval_secs: i64,
    pub kind: RecordKind,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub priority: i64,
    pub endpoint: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
    pub extractor: ExtractorConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExtractorConfig {
    Fingerprint {
        #[serde(default)]
        normalization: Normalization,
    },
    HtmlTable {
        anchor: String,
        #[serde(default)]
        columns: TableColumns,
        #[serde(default)]
        row: usize,
    },
    Json {
        /// JSON pointer to the record array; empty = document root.
        #[serde(default)]
        records: String,
        #[serde(default)]
        pick: RecordPick,
        #[serde(default)]
        fields: JsonFields,
    },
}

impl ExtractorConfig {
    fn kind(&self) -> RecordKind {
        match self {
            ExtractorConfig::Fingerprint { .. } => RecordKind::Fingerprint,
            ExtractorConfig::HtmlTable { .. } | ExtractorConfig::Json { .. } => {
                RecordKind::Structured
            }
        }
    }

    fn build(&self, target: &str) -> Result<Arc<dyn Extractor>, ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidExtractor {
            target: target.to_string(),
            reason: reason.to_string(),
        };
        let extractor: Arc<dyn Extractor> = match self {
            ExtractorConfig::Fingerprint { normalization } => {
                Arc::new(FingerprintExtractor::new(*normalization))
            }
            ExtractorConfig::HtmlTable {
                anchor,
                columns,
                row,
            } => {
                if anchor.trim().is_empty() {
                    return Err(invalid("html_table anchor must not be empty"));
                }
                Arc::new(HtmlTableExtractor::new(anchor.trim(), *columns).with_row(*row))
            }
            ExtractorConfig::Json {
                records,
                pick,
                fields,
            } => {
                if !records.is_empty() && !records.starts_with('/') {
                    return Err(invalid("json records pointer must be empty or start with '/'"));
                }
                Arc::new(JsonRecordExtractor::new(records.clone(), *pick, fields.clone()))
            }
        };
        Ok(extractor)
    }
}

/// A source that passed validation; the fetcher is attached when the chain is built.
#[derive(Clone)]
pub struct SourcePlan {
    pub name: String,
    pub priority: i64,
    pub endpoint: reqwest::Url,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub extractor: Arc<dyn Extractor>,
}

/// A target that passed validation.
#[derive(Clone)]
pub struct TargetPlan {
    pub target: WatchTarget,
    pub sources: Vec<SourcePlan>,
}

impl TargetPlan {
    pub fn build_chain(&self, fetcher: Arc<dyn Fetcher>) -> SourceChain {
        SourceChain::new(
            self.sources
                .iter()
                .map(|s| SourceDescriptor {
                    name: s.name.clone(),
                    priority: s.priority,
                    endpoint: s.endpoint.clone(),
                    timeout: s.timeout,
                    cache_ttl: s.cache_ttl,
                    fetcher: fetcher.clone(),
                    extractor: s.extractor.clone(),
                })
                .collect(),
        )
    }
}

/// Telegram settings after env resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNotify {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

fn first_env(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| std::env::var(k).ok())
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

impl NotifyConfig {
    pub fn resolve(&self) -> ResolvedNotify {
        let bot_token = match self.bot_token.as_deref().map(str::trim) {
            None => first_env(&["BOT_TOKEN", "TELEGRAM_TOKEN"]),
            Some(t) if t.eq_ignore_ascii_case("env") => first_env(&["BOT_TOKEN", "TELEGRAM_TOKEN"]),
            Some("") => None,
            Some(t) => Some(t.to_string()),
        };
        let chat_id = self
            .chat_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .or_else(|| first_env(&["X_CHAT_ID", "TELEGRAM_CHAT_ID"]));
        ResolvedNotify {
            bot_token,
            chat_id,
            api_base: self
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        }
    }
}

impl WatchConfig {
    /// Split targets into runnable plans and per-target errors. One bad
    /// target never prevents the others from starting.
    pub fn validate(&self) -> (Vec<TargetPlan>, Vec<ConfigError>) {
        let mut plans = Vec::new();
        let mut errors = Vec::new();
        let mut seen = HashSet::new();

        for t in &self.targets {
            if !seen.insert(t.id.as_str()) {
                errors.push(ConfigError::DuplicateTarget(t.id.clone()));
                continue;
            }
            match self.plan_target(t) {
                Ok(p) => plans.push(p),
                Err(e) => errors.push(e),
            }
        }
        (plans, errors)
    }

    fn plan_target(&self, t: &TargetConfig) -> Result<TargetPlan, ConfigError> {
        let target = t.id.clone();
        if t.interval_secs <= 0 {
            return Err(ConfigError::NonPositiveInterval { target });
        }
        if t.sources.is_empty() {
            return Err(ConfigError::NoSources { target });
        }

        let mut priorities = HashSet::new();
        let mut names = HashSet::new();
        let mut sources = Vec::with_capacity(t.sources.len());
        for s in &t.sources {
            if !priorities.insert(s.priority) {
                return Err(ConfigError::DuplicatePriority {
                    target,
                    priority: s.priority,
                });
            }
            if !names.insert(s.name.as_str()) {
                return Err(ConfigError::DuplicateSourceName {
                    target,
                    source_name: s.name.clone(),
                });
            }
            if s.extractor.kind() != t.kind {
                return Err(ConfigError::ExtractorMismatch {
                    target,
                    source_name: s.name.clone(),
                    expected: t.kind.as_str(),
                    found: s.extractor.kind().as_str(),
                });
            }
            let timeout_secs = s
                .timeout_secs
                .filter(|v| *v > 0)
                .unwrap_or(self.request_timeout_secs);
            sources.push(SourcePlan {
                name: s.name.clone(),
                priority: s.priority,
                endpoint: parse_endpoint(&target, &s.endpoint)?,
                timeout: Duration::from_secs(timeout_secs),
                cache_ttl: Duration::from_secs(s.cache_ttl_secs.unwrap_or(0)),
                extractor: s.extractor.build(&target)?,
            });
        }

        Ok(TargetPlan {
            target: WatchTarget {
                id: target,
                kind: t.kind,
                interval: Duration::from_secs(t.interval_secs.unsigned_abs()),
            },
            sources,
        })
    }
}

/// Load from an explicit path. `.json` is parsed as JSON, anything else as TOML.
pub fn load_from(path: &Path) -> Result<WatchConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading watch config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if ext == "json" {
        serde_json::from_str(&content)
            .with_context(|| format!("parsing JSON config {}", path.display()))
    } else {
        toml::from_str(&content).with_context(|| format!("parsing TOML config {}", path.display()))
    }
}

pub fn load_default() -> Result<WatchConfig> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path {}", pb.display()));
        }
    }
    let toml_p = PathBuf::from("config/watch.toml");
    if toml_p.exists() {
        return load_from(&toml_p);
    }
    let json_p = PathBuf::from("config/watch.json");
    if json_p.exists() {
        return load_from(&json_p);
    }
    from_env()
}

fn env_number(key: &str, default: i64) -> Result<i64> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .with_context(|| format!("{key} must be an integer, got {v:?}")),
        _ => Ok(default),
    }
}

/// Single fingerprint target `page` from the legacy env variables.
/// An empty `CHECK_URL` still yields the target so validation reports it.
pub fn from_env() -> Result<WatchConfig> {
    let endpoint = std::env::var("CHECK_URL").unwrap_or_default().trim().to_string();
    let state_file = std::env::var("STATE_FILE")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(default_state_file);
    let timeout = env_number("REQUEST_TIMEOUT", default_request_timeout() as i64)?;
    let minutes = env_number("CHECK_INTERVAL_MIN", 15)?;

    Ok(WatchConfig {
        state_file,
        request_timeout_secs: timeout.max(1) as u64,
        max_body_bytes: default_max_body(),
        notify_on_baseline: false,
        notify: NotifyConfig::default(),
        targets: vec![TargetConfig {
            id: LEGACY_TARGET_ID.to_string(),
            interval_secs: minutes.saturating_mul(60),
            kind: RecordKind::Fingerprint,
            sources: vec![SourceConfig {
                name: "page".to_string(),
                priority: 1,
                endpoint,
                timeout_secs: None,
                cache_ttl_secs: None,
                extractor: ExtractorConfig::Fingerprint {
                    normalization: Normalization::Raw,
                },
            }],
        }],
    })
}
