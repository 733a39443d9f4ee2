use crate::poller::DedupLookupPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub metrics_port: Option<u16>,

    // Pipeline tuning
    pub dedup: Option<DedupConfig>,
    pub retry: Option<RetryConfig>,
    pub circuit_breaker: Option<CircuitBreakerFileConfig>,
    pub matching: Option<MatchingConfig>,
    pub sessions: Option<SessionsConfig>,
    pub enrichment: Option<EnrichmentConfig>,

    // Sources
    pub bridge: Option<BridgeConfig>,
    pub scrobble: Option<ScrobbleConfig>,

    // Providers
    pub discogs: Option<DiscogsConfig>,
    pub lastfm: Option<LastFmConfig>,
    pub llm: Option<LlmConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DedupConfig {
    pub window_secs: Option<u64>,
    pub lookup_failure_policy: Option<DedupLookupPolicy>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_base: Option<f64>,
    pub jitter: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CircuitBreakerFileConfig {
    pub failure_threshold: Option<u32>,
    pub recovery_timeout_secs: Option<u64>,
    pub success_threshold: Option<u32>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct MatchingConfig {
    /// "exact" or "similarity"
    pub strategy: Option<String>,
    pub similarity_threshold: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SessionsConfig {
    pub gap_threshold_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub description_max_tokens: Option<u32>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BridgeConfig {
    pub base_url: Option<String>,
    pub zone: Option<String>,
    pub interval_secs: Option<u64>,
    /// "HH-HH", may wrap midnight
    pub active_hours: Option<String>,
    pub reconnect_wait_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ScrobbleConfig {
    /// Falls back to `[lastfm] api_key`.
    pub api_key: Option<String>,
    pub username: Option<String>,
    pub interval_secs: Option<u64>,
    pub active_hours: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DiscogsConfig {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LastFmConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
