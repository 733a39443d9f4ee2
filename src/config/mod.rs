mod file_config;

pub use file_config::{
    BridgeConfig, CircuitBreakerFileConfig, DedupConfig, DiscogsConfig, EnrichmentConfig,
    FileConfig, LastFmConfig, LlmConfig, MatchingConfig, RetryConfig, ScrobbleConfig,
    SessionsConfig,
};

use crate::analytics::DEFAULT_SESSION_GAP;
use crate::enrichment::{EnrichmentSettings, DEFAULT_DESCRIPTION_MAX_TOKENS};
use crate::listening::{ArtistMatcher, DEFAULT_DEDUP_WINDOW_SECS, DEFAULT_SIMILARITY_THRESHOLD};
use crate::poller::{ActiveHours, DedupLookupPolicy};
use crate::resilience::{CircuitBreakerConfig, RetryPolicy};
use crate::sources::DEFAULT_RECONNECT_WAIT;
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BRIDGE_INTERVAL_SECS: u64 = 120;
pub const DEFAULT_SCROBBLE_INTERVAL_SECS: u64 = 180;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub metrics_port: u16,
    pub bridge_url: Option<String>,
    pub scrobble_user: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub metrics_port: u16,

    // Pipeline
    pub dedup: DedupSettings,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub matcher: ArtistMatcher,
    pub session_gap: Duration,
    pub enrichment: EnrichmentSettings,
    /// Applied to every provider and source request.
    pub request_timeout: Duration,

    // Sources, at least one of them is set
    pub bridge: Option<BridgeSettings>,
    pub scrobble: Option<ScrobbleSettings>,

    // Providers, each optional
    pub discogs: Option<DiscogsSettings>,
    pub lastfm: Option<LastFmSettings>,
    pub llm: Option<LlmSettings>,
}

#[derive(Debug, Clone)]
pub struct DedupSettings {
    pub window: Duration,
    pub lookup_policy: DedupLookupPolicy,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_DEDUP_WINDOW_SECS),
            lookup_policy: DedupLookupPolicy::FailOpen,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub base_url: String,
    pub zone: Option<String>,
    pub interval: Duration,
    pub active_hours: Option<ActiveHours>,
    pub reconnect_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct ScrobbleSettings {
    pub api_key: String,
    pub username: String,
    pub interval: Duration,
    pub active_hours: Option<ActiveHours>,
}

#[derive(Debug, Clone)]
pub struct DiscogsSettings {
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct LastFmSettings {
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;
        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let dedup = resolve_dedup(file.dedup.unwrap_or_default())?;
        let retry = resolve_retry(file.retry.unwrap_or_default())?;

        let cb_file = file.circuit_breaker.unwrap_or_default();
        let cb_defaults = CircuitBreakerConfig::default();
        let failure_threshold = cb_file
            .failure_threshold
            .unwrap_or(cb_defaults.failure_threshold);
        let success_threshold = cb_file
            .success_threshold
            .unwrap_or(cb_defaults.success_threshold);
        if failure_threshold == 0 || success_threshold == 0 {
            bail!("circuit_breaker thresholds must be at least 1");
        }
        let circuit_breaker = CircuitBreakerConfig::new(
            failure_threshold,
            cb_file
                .recovery_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(cb_defaults.recovery_timeout),
            success_threshold,
        );

        let matcher = resolve_matcher(file.matching.unwrap_or_default())?;

        let session_gap = file
            .sessions
            .and_then(|s| s.gap_threshold_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SESSION_GAP);
        if session_gap.is_zero() {
            bail!("sessions.gap_threshold_secs must be positive");
        }

        let enrichment_file = file.enrichment.unwrap_or_default();
        let enrichment = EnrichmentSettings {
            description_max_tokens: enrichment_file
                .description_max_tokens
                .unwrap_or(DEFAULT_DESCRIPTION_MAX_TOKENS),
        };
        let request_timeout = Duration::from_secs(
            enrichment_file
                .request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        if request_timeout.is_zero() {
            bail!("enrichment.request_timeout_secs must be positive");
        }

        // Providers first: the scrobble source borrows the Last.fm key
        let discogs = file
            .discogs
            .and_then(|d| non_blank(d.token))
            .map(|token| DiscogsSettings { token });
        let lastfm = file
            .lastfm
            .and_then(|l| non_blank(l.api_key))
            .map(|api_key| LastFmSettings { api_key });
        let llm = file.llm.map(|l| LlmSettings {
            base_url: non_blank(l.base_url).unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            model: non_blank(l.model).unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            api_key: non_blank(l.api_key),
        });

        let bridge = resolve_bridge(file.bridge, cli.bridge_url.clone())?;
        let scrobble = resolve_scrobble(
            file.scrobble,
            cli.scrobble_user.clone(),
            lastfm.as_ref().map(|l| l.api_key.clone()),
        )?;
        if bridge.is_none() && scrobble.is_none() {
            bail!("At least one source must be configured: [bridge] or [scrobble]");
        }

        Ok(Self {
            db_dir,
            metrics_port,
            dedup,
            retry,
            circuit_breaker,
            matcher,
            session_gap,
            enrichment,
            request_timeout,
            bridge,
            scrobble,
            discogs,
            lastfm,
            llm,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_active_hours(value: Option<String>, section: &str) -> Result<Option<ActiveHours>> {
    non_blank(value)
        .map(|v| {
            v.parse::<ActiveHours>()
                .with_context(|| format!("Invalid {}.active_hours", section))
        })
        .transpose()
}

fn positive_interval(secs: u64, section: &str) -> Result<Duration> {
    if secs == 0 {
        bail!("{}.interval_secs must be positive", section);
    }
    Ok(Duration::from_secs(secs))
}

fn resolve_dedup(file: DedupConfig) -> Result<DedupSettings> {
    let window = Duration::from_secs(file.window_secs.unwrap_or(DEFAULT_DEDUP_WINDOW_SECS));
    if window.is_zero() {
        bail!("dedup.window_secs must be positive");
    }
    let lookup_policy = file.lookup_failure_policy.unwrap_or_default();
    Ok(DedupSettings {
        window,
        lookup_policy,
    })
}

fn resolve_retry(file: RetryConfig) -> Result<RetryPolicy> {
    let defaults = RetryPolicy::default();
    let policy = RetryPolicy {
        max_attempts: file.max_attempts.unwrap_or(defaults.max_attempts),
        initial_delay: file
            .initial_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_delay),
        max_delay: file
            .max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_delay),
        backoff_base: file.backoff_base.unwrap_or(defaults.backoff_base),
        jitter: file.jitter.unwrap_or(defaults.jitter),
    };
    if policy.max_attempts == 0 {
        bail!("retry.max_attempts must be at least 1");
    }
    if !policy.backoff_base.is_finite() || policy.backoff_base < 1.0 {
        bail!("retry.backoff_base must be at least 1.0");
    }
    if policy.initial_delay > policy.max_delay {
        bail!("retry.initial_delay_ms must not exceed retry.max_delay_ms");
    }
    Ok(policy)
}

fn resolve_matcher(file: MatchingConfig) -> Result<ArtistMatcher> {
    match file.strategy.as_deref() {
        None | Some("exact") => Ok(ArtistMatcher::Exact),
        Some("similarity") => {
            let threshold = file
                .similarity_threshold
                .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
            if !(threshold > 0.0 && threshold <= 1.0) {
                bail!("matching.similarity_threshold must be in (0, 1], got {}", threshold);
            }
            Ok(ArtistMatcher::Similarity { threshold })
        }
        Some(other) => bail!(
            "Unknown matching.strategy {:?}, expected \"exact\" or \"similarity\"",
            other
        ),
    }
}

fn resolve_bridge(
    file: Option<BridgeConfig>,
    cli_url: Option<String>,
) -> Result<Option<BridgeSettings>> {
    let file = file.unwrap_or_default();
    let Some(base_url) = non_blank(file.base_url).or_else(|| non_blank(cli_url)) else {
        return Ok(None);
    };
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        bail!("bridge.base_url must be an http(s) URL, got {:?}", base_url);
    }
    Ok(Some(BridgeSettings {
        base_url,
        zone: non_blank(file.zone),
        interval: positive_interval(
            file.interval_secs.unwrap_or(DEFAULT_BRIDGE_INTERVAL_SECS),
            "bridge",
        )?,
        active_hours: parse_active_hours(file.active_hours, "bridge")?,
        reconnect_wait: file
            .reconnect_wait_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RECONNECT_WAIT),
    }))
}

fn resolve_scrobble(
    file: Option<ScrobbleConfig>,
    cli_user: Option<String>,
    lastfm_key: Option<String>,
) -> Result<Option<ScrobbleSettings>> {
    let section_present = file.is_some();
    let file = file.unwrap_or_default();
    let Some(username) = non_blank(file.username).or_else(|| non_blank(cli_user)) else {
        if section_present {
            bail!("scrobble.username is required when [scrobble] is present");
        }
        return Ok(None);
    };
    let api_key = non_blank(file.api_key)
        .or(lastfm_key)
        .context("The scrobble source needs scrobble.api_key or lastfm.api_key")?;
    Ok(Some(ScrobbleSettings {
        api_key,
        username,
        interval: positive_interval(
            file.interval_secs.unwrap_or(DEFAULT_SCROBBLE_INTERVAL_SECS),
            "scrobble",
        )?,
        active_hours: parse_active_hours(file.active_hours, "scrobble")?,
    }))
}
