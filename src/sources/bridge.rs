//! Local playback-device bridge.
//!
//! The bridge is a small HTTP service sitting next to the playback system.
//! It reports the current track per zone, with accurate durations, and its
//! own connection state towards the playback backend.

use super::{HealthProbe, RecoveryPlan, Source, SourceError};
use crate::listening::RawSample;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const BRIDGE_SOURCE_ID: &str = "bridge";

pub struct BridgeSource {
    client: reqwest::Client,
    base_url: String,
    zone: Option<String>,
    reconnect_wait: Duration,
}

#[derive(Debug, Deserialize)]
struct NowPlayingResponse {
    #[serde(default)]
    state: String,
    zone: Option<String>,
    artist: Option<String>,
    title: Option<String>,
    album: Option<String>,
    duration_secs: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    connected: bool,
    #[serde(default)]
    zones: Vec<ZoneStatus>,
}

#[derive(Debug, Deserialize)]
struct ZoneStatus {
    name: String,
    #[serde(default)]
    active: bool,
}

impl NowPlayingResponse {
    fn into_sample(self) -> Option<RawSample> {
        if self.state != "playing" {
            return None;
        }
        let sample = RawSample::new(
            BRIDGE_SOURCE_ID,
            self.artist.unwrap_or_default(),
            self.title.unwrap_or_default(),
            self.album.unwrap_or_default(),
        );
        let sample = match self.zone {
            Some(zone) => sample.with_zone(zone),
            None => sample,
        };
        let sample = match self.duration_secs {
            Some(duration) => sample.with_duration(duration),
            None => sample,
        };
        Some(sample)
    }
}

impl BridgeSource {
    pub fn new(
        base_url: &str,
        zone: Option<String>,
        timeout: Duration,
        reconnect_wait: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            zone,
            reconnect_wait,
        })
    }

    fn unavailable(&self, reason: impl Into<String>) -> SourceError {
        SourceError::unavailable(BRIDGE_SOURCE_ID, reason)
    }
}

#[async_trait]
impl Source for BridgeSource {
    fn id(&self) -> &str {
        BRIDGE_SOURCE_ID
    }

    async fn fetch_now_playing(&self) -> Result<Option<RawSample>, SourceError> {
        let url = format!("{}/now_playing", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(zone) = &self.zone {
            request = request.query(&[("zone", zone.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;
        if response.status() == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.unavailable(format!("now_playing returned {}", response.status())));
        }

        let body: NowPlayingResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(format!("invalid now_playing response: {}", e)))?;
        Ok(body.into_sample())
    }

    async fn probe_health(&self) -> HealthProbe {
        let url = format!("{}/health", self.base_url);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!("Bridge health check failed: {}", e);
                return HealthProbe::unreachable();
            }
        };
        if !response.status().is_success() {
            debug!("Bridge health check returned {}", response.status());
            return HealthProbe {
                reachable: true,
                ..HealthProbe::default()
            };
        }
        match response.json::<HealthResponse>().await {
            Ok(health) => health_probe(&health, self.zone.as_deref()),
            Err(e) => {
                debug!("Bridge health response unreadable: {}", e);
                HealthProbe {
                    reachable: true,
                    ..HealthProbe::default()
                }
            }
        }
    }

    fn recovery_plan(&self) -> RecoveryPlan {
        RecoveryPlan::Staged
    }

    fn reconnect_wait(&self) -> Duration {
        self.reconnect_wait
    }
}

/// A zone filter narrows "active" down to that zone.
fn health_probe(health: &HealthResponse, zone: Option<&str>) -> HealthProbe {
    let zones_active = health
        .zones
        .iter()
        .filter(|z| zone.map_or(true, |wanted| z.name == wanted))
        .any(|z| z.active);
    HealthProbe {
        reachable: true,
        connected: health.connected,
        zones_active: health.connected && zones_active,
    }
}
