//! Remote scrobbling account, read through Last.fm's recent tracks.

use super::{HealthProbe, Source, SourceError};
use crate::listening::RawSample;
use crate::providers::LastFmClient;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

pub const SCROBBLE_SOURCE_ID: &str = "scrobble";

pub struct ScrobbleSource {
    client: LastFmClient,
    username: String,
}

#[derive(Deserialize)]
struct RecentTracksResponse {
    recenttracks: RecentTracks,
}

#[derive(Deserialize)]
struct RecentTracks {
    #[serde(default)]
    track: OneOrMany<RecentTrack>,
}

/// Last.fm collapses single-element lists into a bare object.
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Deserialize)]
struct RecentTrack {
    name: String,
    artist: TextField,
    #[serde(default)]
    album: TextField,
    #[serde(rename = "@attr")]
    attr: Option<TrackAttr>,
}

#[derive(Deserialize, Default)]
struct TextField {
    #[serde(rename = "#text", default)]
    text: String,
}

#[derive(Deserialize)]
struct TrackAttr {
    #[serde(default)]
    nowplaying: String,
}

impl RecentTrack {
    fn is_now_playing(&self) -> bool {
        self.attr.as_ref().is_some_and(|a| a.nowplaying == "true")
    }
}

fn now_playing(response: RecentTracksResponse) -> Option<RawSample> {
    response
        .recenttracks
        .track
        .into_vec()
        .into_iter()
        .find(RecentTrack::is_now_playing)
        .map(|t| RawSample::new(SCROBBLE_SOURCE_ID, t.artist.text, t.name, t.album.text))
}

impl ScrobbleSource {
    pub fn new(client: LastFmClient, username: &str) -> Self {
        Self {
            client,
            username: username.to_string(),
        }
    }
}

#[async_trait]
impl Source for ScrobbleSource {
    fn id(&self) -> &str {
        SCROBBLE_SOURCE_ID
    }

    async fn fetch_now_playing(&self) -> Result<Option<RawSample>, SourceError> {
        let response: RecentTracksResponse = self
            .client
            .call(
                "user.getrecenttracks",
                &[("user", self.username.as_str()), ("limit", "1")],
            )
            .await
            .map_err(|e| SourceError::unavailable(SCROBBLE_SOURCE_ID, e.to_string()))?;
        Ok(now_playing(response))
    }

    async fn probe_health(&self) -> HealthProbe {
        match self
            .client
            .call::<serde_json::Value>("user.getinfo", &[("user", self.username.as_str())])
            .await
        {
            Ok(_) => HealthProbe::healthy(),
            Err(e) => {
                debug!("Scrobble health check failed: {}", e);
                HealthProbe::unreachable()
            }
        }
    }
}
