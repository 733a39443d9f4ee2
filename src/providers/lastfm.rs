//! Last.fm API client. Serves album cover art and backs the scrobble source.

use super::{check_status, classify_request_error, AlbumImageProvider, ProviderError};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub(crate) const LASTFM_API_BASE: &str = "https://ws.audioscrobbler.com/2.0/";

/// Image sizes in ascending order, as Last.fm labels them.
const IMAGE_SIZES: [&str; 5] = ["small", "medium", "large", "extralarge", "mega"];

#[derive(Clone)]
pub struct LastFmClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
pub(crate) struct LastFmImage {
    #[serde(rename = "#text", default)]
    pub url: String,
    #[serde(default)]
    pub size: String,
}

/// Picks the largest non-empty image.
pub(crate) fn largest_image(images: &[LastFmImage]) -> Option<String> {
    images
        .iter()
        .filter(|i| !i.url.is_empty())
        .max_by_key(|i| IMAGE_SIZES.iter().position(|s| *s == i.size))
        .map(|i| i.url.clone())
}

#[derive(Deserialize)]
struct AlbumInfoResponse {
    album: Option<AlbumInfo>,
}

#[derive(Deserialize)]
struct AlbumInfo {
    #[serde(default)]
    image: Vec<LastFmImage>,
}

/// Last.fm reports API failures in a JSON body, sometimes with status 200.
#[derive(Deserialize)]
struct ApiError {
    error: u32,
    message: Option<String>,
}

impl LastFmClient {
    pub fn new(api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(LASTFM_API_BASE, api_key, timeout)
    }

    pub fn with_base_url(base_url: &str, api_key: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Calls `method` with the given parameters and decodes the JSON body.
    pub(crate) async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("method", method),
                ("api_key", self.api_key.as_str()),
                ("format", "json"),
            ])
            .query(params)
            .send()
            .await
            .map_err(classify_request_error)?;
        check_status("lastfm", response.status())?;

        let body: serde_json::Value = response.json().await.map_err(classify_request_error)?;
        decode_body(body)
    }
}

fn decode_body<T: DeserializeOwned>(body: serde_json::Value) -> Result<T, ProviderError> {
    if let Ok(api_error) = serde_json::from_value::<ApiError>(body.clone()) {
        let message = api_error.message.unwrap_or_default();
        // 11 service offline, 16 temporary error, 29 rate limit exceeded
        return Err(match api_error.error {
            11 | 16 | 29 => ProviderError::transient(
                super::TransientKind::RateLimited,
                format!("lastfm error {}: {}", api_error.error, message),
            ),
            code => ProviderError::permanent(format!("lastfm error {}: {}", code, message)),
        });
    }
    serde_json::from_value(body)
        .map_err(|e| ProviderError::permanent(format!("invalid lastfm response: {}", e)))
}

#[async_trait]
impl AlbumImageProvider for LastFmClient {
    fn name(&self) -> &str {
        "lastfm"
    }

    async fn fetch_album_image(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Option<String>, ProviderError> {
        let result = self
            .call::<AlbumInfoResponse>(
                "album.getinfo",
                &[("artist", artist), ("album", title), ("autocorrect", "1")],
            )
            .await;
        match result {
            Ok(body) => Ok(body.album.and_then(|a| largest_image(&a.image))),
            // 6: album not found
            Err(ProviderError::Permanent(message)) if message.starts_with("lastfm error 6:") => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
