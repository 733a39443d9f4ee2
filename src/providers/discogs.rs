//! Discogs database client: release details and artist images.

use super::{
    check_status, classify_request_error, AlbumDetails, AlbumDetailsProvider, ArtistImageProvider,
    ProviderError,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DISCOGS_API_BASE: &str = "https://api.discogs.com";
const USER_AGENT: &str = concat!("listenlog/", env!("CARGO_PKG_VERSION"));

pub struct DiscogsClient {
    client: Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    uri: Option<String>,
    year: Option<String>,
    cover_image: Option<String>,
}

impl SearchResult {
    fn year(&self) -> Option<i32> {
        self.year.as_deref().and_then(|y| y.trim().parse().ok())
    }
}

/// Discogs serves this placeholder when a release has no artwork.
fn real_image(url: Option<String>) -> Option<String> {
    url.filter(|u| !u.is_empty() && !u.ends_with("spacer.gif"))
}

impl DiscogsClient {
    pub fn new(token: &str, timeout: Duration) -> anyhow::Result<Self> {
        Self::with_base_url(DISCOGS_API_BASE, token, timeout)
    }

    pub fn with_base_url(base_url: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn search(&self, params: &[(&str, &str)]) -> Result<Vec<SearchResult>, ProviderError> {
        let url = format!("{}/database/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(params)
            .header("Authorization", format!("Discogs token={}", self.token))
            .send()
            .await
            .map_err(classify_request_error)?;
        check_status("discogs", response.status())?;

        let body: SearchResponse = response.json().await.map_err(classify_request_error)?;
        Ok(body.results)
    }
}

#[async_trait]
impl AlbumDetailsProvider for DiscogsClient {
    fn name(&self) -> &str {
        "discogs"
    }

    async fn fetch_album_details(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Option<AlbumDetails>, ProviderError> {
        let results = self
            .search(&[
                ("type", "master"),
                ("artist", artist),
                ("release_title", title),
                ("per_page", "5"),
            ])
            .await?;

        let Some(best) = results.into_iter().next() else {
            debug!("Discogs has no release for {} - {}", artist, title);
            return Ok(None);
        };
        let year = best.year();
        Ok(Some(AlbumDetails {
            url: best.uri.map(|uri| format!("https://www.discogs.com{}", uri)),
            year,
            image_url: real_image(best.cover_image),
        }))
    }
}

#[async_trait]
impl ArtistImageProvider for DiscogsClient {
    fn name(&self) -> &str {
        "discogs"
    }

    async fn fetch_artist_image(&self, artist: &str) -> Result<Option<String>, ProviderError> {
        let results = self
            .search(&[("type", "artist"), ("q", artist), ("per_page", "1")])
            .await?;
        Ok(results.into_iter().next().and_then(|r| real_image(r.cover_image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_results() {
        let body = r#"{
            "pagination": {"items": 1},
            "results": [{
                "uri": "/master/1234-Pink-Floyd-Wish-You-Were-Here",
                "year": "1975",
                "cover_image": "https://i.discogs.com/cover.jpg"
            }]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].year(), Some(1975));
    }

    #[test]
    fn placeholder_images_are_ignored() {
        assert_eq!(
            real_image(Some("https://s.discogs.com/images/spacer.gif".into())),
            None
        );
        assert_eq!(real_image(Some(String::new())), None);
        assert_eq!(
            real_image(Some("https://i.discogs.com/a.jpg".into())),
            Some("https://i.discogs.com/a.jpg".to_string())
        );
    }

    #[test]
    fn empty_results_deserialize() {
        let parsed: SearchResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.results.is_empty());
    }
}
