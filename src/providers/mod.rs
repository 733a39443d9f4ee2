//! External metadata and text providers used during enrichment.
//!
//! Each provider exposes one best-effort operation. Providers are optional:
//! a missing one disables the enrichment step it would serve.

mod discogs;
mod error;
mod http;
mod lastfm;
mod llm;

pub use discogs::DiscogsClient;
pub use error::{ProviderError, TransientKind};
pub use lastfm::LastFmClient;
pub use llm::OpenAiTextGenerator;

pub(crate) use http::{check_status, classify_request_error};

use async_trait::async_trait;

/// Canonical release information for an album.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlbumDetails {
    pub url: Option<String>,
    pub year: Option<i32>,
    /// Cover art, when the details provider happens to carry one.
    pub image_url: Option<String>,
}

#[async_trait]
pub trait ArtistImageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_artist_image(&self, artist: &str) -> Result<Option<String>, ProviderError>;
}

#[async_trait]
pub trait AlbumDetailsProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the provider has no matching release.
    async fn fetch_album_details(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Option<AlbumDetails>, ProviderError>;
}

#[async_trait]
pub trait AlbumImageProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_album_image(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Option<String>, ProviderError>;
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_text(&self, prompt: &str, max_tokens: u32) -> Result<String, ProviderError>;
}
