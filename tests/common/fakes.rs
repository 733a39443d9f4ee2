#![allow(dead_code)]

use async_trait::async_trait;
use listenlog::listening::RawSample;
use listenlog::providers::{
    AlbumDetails, AlbumDetailsProvider, AlbumImageProvider, ArtistImageProvider, ProviderError,
    TextGenerator, TransientKind,
};
use listenlog::sources::{HealthProbe, Source, SourceError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// A source reporting whatever the test last put on.
pub struct PlaybackSource {
    id: &'static str,
    playing: Mutex<Option<RawSample>>,
}

impl PlaybackSource {
    pub fn new(id: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            playing: Mutex::new(None),
        })
    }

    pub fn play(&self, artist: &str, title: &str, album: &str) {
        *self.playing.lock().unwrap() = Some(RawSample::new(self.id, artist, title, album));
    }

    pub fn stop(&self) {
        *self.playing.lock().unwrap() = None;
    }
}

#[async_trait]
impl Source for PlaybackSource {
    fn id(&self) -> &str {
        self.id
    }

    async fn fetch_now_playing(&self) -> Result<Option<RawSample>, SourceError> {
        Ok(self.playing.lock().unwrap().clone())
    }

    async fn probe_health(&self) -> HealthProbe {
        HealthProbe::healthy()
    }
}

/// Counts invocations, shared by the fake providers below.
#[derive(Default)]
pub struct Calls(AtomicU32);

impl Calls {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Album details without a cover, so the image step needs its own provider.
#[derive(Default)]
pub struct FakeDetails {
    pub calls: Calls,
}

#[async_trait]
impl AlbumDetailsProvider for FakeDetails {
    fn name(&self) -> &str {
        "details"
    }

    async fn fetch_album_details(
        &self,
        _artist: &str,
        title: &str,
    ) -> Result<Option<AlbumDetails>, ProviderError> {
        self.calls.hit();
        Ok(Some(AlbumDetails {
            url: Some(format!("https://music.example/{}", title.replace(' ', "-"))),
            year: Some(1975),
            image_url: None,
        }))
    }
}

#[derive(Default)]
pub struct FakeAlbumImage {
    pub calls: Calls,
}

#[async_trait]
impl AlbumImageProvider for FakeAlbumImage {
    fn name(&self) -> &str {
        "covers"
    }

    async fn fetch_album_image(
        &self,
        _artist: &str,
        _title: &str,
    ) -> Result<Option<String>, ProviderError> {
        self.calls.hit();
        Ok(Some("https://covers.example/front.jpg".to_string()))
    }
}

/// Every call times out.
#[derive(Default)]
pub struct FailingAlbumImage {
    pub calls: Calls,
}

#[async_trait]
impl AlbumImageProvider for FailingAlbumImage {
    fn name(&self) -> &str {
        "covers"
    }

    async fn fetch_album_image(
        &self,
        _artist: &str,
        _title: &str,
    ) -> Result<Option<String>, ProviderError> {
        self.calls.hit();
        Err(ProviderError::transient(
            TransientKind::Timeout,
            "cover service did not answer",
        ))
    }
}

#[derive(Default)]
pub struct FakeArtistImage {
    pub calls: Calls,
}

#[async_trait]
impl ArtistImageProvider for FakeArtistImage {
    fn name(&self) -> &str {
        "artists"
    }

    async fn fetch_artist_image(&self, artist: &str) -> Result<Option<String>, ProviderError> {
        self.calls.hit();
        Ok(Some(format!(
            "https://artists.example/{}.jpg",
            artist.to_lowercase().replace(' ', "-")
        )))
    }
}

#[derive(Default)]
pub struct FakeText {
    pub calls: Calls,
}

#[async_trait]
impl TextGenerator for FakeText {
    fn name(&self) -> &str {
        "llm"
    }

    async fn generate_text(&self, _prompt: &str, _max_tokens: u32) -> Result<String, ProviderError> {
        self.calls.hit();
        Ok("A progressive rock album.".to_string())
    }
}
