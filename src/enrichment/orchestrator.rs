use super::{
    EnrichmentReport, EnrichmentStep, EventOutcome, IngestError, StepStatus,
};
use crate::catalog_store::{Album, AlbumUpdate, Artist, CatalogStore, NewListeningEvent, Track};
use crate::clock::Clock;
use crate::listening::{ArtistMatcher, RawSample};
use crate::metrics;
use crate::providers::{
    AlbumDetails, AlbumDetailsProvider, AlbumImageProvider, ArtistImageProvider, ProviderError,
    TextGenerator,
};
use crate::resilience::{BreakerSnapshot, ResilientCaller};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_DESCRIPTION_MAX_TOKENS: u32 = 300;

/// Optional providers, one per enrichment capability.
#[derive(Clone, Default)]
pub struct Providers {
    pub artist_image: Option<Arc<dyn ArtistImageProvider>>,
    pub album_details: Option<Arc<dyn AlbumDetailsProvider>>,
    /// Secondary cover source, asked only when the details provider had none.
    pub album_image: Option<Arc<dyn AlbumImageProvider>>,
    pub text: Option<Arc<dyn TextGenerator>>,
}

#[derive(Debug, Clone)]
pub struct EnrichmentSettings {
    pub description_max_tokens: u32,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            description_max_tokens: DEFAULT_DESCRIPTION_MAX_TOKENS,
        }
    }
}

/// Turns detected samples into catalog rows and listening events, filling in
/// metadata from the configured providers along the way.
///
/// Provider failures are recorded in the returned report and never abort an
/// ingestion. Only catalog store failures do.
pub struct EnrichmentOrchestrator {
    store: Arc<dyn CatalogStore>,
    providers: Providers,
    caller: ResilientCaller,
    matcher: ArtistMatcher,
    clock: Arc<dyn Clock>,
    settings: EnrichmentSettings,
}

impl EnrichmentOrchestrator {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        providers: Providers,
        caller: ResilientCaller,
        matcher: ArtistMatcher,
        clock: Arc<dyn Clock>,
        settings: EnrichmentSettings,
    ) -> Self {
        Self {
            store,
            providers,
            caller,
            matcher,
            clock,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn breaker_snapshots(&self) -> Vec<BreakerSnapshot> {
        self.caller.breaker_snapshots()
    }

    /// Records one listening event for `sample`, creating and enriching its
    /// artists, album and track as needed.
    pub async fn ingest(&self, sample: &RawSample) -> Result<EventOutcome, IngestError> {
        if !sample.is_complete() {
            return Err(IngestError::InvalidSample {
                source_id: sample.source_id.clone(),
            });
        }
        let mut report = EnrichmentReport::default();

        let mut artists = Vec::new();
        for name in sample.artist_names() {
            artists.push(self.resolve_artist(&name, &mut report).await?);
        }
        let artist_ids: Vec<i64> = artists.iter().map(|a| a.id).collect();
        let primary_artist = artists.first().map(|a| a.name.clone()).unwrap_or_default();

        let (album, album_created) = self.resolve_album(&sample.album_title, &artists)?;
        let album = self.enrich_album(album, &primary_artist, &mut report).await?;

        let track = self.resolve_track(sample, album.id)?;

        let event = self.store.append_listening_event(&NewListeningEvent {
            track_id: track.id,
            timestamp: self.clock.now().timestamp(),
            source: sample.source_id.clone(),
            context: sample.zone.clone(),
        })?;

        info!(
            "Recorded listening event {} for {} from {}",
            event.id,
            sample.identity(),
            sample.source_id
        );
        metrics::record_event(&sample.source_id);
        record_step_metrics(&report);

        Ok(EventOutcome {
            event,
            artist_ids,
            album,
            album_created,
            track,
            report,
        })
    }

    /// Fills whatever is still missing on an existing album.
    pub async fn refresh_album(&self, album_id: i64) -> Result<EnrichmentReport, IngestError> {
        let album = self
            .store
            .get_album(album_id)?
            .ok_or(IngestError::NotFound {
                entity: "album",
                id: album_id,
            })?;
        let artists = self.store.get_artists(&album.artist_ids)?;
        let primary_artist = artists.first().map(|a| a.name.clone()).unwrap_or_default();

        let mut report = EnrichmentReport::default();
        self.enrich_album(album, &primary_artist, &mut report).await?;
        record_step_metrics(&report);
        Ok(report)
    }

    pub fn set_loved(&self, event_id: i64, loved: bool) -> Result<(), IngestError> {
        if self.store.set_event_loved(event_id, loved)? {
            debug!("Listening event {} loved={}", event_id, loved);
            Ok(())
        } else {
            Err(IngestError::NotFound {
                entity: "listening event",
                id: event_id,
            })
        }
    }

    // =========================================================================
    // Catalog resolution
    // =========================================================================

    async fn resolve_artist(
        &self,
        name: &str,
        report: &mut EnrichmentReport,
    ) -> Result<Artist, IngestError> {
        if let Some(artist) = self.store.find_artist_by_name(name)? {
            return Ok(artist);
        }
        let mut artist = self.store.create_artist(name)?;
        info!("Created artist {} ({})", artist.name, artist.id);

        let status = match &self.providers.artist_image {
            None => StepStatus::NotConfigured,
            Some(provider) => {
                let provider = provider.as_ref();
                let service = provider.name().to_string();
                let result = self
                    .guarded(EnrichmentStep::ArtistImage, &service, move || {
                        provider.fetch_artist_image(name)
                    })
                    .await;
                match result {
                    Ok(Some(url)) => {
                        self.store.add_artist_image(artist.id, &url)?;
                        artist.image_urls.push(url);
                        StepStatus::Applied
                    }
                    Ok(None) => StepStatus::NothingFound,
                    Err(status) => status,
                }
            }
        };
        report.record_for(EnrichmentStep::ArtistImage, name, status);
        Ok(artist)
    }

    /// Exact (title, artist set) lookup, then a same-title pass judged by the
    /// artist matcher, then creation.
    fn resolve_album(&self, title: &str, artists: &[Artist]) -> Result<(Album, bool), IngestError> {
        let artist_ids: Vec<i64> = artists.iter().map(|a| a.id).collect();
        if let Some(album) = self.store.find_album(title, &artist_ids)? {
            return Ok((album, false));
        }

        let candidate_names: Vec<String> = artists.iter().map(|a| a.name.clone()).collect();
        for album in self.store.find_albums_by_title(title)? {
            let credited: Vec<String> = self
                .store
                .get_artists(&album.artist_ids)?
                .into_iter()
                .map(|a| a.name)
                .collect();
            if self.matcher.same_artist_set(&credited, &candidate_names) {
                info!(
                    "Reusing album {} ({}) credited to {:?} for {:?}",
                    album.title, album.id, credited, candidate_names
                );
                return Ok((album, false));
            }
        }

        let album = self.store.create_album(title, &artist_ids)?;
        info!("Created album {} ({})", album.title, album.id);
        Ok((album, true))
    }

    fn resolve_track(&self, sample: &RawSample, album_id: i64) -> Result<Track, IngestError> {
        match self.store.find_track(&sample.track_title, album_id)? {
            Some(mut track) => {
                if let (None, Some(duration)) = (track.duration_secs, sample.duration_secs) {
                    self.store.set_track_duration(track.id, duration)?;
                    track.duration_secs = Some(duration);
                }
                Ok(track)
            }
            None => Ok(self
                .store
                .create_track(&sample.track_title, album_id, sample.duration_secs)?),
        }
    }

    // =========================================================================
    // Album enrichment
    // =========================================================================

    /// Asks providers only for the fields the album is missing, and writes
    /// back whatever they returned.
    async fn enrich_album(
        &self,
        album: Album,
        artist: &str,
        report: &mut EnrichmentReport,
    ) -> Result<Album, IngestError> {
        if album.is_fully_enriched() {
            for step in EnrichmentStep::ALBUM_STEPS {
                report.record(step, StepStatus::NotNeeded);
            }
            return Ok(album);
        }
        if album.title.trim().is_empty() {
            debug!("Album {} has no title, skipping enrichment", album.id);
            for step in EnrichmentStep::ALBUM_STEPS {
                report.record(step, StepStatus::NothingFound);
            }
            return Ok(album);
        }

        let need_details = album.url.is_none() || album.year.is_none();
        let need_image = !album.has_image();
        let mut update = AlbumUpdate::default();

        // The details provider doubles as the first cover source.
        let details = if need_details || need_image {
            Some(self.fetch_details(artist, &album.title).await)
        } else {
            None
        };

        let details_status = match &details {
            None => StepStatus::NotNeeded,
            Some(_) if !need_details => StepStatus::NotNeeded,
            Some(Err(status)) => status.clone(),
            Some(Ok(None)) => StepStatus::NothingFound,
            Some(Ok(Some(found))) => {
                if album.url.is_none() {
                    update.url = found.url.clone();
                }
                if album.year.is_none() {
                    update.year = found.year;
                }
                if update.url.is_some() || update.year.is_some() {
                    StepStatus::Applied
                } else {
                    StepStatus::NothingFound
                }
            }
        };
        report.record(EnrichmentStep::AlbumDetails, details_status);

        let image_status = if !need_image {
            StepStatus::NotNeeded
        } else {
            let details_image = match &details {
                Some(Ok(Some(found))) => found.image_url.clone(),
                _ => None,
            };
            match details_image {
                Some(url) => {
                    update.image_url = Some(url);
                    StepStatus::Applied
                }
                None => {
                    let fallback = self.fetch_album_image(artist, &album.title).await;
                    match fallback {
                        Ok(Some(url)) => {
                            update.image_url = Some(url);
                            StepStatus::Applied
                        }
                        Ok(None) => StepStatus::NothingFound,
                        Err(StepStatus::NotConfigured) => match details {
                            Some(Ok(_)) => StepStatus::NothingFound,
                            Some(Err(status)) => status,
                            None => StepStatus::NotConfigured,
                        },
                        Err(status) => status,
                    }
                }
            }
        };
        report.record(EnrichmentStep::AlbumImage, image_status);

        let description_status = if album.ai_description.is_some() {
            StepStatus::NotNeeded
        } else {
            let year = update.year.or(album.year);
            match self.generate_description(artist, &album.title, year).await {
                Ok(Some(text)) => {
                    update.ai_description = Some(text);
                    StepStatus::Applied
                }
                Ok(None) => StepStatus::NothingFound,
                Err(status) => status,
            }
        };
        report.record(EnrichmentStep::AiDescription, description_status);

        if update.is_empty() {
            return Ok(album);
        }
        let album_id = album.id;
        self.store
            .update_album_fields(album_id, &update)?
            .ok_or(IngestError::NotFound {
                entity: "album",
                id: album_id,
            })
    }

    async fn fetch_details(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Option<AlbumDetails>, StepStatus> {
        let Some(provider) = self.providers.album_details.as_deref() else {
            return Err(StepStatus::NotConfigured);
        };
        let service = provider.name().to_string();
        self.guarded(EnrichmentStep::AlbumDetails, &service, move || {
            provider.fetch_album_details(artist, title)
        })
        .await
    }

    async fn fetch_album_image(&self, artist: &str, title: &str) -> Result<Option<String>, StepStatus> {
        let Some(provider) = self.providers.album_image.as_deref() else {
            return Err(StepStatus::NotConfigured);
        };
        let service = provider.name().to_string();
        self.guarded(EnrichmentStep::AlbumImage, &service, move || {
            provider.fetch_album_image(artist, title)
        })
        .await
    }

    async fn generate_description(
        &self,
        artist: &str,
        title: &str,
        year: Option<i32>,
    ) -> Result<Option<String>, StepStatus> {
        let Some(generator) = self.providers.text.as_deref() else {
            return Err(StepStatus::NotConfigured);
        };
        let prompt = description_prompt(artist, title, year);
        let prompt = prompt.as_str();
        let max_tokens = self.settings.description_max_tokens;
        let service = generator.name().to_string();
        self.guarded(EnrichmentStep::AiDescription, &service, move || async move {
            generator.generate_text(prompt, max_tokens).await.map(Some)
        })
        .await
    }

    /// Runs a provider call through retry and the service's breaker, turning
    /// failures into the step status to report.
    async fn guarded<T, F, Fut>(
        &self,
        step: EnrichmentStep,
        service: &str,
        op: F,
    ) -> Result<Option<T>, StepStatus>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, ProviderError>>,
    {
        match self.caller.call(service, op).await {
            Ok(value) => Ok(value),
            Err(ProviderError::BreakerOpen { .. }) => {
                debug!("Skipping {} via {}: circuit open", step.as_str(), service);
                Err(StepStatus::BreakerOpen)
            }
            Err(e) => {
                warn!("Enrichment step {} via {} failed: {}", step.as_str(), service, e);
                Err(StepStatus::Failed(e.to_string()))
            }
        }
    }
}

fn description_prompt(artist: &str, title: &str, year: Option<i32>) -> String {
    let released = year.map(|y| format!(" ({})", y)).unwrap_or_default();
    format!(
        "Write a short, factual description of the album \"{}\" by {}{}. \
         Mention its style and its place in the artist's discography. \
         Answer with two or three sentences of plain text.",
        title, artist, released
    )
}

fn record_step_metrics(report: &EnrichmentReport) {
    for step in &report.steps {
        metrics::record_enrichment_step(step.step.as_str(), step.status.as_str());
    }
}
