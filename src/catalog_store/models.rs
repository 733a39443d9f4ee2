//! Catalog entities written by ingestion and read by analytics.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artist {
    pub id: i64,
    pub name: String,
    pub image_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Album {
    pub id: i64,
    pub title: String,
    /// Credited artists in credit order.
    pub artist_ids: Vec<i64>,
    pub year: Option<i32>,
    pub url: Option<String>,
    pub image_urls: Vec<String>,
    pub ai_description: Option<String>,
}

impl Album {
    pub fn has_image(&self) -> bool {
        !self.image_urls.is_empty()
    }

    /// True when every enrichable field is populated.
    pub fn is_fully_enriched(&self) -> bool {
        self.year.is_some() && self.url.is_some() && self.has_image() && self.ai_description.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: i64,
    pub title: String,
    pub album_id: i64,
    pub duration_secs: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListeningEvent {
    pub id: i64,
    pub track_id: i64,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
    pub source: String,
    /// Zone or device the playback happened on, when known.
    pub context: Option<String>,
    pub loved: bool,
}

/// A listening event joined with the names needed by analytics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventDetails {
    pub event: ListeningEvent,
    pub track_title: String,
    pub album_id: i64,
    pub album_title: String,
    /// Credited artist names, primary artist first.
    pub artist_names: Vec<String>,
}

impl EventDetails {
    pub fn primary_artist(&self) -> Option<&str> {
        self.artist_names.first().map(String::as_str)
    }
}

/// Values to fill in on an album. `None` leaves the stored value untouched,
/// and a present value never overwrites an existing one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlbumUpdate {
    pub year: Option<i32>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    pub ai_description: Option<String>,
}

impl AlbumUpdate {
    pub fn is_empty(&self) -> bool {
        self.year.is_none()
            && self.url.is_none()
            && self.image_url.is_none()
            && self.ai_description.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewListeningEvent {
    pub track_id: i64,
    pub timestamp: i64,
    pub source: String,
    pub context: Option<String>,
}

/// Filter for [`super::CatalogStore::query_events`]. Results are ordered by
/// timestamp ascending.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Inclusive lower bound (unix seconds).
    pub since: Option<i64>,
    /// Exclusive upper bound (unix seconds).
    pub until: Option<i64>,
    pub source: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogCounts {
    pub artists: usize,
    pub albums: usize,
    pub tracks: usize,
    pub events: usize,
}
