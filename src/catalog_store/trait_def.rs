//! CatalogStore trait definition.

use super::models::*;
use crate::listening::EventIdentity;
use anyhow::Result;
use std::time::Duration;

/// Storage backend for the listening catalog.
///
/// Lookups take display names and match on their normalized form. Methods
/// that touch a single row by id return `Ok(false)` / `Ok(None)` when the
/// row does not exist rather than an error.
pub trait CatalogStore: Send + Sync {
    // =========================================================================
    // Artists
    // =========================================================================

    fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>>;

    fn create_artist(&self, name: &str) -> Result<Artist>;

    /// Appends an image URL to the artist. Duplicate URLs are ignored.
    fn add_artist_image(&self, artist_id: i64, url: &str) -> Result<bool>;

    /// Artists for the given ids, in the order requested. Unknown ids are
    /// skipped.
    fn get_artists(&self, ids: &[i64]) -> Result<Vec<Artist>>;

    // =========================================================================
    // Albums
    // =========================================================================

    /// Album with this title credited to exactly this artist set (order
    /// insensitive).
    fn find_album(&self, title: &str, artist_ids: &[i64]) -> Result<Option<Album>>;

    /// Every album with this title, whatever its artists.
    fn find_albums_by_title(&self, title: &str) -> Result<Vec<Album>>;

    fn get_album(&self, id: i64) -> Result<Option<Album>>;

    fn create_album(&self, title: &str, artist_ids: &[i64]) -> Result<Album>;

    /// Fills the absent fields of an album from `update`. Present fields are
    /// never overwritten. Returns `Ok(None)` when the album does not exist.
    fn update_album_fields(&self, id: i64, update: &AlbumUpdate) -> Result<Option<Album>>;

    // =========================================================================
    // Tracks
    // =========================================================================

    fn find_track(&self, title: &str, album_id: i64) -> Result<Option<Track>>;

    fn create_track(&self, title: &str, album_id: i64, duration_secs: Option<u32>) -> Result<Track>;

    /// Records the duration only if none is known yet.
    fn set_track_duration(&self, track_id: i64, duration_secs: u32) -> Result<bool>;

    // =========================================================================
    // Listening events
    // =========================================================================

    fn append_listening_event(&self, event: &NewListeningEvent) -> Result<ListeningEvent>;

    fn set_event_loved(&self, event_id: i64, loved: bool) -> Result<bool>;

    fn query_events(&self, filter: &EventFilter) -> Result<Vec<EventDetails>>;

    /// True when an event for `identity` was recorded in `[now - window, now]`.
    fn has_recent_event(&self, identity: &EventIdentity, window: Duration, now: i64) -> Result<bool>;

    // =========================================================================
    // Counts (for metrics)
    // =========================================================================

    fn counts(&self) -> Result<CatalogCounts>;
}
