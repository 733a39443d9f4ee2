//! SQLite-backed catalog store.

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::CatalogStore;
use crate::listening::{normalize, EventIdentity};
use crate::sqlite_persistence::open_versioned;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// Single-connection SQLite catalog. Pollers write rarely (one event per
/// track change), so one serialized connection is enough.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open catalog database {:?}", db_path))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self::from_connection(conn)?;

        let counts = store.counts()?;
        info!(
            "Opened catalog {:?}: {} artists, {} albums, {} tracks, {} listening events",
            db_path, counts.artists, counts.albums, counts.tracks, counts.events
        );
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        open_versioned(&mut conn, CATALOG_VERSIONED_SCHEMAS, "catalog")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Catalog connection lock poisoned"))
    }

    fn artist_images(conn: &Connection, artist_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare_cached(
            "SELECT url FROM artist_images WHERE artist_id = ?1 ORDER BY position",
        )?;
        let urls = stmt
            .query_map(params![artist_id], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(urls)
    }

    fn load_artist(conn: &Connection, id: i64) -> Result<Option<Artist>> {
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, name FROM artists WHERE id = ?1",
                params![id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        match row {
            Some((id, name)) => Ok(Some(Artist {
                id,
                name,
                image_urls: Self::artist_images(conn, id)?,
            })),
            None => Ok(None),
        }
    }

    fn album_artist_ids(conn: &Connection, album_id: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare_cached(
            "SELECT artist_id FROM album_artists WHERE album_id = ?1 ORDER BY position",
        )?;
        let ids = stmt
            .query_map(params![album_id], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(ids)
    }

    fn album_artist_names(conn: &Connection, album_id: i64) -> Result<Vec<String>> {
        let mut stmt = conn.prepare_cached(
            "SELECT ar.name FROM album_artists aa JOIN artists ar ON ar.id = aa.artist_id
             WHERE aa.album_id = ?1 ORDER BY aa.position",
        )?;
        let names = stmt
            .query_map(params![album_id], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(names)
    }

    fn load_album(conn: &Connection, id: i64) -> Result<Option<Album>> {
        let row = conn
            .query_row(
                "SELECT id, title, year, url, ai_description FROM albums WHERE id = ?1",
                params![id],
                |r| {
                    Ok(Album {
                        id: r.get(0)?,
                        title: r.get(1)?,
                        artist_ids: Vec::new(),
                        year: r.get(2)?,
                        url: r.get(3)?,
                        image_urls: Vec::new(),
                        ai_description: r.get(4)?,
                    })
                },
            )
            .optional()?;
        let Some(mut album) = row else {
            return Ok(None);
        };
        album.artist_ids = Self::album_artist_ids(conn, id)?;
        let mut stmt = conn.prepare_cached(
            "SELECT url FROM album_images WHERE album_id = ?1 ORDER BY position",
        )?;
        album.image_urls = stmt
            .query_map(params![id], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        Ok(Some(album))
    }

    fn albums_by_title(conn: &Connection, title: &str) -> Result<Vec<Album>> {
        let mut stmt =
            conn.prepare_cached("SELECT id FROM albums WHERE normalized_title = ?1 ORDER BY id")?;
        let ids: Vec<i64> = stmt
            .query_map(params![normalize(title)], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let mut albums = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(album) = Self::load_album(conn, id)? {
                albums.push(album);
            }
        }
        Ok(albums)
    }

    fn load_track(conn: &Connection, album_id: i64, normalized_title: &str) -> Result<Option<Track>> {
        Ok(conn
            .query_row(
                "SELECT id, title, album_id, duration_secs FROM tracks
                 WHERE album_id = ?1 AND normalized_title = ?2",
                params![album_id, normalized_title],
                |r| {
                    Ok(Track {
                        id: r.get(0)?,
                        title: r.get(1)?,
                        album_id: r.get(2)?,
                        duration_secs: r.get(3)?,
                    })
                },
            )
            .optional()?)
    }

    fn count(conn: &Connection, table: &str) -> Result<usize> {
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

fn sorted(ids: &[i64]) -> Vec<i64> {
    let mut ids = ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl CatalogStore for SqliteCatalogStore {
    fn find_artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        let conn = self.conn()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM artists WHERE normalized_name = ?1",
                params![normalize(name)],
                |r| r.get(0),
            )
            .optional()?;
        match id {
            Some(id) => Self::load_artist(&conn, id),
            None => Ok(None),
        }
    }

    fn create_artist(&self, name: &str) -> Result<Artist> {
        let conn = self.conn()?;
        let normalized = normalize(name);
        // A concurrent poller may have created it since the caller looked.
        conn.execute(
            "INSERT INTO artists (name, normalized_name) VALUES (?1, ?2)
             ON CONFLICT(normalized_name) DO NOTHING",
            params![name.trim(), normalized],
        )
        .context("Failed to insert artist")?;
        let id: i64 = conn.query_row(
            "SELECT id FROM artists WHERE normalized_name = ?1",
            params![normalized],
            |r| r.get(0),
        )?;
        Self::load_artist(&conn, id)?.ok_or_else(|| anyhow!("Artist {} vanished after insert", id))
    }

    fn add_artist_image(&self, artist_id: i64, url: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT OR IGNORE INTO artist_images (artist_id, url, position)
             SELECT ?1, ?2, COALESCE(MAX(position) + 1, 0) FROM artist_images WHERE artist_id = ?1",
            params![artist_id, url],
        )?;
        Ok(changed > 0)
    }

    fn get_artists(&self, ids: &[i64]) -> Result<Vec<Artist>> {
        let conn = self.conn()?;
        let mut artists = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(artist) = Self::load_artist(&conn, *id)? {
                artists.push(artist);
            }
        }
        Ok(artists)
    }

    fn find_album(&self, title: &str, artist_ids: &[i64]) -> Result<Option<Album>> {
        let conn = self.conn()?;
        let wanted = sorted(artist_ids);
        Ok(Self::albums_by_title(&conn, title)?
            .into_iter()
            .find(|album| sorted(&album.artist_ids) == wanted))
    }

    fn find_albums_by_title(&self, title: &str) -> Result<Vec<Album>> {
        let conn = self.conn()?;
        Self::albums_by_title(&conn, title)
    }

    fn get_album(&self, id: i64) -> Result<Option<Album>> {
        let conn = self.conn()?;
        Self::load_album(&conn, id)
    }

    fn create_album(&self, title: &str, artist_ids: &[i64]) -> Result<Album> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO albums (title, normalized_title) VALUES (?1, ?2)",
            params![title.trim(), normalize(title)],
        )
        .context("Failed to insert album")?;
        let album_id = tx.last_insert_rowid();
        for (position, artist_id) in artist_ids.iter().enumerate() {
            tx.execute(
                "INSERT OR IGNORE INTO album_artists (album_id, artist_id, position) VALUES (?1, ?2, ?3)",
                params![album_id, artist_id, position as i64],
            )
            .with_context(|| format!("Failed to credit artist {} on album {}", artist_id, album_id))?;
        }
        tx.commit()?;
        Self::load_album(&conn, album_id)?
            .ok_or_else(|| anyhow!("Album {} vanished after insert", album_id))
    }

    fn update_album_fields(&self, id: i64, update: &AlbumUpdate) -> Result<Option<Album>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let matched = tx.execute(
            "UPDATE albums SET
                year = COALESCE(year, ?2),
                url = COALESCE(url, ?3),
                ai_description = COALESCE(ai_description, ?4)
             WHERE id = ?1",
            params![
                id,
                update.year,
                non_blank(&update.url),
                non_blank(&update.ai_description)
            ],
        )?;
        if matched == 0 {
            return Ok(None);
        }
        if let Some(image_url) = non_blank(&update.image_url) {
            tx.execute(
                "INSERT INTO album_images (album_id, url, position)
                 SELECT ?1, ?2, 0 WHERE NOT EXISTS (SELECT 1 FROM album_images WHERE album_id = ?1)",
                params![id, image_url],
            )?;
        }
        tx.commit()?;
        Self::load_album(&conn, id)
    }

    fn find_track(&self, title: &str, album_id: i64) -> Result<Option<Track>> {
        let conn = self.conn()?;
        Self::load_track(&conn, album_id, &normalize(title))
    }

    fn create_track(&self, title: &str, album_id: i64, duration_secs: Option<u32>) -> Result<Track> {
        let conn = self.conn()?;
        let normalized = normalize(title);
        conn.execute(
            "INSERT INTO tracks (title, normalized_title, album_id, duration_secs) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(album_id, normalized_title) DO NOTHING",
            params![title.trim(), normalized, album_id, duration_secs],
        )
        .context("Failed to insert track")?;
        Self::load_track(&conn, album_id, &normalized)?
            .ok_or_else(|| anyhow!("Track {:?} on album {} vanished after insert", title, album_id))
    }

    fn set_track_duration(&self, track_id: i64, duration_secs: u32) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE tracks SET duration_secs = ?2 WHERE id = ?1 AND duration_secs IS NULL",
            params![track_id, duration_secs],
        )?;
        Ok(changed > 0)
    }

    fn append_listening_event(&self, event: &NewListeningEvent) -> Result<ListeningEvent> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO listening_events (track_id, timestamp, source, context) VALUES (?1, ?2, ?3, ?4)",
            params![event.track_id, event.timestamp, event.source, event.context],
        )
        .context("Failed to append listening event")?;
        Ok(ListeningEvent {
            id: conn.last_insert_rowid(),
            track_id: event.track_id,
            timestamp: event.timestamp,
            source: event.source.clone(),
            context: event.context.clone(),
            loved: false,
        })
    }

    fn set_event_loved(&self, event_id: i64, loved: bool) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE listening_events SET loved = ?2 WHERE id = ?1",
            params![event_id, loved],
        )?;
        Ok(changed > 0)
    }

    fn query_events(&self, filter: &EventFilter) -> Result<Vec<EventDetails>> {
        let conn = self.conn()?;
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn.prepare_cached(
            "SELECT e.id, e.track_id, e.timestamp, e.source, e.context, e.loved,
                    t.title, a.id, a.title
             FROM listening_events e
             JOIN tracks t ON t.id = e.track_id
             JOIN albums a ON a.id = t.album_id
             WHERE (?1 IS NULL OR e.timestamp >= ?1)
               AND (?2 IS NULL OR e.timestamp < ?2)
               AND (?3 IS NULL OR e.source = ?3)
             ORDER BY e.timestamp ASC, e.id ASC
             LIMIT ?4",
        )?;
        let rows: Vec<EventDetails> = stmt
            .query_map(params![filter.since, filter.until, filter.source, limit], |r| {
                Ok(EventDetails {
                    event: ListeningEvent {
                        id: r.get(0)?,
                        track_id: r.get(1)?,
                        timestamp: r.get(2)?,
                        source: r.get(3)?,
                        context: r.get(4)?,
                        loved: r.get(5)?,
                    },
                    track_title: r.get(6)?,
                    album_id: r.get(7)?,
                    album_title: r.get(8)?,
                    artist_names: Vec::new(),
                })
            })?
            .collect::<rusqlite::Result<_>>()?;

        let mut names_by_album: HashMap<i64, Vec<String>> = HashMap::new();
        let mut details = Vec::with_capacity(rows.len());
        for mut row in rows {
            if !names_by_album.contains_key(&row.album_id) {
                let names = Self::album_artist_names(&conn, row.album_id)?;
                names_by_album.insert(row.album_id, names);
            }
            row.artist_names = names_by_album
                .get(&row.album_id)
                .cloned()
                .unwrap_or_default();
            details.push(row);
        }
        Ok(details)
    }

    fn has_recent_event(&self, identity: &EventIdentity, window: Duration, now: i64) -> Result<bool> {
        let conn = self.conn()?;
        let since = now.saturating_sub(window.as_secs() as i64);
        let mut stmt = conn.prepare_cached(
            "SELECT DISTINCT a.id
             FROM listening_events e
             JOIN tracks t ON t.id = e.track_id
             JOIN albums a ON a.id = t.album_id
             WHERE t.normalized_title = ?1 AND a.normalized_title = ?2
               AND e.timestamp >= ?3 AND e.timestamp <= ?4",
        )?;
        let album_ids: Vec<i64> = stmt
            .query_map(params![identity.title, identity.album, since, now], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        for album_id in album_ids {
            let credited = normalize(&Self::album_artist_names(&conn, album_id)?.join(" / "));
            if credited == identity.artist {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn counts(&self) -> Result<CatalogCounts> {
        let conn = self.conn()?;
        Ok(CatalogCounts {
            artists: Self::count(&conn, "artists")?,
            albums: Self::count(&conn, "albums")?,
            tracks: Self::count(&conn, "tracks")?,
            events: Self::count(&conn, "listening_events")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listening::RawSample;
    use crate::sqlite_persistence::BASE_DB_VERSION;
    use tempfile::TempDir;

    fn store() -> SqliteCatalogStore {
        SqliteCatalogStore::in_memory().unwrap()
    }

    fn seed_play(store: &SqliteCatalogStore, timestamp: i64) -> (Album, Track, ListeningEvent) {
        let artist = store.create_artist("Pink Floyd").unwrap();
        let album = store.create_album("Wish You Were Here", &[artist.id]).unwrap();
        let track = store
            .create_track("Shine On You Crazy Diamond", album.id, None)
            .unwrap();
        let event = store
            .append_listening_event(&NewListeningEvent {
                track_id: track.id,
                timestamp,
                source: "bridge".into(),
                context: Some("Living Room".into()),
            })
            .unwrap();
        (album, track, event)
    }

    #[test]
    fn artists_are_found_by_normalized_name() {
        let store = store();
        let created = store.create_artist("Pink Floyd").unwrap();
        let found = store.find_artist_by_name("  pink FLOYD").unwrap().unwrap();
        assert_eq!(created.id, found.id);
        assert_eq!(found.name, "Pink Floyd");
        assert!(store.find_artist_by_name("Pink Martini").unwrap().is_none());
    }

    #[test]
    fn create_artist_is_idempotent() {
        let store = store();
        let a = store.create_artist("Pink Floyd").unwrap();
        let b = store.create_artist("PINK FLOYD").unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(store.counts().unwrap().artists, 1);
    }

    #[test]
    fn artist_images_keep_insertion_order_and_skip_duplicates() {
        let store = store();
        let artist = store.create_artist("Pink Floyd").unwrap();
        assert!(store.add_artist_image(artist.id, "http://img/1").unwrap());
        assert!(store.add_artist_image(artist.id, "http://img/2").unwrap());
        assert!(!store.add_artist_image(artist.id, "http://img/1").unwrap());
        let artist = store.get_artists(&[artist.id]).unwrap().remove(0);
        assert_eq!(artist.image_urls, vec!["http://img/1", "http://img/2"]);
    }

    #[test]
    fn albums_match_on_title_and_artist_set() {
        let store = store();
        let bowie = store.create_artist("David Bowie").unwrap();
        let queen = store.create_artist("Queen").unwrap();
        let album = store.create_album("Hot Space", &[queen.id, bowie.id]).unwrap();

        let found = store.find_album("hot space", &[bowie.id, queen.id]).unwrap();
        assert_eq!(found.map(|a| a.id), Some(album.id));
        assert!(store.find_album("Hot Space", &[queen.id]).unwrap().is_none());
        assert_eq!(store.find_albums_by_title("HOT SPACE").unwrap().len(), 1);
        assert_eq!(album.artist_ids, vec![queen.id, bowie.id]);
    }

    #[test]
    fn album_update_only_fills_gaps() {
        let store = store();
        let artist = store.create_artist("Pink Floyd").unwrap();
        let album = store.create_album("Animals", &[artist.id]).unwrap();

        let updated = store
            .update_album_fields(
                album.id,
                &AlbumUpdate {
                    year: Some(1977),
                    image_url: Some("http://img/animals".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.year, Some(1977));
        assert_eq!(updated.image_urls, vec!["http://img/animals"]);
        assert!(updated.url.is_none());

        let updated = store
            .update_album_fields(
                album.id,
                &AlbumUpdate {
                    year: Some(2018),
                    url: Some("http://discogs/animals".into()),
                    image_url: Some("http://img/other".into()),
                    ai_description: Some("   ".into()),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.year, Some(1977));
        assert_eq!(updated.url.as_deref(), Some("http://discogs/animals"));
        assert_eq!(updated.image_urls, vec!["http://img/animals"]);
        assert!(updated.ai_description.is_none());
    }

    #[test]
    fn album_update_reports_missing_album() {
        let store = store();
        let result = store
            .update_album_fields(
                42,
                &AlbumUpdate {
                    year: Some(1975),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn track_duration_is_recorded_once() {
        let store = store();
        let (album, track, _) = seed_play(&store, 1000);
        assert!(store.set_track_duration(track.id, 1570).unwrap());
        assert!(!store.set_track_duration(track.id, 1).unwrap());
        let track = store
            .find_track("shine on you crazy diamond", album.id)
            .unwrap()
            .unwrap();
        assert_eq!(track.duration_secs, Some(1570));
    }

    #[test]
    fn events_are_queried_in_time_order_with_artist_names() {
        let store = store();
        let (_, track, first) = seed_play(&store, 2000);
        store
            .append_listening_event(&NewListeningEvent {
                track_id: track.id,
                timestamp: 1000,
                source: "scrobble".into(),
                context: None,
            })
            .unwrap();

        let all = store.query_events(&EventFilter::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event.timestamp, 1000);
        assert_eq!(all[1].event.id, first.id);
        assert_eq!(all[1].event.context.as_deref(), Some("Living Room"));
        assert_eq!(all[0].primary_artist(), Some("Pink Floyd"));

        let bridge_only = store
            .query_events(&EventFilter {
                source: Some("bridge".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(bridge_only.len(), 1);

        let windowed = store
            .query_events(&EventFilter {
                since: Some(1000),
                until: Some(2000),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(windowed.len(), 1);
        assert_eq!(windowed[0].event.timestamp, 1000);
    }

    #[test]
    fn loved_flag_toggles_and_reports_missing_event() {
        let store = store();
        let (_, _, event) = seed_play(&store, 1000);
        assert!(store.set_event_loved(event.id, true).unwrap());
        let events = store.query_events(&EventFilter::default()).unwrap();
        assert!(events[0].event.loved);
        assert!(!store.set_event_loved(event.id + 100, true).unwrap());
    }

    #[test]
    fn recent_event_lookup_respects_window_and_identity() {
        let store = store();
        seed_play(&store, 1000);
        let identity = RawSample::new(
            "scrobble",
            "pink floyd",
            "Shine On You Crazy Diamond",
            "Wish You Were Here",
        )
        .identity();
        let window = Duration::from_secs(600);

        assert!(store.has_recent_event(&identity, window, 1005).unwrap());
        assert!(store.has_recent_event(&identity, window, 1600).unwrap());
        assert!(!store.has_recent_event(&identity, window, 1601).unwrap());

        let other = RawSample::new("scrobble", "Pink Floyd", "Have a Cigar", "Wish You Were Here")
            .identity();
        assert!(!store.has_recent_event(&other, window, 1005).unwrap());
    }

    #[test]
    fn reopening_on_disk_database_keeps_data() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("catalog.db");
        {
            let store = SqliteCatalogStore::new(&db_path).unwrap();
            seed_play(&store, 1000);
        }
        let store = SqliteCatalogStore::new(&db_path).unwrap();
        assert_eq!(store.counts().unwrap().events, 1);
    }

    #[test]
    fn v0_database_is_migrated_to_latest() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("catalog.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            CATALOG_VERSIONED_SCHEMAS[0].create(&conn).unwrap();
        }

        let store = SqliteCatalogStore::new(&db_path).unwrap();
        let (_, _, event) = seed_play(&store, 1000);
        assert_eq!(event.context.as_deref(), Some("Living Room"));

        let conn = Connection::open(&db_path).unwrap();
        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(
            version as usize,
            BASE_DB_VERSION + CATALOG_VERSIONED_SCHEMAS.len() - 1
        );
    }
}
