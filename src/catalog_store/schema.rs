//! SQLite schema definitions for the listening catalog.
//!
//! Names are stored as reported and, next to them, in normalized form for
//! identity lookups.

use crate::sqlite_column;
use crate::sqlite_persistence::{ForeignKey, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP};
use anyhow::Result;
use rusqlite::Connection;

const ARTIST_FK: ForeignKey = ForeignKey {
    foreign_table: "artists",
    foreign_column: "id",
};

const ALBUM_FK: ForeignKey = ForeignKey {
    foreign_table: "albums",
    foreign_column: "id",
};

const TRACK_FK: ForeignKey = ForeignKey {
    foreign_table: "tracks",
    foreign_column: "id",
};

const ARTISTS_TABLE: Table = Table {
    name: "artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("normalized_name", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_artists_normalized_name", "normalized_name")],
    unique_constraints: &[&["normalized_name"]],
};

const ARTIST_IMAGES_TABLE: Table = Table {
    name: "artist_images",
    columns: &[
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_artist_images_artist", "artist_id")],
    unique_constraints: &[&["artist_id", "url"]],
};

const ALBUMS_TABLE: Table = Table {
    name: "albums",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("normalized_title", &SqlType::Text, non_null = true),
        sqlite_column!("year", &SqlType::Integer),
        sqlite_column!("url", &SqlType::Text),
        sqlite_column!("ai_description", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_albums_normalized_title", "normalized_title")],
    unique_constraints: &[],
};

const ALBUM_ARTISTS_TABLE: Table = Table {
    name: "album_artists",
    columns: &[
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!(
            "artist_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ARTIST_FK)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_album_artists_artist", "artist_id")],
    unique_constraints: &[&["album_id", "artist_id"]],
};

const ALBUM_IMAGES_TABLE: Table = Table {
    name: "album_images",
    columns: &[
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!("url", &SqlType::Text, non_null = true),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_album_images_album", "album_id")],
    unique_constraints: &[&["album_id", "url"]],
};

const TRACKS_TABLE: Table = Table {
    name: "tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("normalized_title", &SqlType::Text, non_null = true),
        sqlite_column!(
            "album_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ALBUM_FK)
        ),
        sqlite_column!("duration_secs", &SqlType::Integer),
    ],
    indices: &[("idx_tracks_album", "album_id")],
    unique_constraints: &[&["album_id", "normalized_title"]],
};

const LISTENING_EVENTS_TABLE_V0: Table = Table {
    name: "listening_events",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!(
            "loved",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
    ],
    indices: &[
        ("idx_listening_events_timestamp", "timestamp"),
        ("idx_listening_events_track", "track_id"),
    ],
    unique_constraints: &[],
};

/// v1: events remember the zone/device they were heard on.
const LISTENING_EVENTS_TABLE_V1: Table = Table {
    name: "listening_events",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "track_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&TRACK_FK)
        ),
        sqlite_column!("timestamp", &SqlType::Integer, non_null = true),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!(
            "loved",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("context", &SqlType::Text),
    ],
    indices: &[
        ("idx_listening_events_timestamp", "timestamp"),
        ("idx_listening_events_track", "track_id"),
    ],
    unique_constraints: &[],
};

fn migrate_v0_to_v1(conn: &Connection) -> Result<()> {
    conn.execute("ALTER TABLE listening_events ADD COLUMN context TEXT", [])?;
    Ok(())
}

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 0,
        tables: &[
            ARTISTS_TABLE,
            ARTIST_IMAGES_TABLE,
            ALBUMS_TABLE,
            ALBUM_ARTISTS_TABLE,
            ALBUM_IMAGES_TABLE,
            TRACKS_TABLE,
            LISTENING_EVENTS_TABLE_V0,
        ],
        migration: None,
    },
    VersionedSchema {
        version: 1,
        tables: &[
            ARTISTS_TABLE,
            ARTIST_IMAGES_TABLE,
            ALBUMS_TABLE,
            ALBUM_ARTISTS_TABLE,
            ALBUM_IMAGES_TABLE,
            TRACKS_TABLE,
            LISTENING_EVENTS_TABLE_V1,
        ],
        migration: Some(migrate_v0_to_v1),
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_schema_creates_and_validates() {
        let conn = Connection::open_in_memory().unwrap();
        let latest = CATALOG_VERSIONED_SCHEMAS.last().unwrap();
        latest.create(&conn).unwrap();
        latest.validate(&conn).unwrap();
    }

    #[test]
    fn versions_are_sequential() {
        for (i, schema) in CATALOG_VERSIONED_SCHEMAS.iter().enumerate() {
            assert_eq!(schema.version, i);
        }
    }
}
