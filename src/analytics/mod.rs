//! Offline analysis of listening history: sessions, artist co-occurrence
//! and session-based playlists.

mod correlation;
mod playlist;
mod sessions;

pub use correlation::{correlate_artists, ArtistPair};
pub use playlist::{session_playlist, PlaylistEntry};
pub use sessions::{
    segment_sessions, session_stats, Session, SessionStats, Timed, DEFAULT_SESSION_GAP,
};
