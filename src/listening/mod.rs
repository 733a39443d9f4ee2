//! Sample identity, deduplication and artist matching.

mod dedup;
mod identity;
mod matching;

pub use dedup::{DedupDecision, DedupWindow, SharedDedupWindow, DEFAULT_DEDUP_WINDOW_SECS};
pub use identity::{normalize, EventIdentity, RawSample};
pub use matching::{ArtistMatcher, MatchDecision, DEFAULT_SIMILARITY_THRESHOLD};
