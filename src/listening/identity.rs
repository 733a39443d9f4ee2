use serde::Serialize;
use std::fmt;

/// One "what is playing now" observation reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawSample {
    pub source_id: String,
    pub artist_name: String,
    pub track_title: String,
    pub album_title: String,
    /// Playback zone or device, when the source knows it.
    pub zone: Option<String>,
    pub duration_secs: Option<u32>,
}

impl RawSample {
    pub fn new(
        source_id: impl Into<String>,
        artist_name: impl Into<String>,
        track_title: impl Into<String>,
        album_title: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            artist_name: artist_name.into(),
            track_title: track_title.into(),
            album_title: album_title.into(),
            zone: None,
            duration_secs: None,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_duration(mut self, duration_secs: u32) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }

    pub fn identity(&self) -> EventIdentity {
        EventIdentity {
            artist: normalize(&self.artist_name),
            title: normalize(&self.track_title),
            album: normalize(&self.album_title),
        }
    }

    /// A sample is usable only when artist and title survive normalization.
    /// The album may be missing for singles.
    pub fn is_complete(&self) -> bool {
        !normalize(&self.artist_name).is_empty() && !normalize(&self.track_title).is_empty()
    }

    /// Individual credited artists. Bridges join multiple artists with " / "
    /// and scrobblers sometimes with ";".
    pub fn artist_names(&self) -> Vec<String> {
        let names: Vec<String> = self
            .artist_name
            .split(" / ")
            .flat_map(|part| part.split(';'))
            .map(|part| part.trim().to_string())
            .filter(|part| !normalize(part).is_empty())
            .collect();
        if names.is_empty() {
            vec![self.artist_name.trim().to_string()]
        } else {
            names
        }
    }
}

/// Normalized (artist, title, album) triple naming one real-world playback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct EventIdentity {
    pub artist: String,
    pub title: String,
    pub album: String,
}

impl fmt::Display for EventIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {} [{}]", self.artist, self.title, self.album)
    }
}

/// Lowercases, spells out `&`, and collapses every run of non-alphanumeric
/// characters into a single space.
pub fn normalize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_space = false;
    for c in s.chars() {
        if c == '&' {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str("and");
            pending_space = true;
        } else if c.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(c.to_lowercase());
        } else {
            pending_space = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_case_and_punctuation() {
        assert_eq!(normalize("  Pink   Floyd "), "pink floyd");
        assert_eq!(normalize("AC/DC"), "ac dc");
        assert_eq!(normalize("Simon & Garfunkel"), "simon and garfunkel");
        assert_eq!(normalize("Simon&Garfunkel"), "simon and garfunkel");
        assert_eq!(normalize("Björk"), "björk");
        assert_eq!(
            normalize("Shine On You Crazy Diamond (Pts. 1-5)"),
            "shine on you crazy diamond pts 1 5"
        );
        assert_eq!(normalize("!!!"), "");
    }

    #[test]
    fn identity_ignores_source_and_formatting() {
        let a = RawSample::new("bridge", "Pink Floyd", "Time", "The Dark Side of the Moon");
        let b = RawSample::new("scrobble", "pink floyd", "TIME", "The Dark Side Of The Moon")
            .with_zone("Living Room");
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn artist_names_split_on_bridge_separators() {
        let sample = RawSample::new("bridge", "David Bowie / Queen", "Under Pressure", "Hot Space");
        assert_eq!(sample.artist_names(), vec!["David Bowie", "Queen"]);

        let sample = RawSample::new("scrobble", "Simon & Garfunkel", "America", "Bookends");
        assert_eq!(sample.artist_names(), vec!["Simon & Garfunkel"]);
    }

    #[test]
    fn incomplete_samples_are_detected() {
        assert!(!RawSample::new("s", " ", "Title", "Album").is_complete());
        assert!(!RawSample::new("s", "Artist", "--", "Album").is_complete());
        assert!(RawSample::new("s", "Artist", "Title", "").is_complete());
    }
}
