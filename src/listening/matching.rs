//! Artist-name matching strategies used when deciding whether an existing
//! album with the same title belongs to the artists of a new sample.

use super::identity::normalize;
use tracing::info;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ArtistMatcher {
    /// Names match only when their normalized forms are equal.
    #[default]
    Exact,
    /// Names also match when the normalized Levenshtein similarity of their
    /// normalized forms reaches `threshold` (0.0..=1.0).
    Similarity { threshold: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MatchDecision {
    Identical,
    Merged { similarity: f64 },
    Distinct,
}

impl MatchDecision {
    pub fn is_match(&self) -> bool {
        !matches!(self, MatchDecision::Distinct)
    }
}

impl ArtistMatcher {
    pub fn compare(&self, a: &str, b: &str) -> MatchDecision {
        let (a, b) = (normalize(a), normalize(b));
        if a == b {
            return MatchDecision::Identical;
        }
        match self {
            ArtistMatcher::Exact => MatchDecision::Distinct,
            ArtistMatcher::Similarity { threshold } => {
                let similarity = strsim::normalized_levenshtein(&a, &b);
                if similarity >= *threshold {
                    MatchDecision::Merged { similarity }
                } else {
                    MatchDecision::Distinct
                }
            }
        }
    }

    /// True when both credit lists name the same artists, pairing each name
    /// with at most one name on the other side. Every fuzzy pairing is logged.
    pub fn same_artist_set(&self, existing: &[String], candidate: &[String]) -> bool {
        if existing.len() != candidate.len() {
            return false;
        }
        let mut used = vec![false; existing.len()];
        let mut merges = Vec::new();

        for name in candidate {
            let mut best: Option<(usize, MatchDecision)> = None;
            for (i, other) in existing.iter().enumerate() {
                if used[i] {
                    continue;
                }
                match self.compare(name, other) {
                    MatchDecision::Identical => {
                        best = Some((i, MatchDecision::Identical));
                        break;
                    }
                    MatchDecision::Merged { similarity } => {
                        let better = match best {
                            Some((_, MatchDecision::Merged { similarity: s })) => similarity > s,
                            Some(_) => false,
                            None => true,
                        };
                        if better {
                            best = Some((i, MatchDecision::Merged { similarity }));
                        }
                    }
                    MatchDecision::Distinct => {}
                }
            }
            match best {
                Some((i, decision)) => {
                    used[i] = true;
                    if let MatchDecision::Merged { similarity } = decision {
                        merges.push((name.as_str(), existing[i].as_str(), similarity));
                    }
                }
                None => return false,
            }
        }

        for (candidate_name, existing_name, similarity) in merges {
            info!(
                candidate = candidate_name,
                existing = existing_name,
                similarity,
                "Merging artist name into existing credit"
            );
        }
        true
    }
}
