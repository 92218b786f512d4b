//! Confidence scoring for codes found in community posts.

use chrono::{DateTime, Utc};

const BASE: f64 = 0.5;
const FLOOR: f64 = 0.1;
const CEILING: f64 = 1.0;

/// Title cues and their weights, English and Swedish.
const CUES: &[(&str, f64)] = &[
    ("working", 0.1),
    ("fungerar", 0.1),
    ("verified", 0.1),
    ("verifierad", 0.1),
    ("expired", -0.3),
    ("utgången", -0.3),
];

/// The parts of a community post that feed the score.
#[derive(Debug, Clone)]
pub struct PostSignals<'a> {
    pub title: &'a str,
    /// Upvotes or similar popularity count, if the source reports one.
    pub popularity: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Scores a post in `[0.1, 1.0]`.
///
/// Starts at 0.5. Popularity above 100 adds 0.2, above 20 adds 0.1. Posts
/// younger than 7 days add 0.2, younger than 30 days add 0.1, older than 90
/// days lose 0.2. Each cue word in the title adds its weight once.
#[must_use]
pub fn community_confidence(post: &PostSignals<'_>, now: DateTime<Utc>) -> f64 {
    let mut confidence = BASE;

    match post.popularity {
        Some(score) if score > 100 => confidence += 0.2,
        Some(score) if score > 20 => confidence += 0.1,
        _ => {}
    }

    if let Some(created_at) = post.created_at {
        let age_days = (now - created_at).num_days();
        if age_days < 7 {
            confidence += 0.2;
        } else if age_days < 30 {
            confidence += 0.1;
        }
        if age_days > 90 {
            confidence -= 0.2;
        }
    }

    let title = post.title.to_lowercase();
    for &(cue, weight) in CUES {
        if title.contains(cue) {
            confidence += weight;
        }
    }

    confidence.clamp(FLOOR, CEILING)
}
