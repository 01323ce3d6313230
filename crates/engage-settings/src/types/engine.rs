//! Settings consumed by the three engines.

use serde::{Deserialize, Serialize};

/// Reputation weight per vote kind.
///
/// `vote` is earned for every normal vote a user casts on someone else's post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReputationWeights {
    pub vote: i64,
    pub downvote: i64,
    pub upvote: i64,
    pub solved: i64,
    pub helpful: i64,
}

impl Default for ReputationWeights {
    fn default() -> Self {
        Self {
            vote: 1,
            downvote: -5,
            upvote: 5,
            solved: 30,
            helpful: 15,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RatingSettings {
    /// Whether users may change or remove a vote they already cast.
    pub allow_rating_change: bool,
    /// Seconds after the first vote during which it may still be changed.
    /// Also the delay before a new post becomes eligible for mailing.
    pub max_editing_time_secs: i64,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            allow_rating_change: true,
            max_editing_time_secs: 3600,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadTrackingSettings {
    /// Global switch. When off nothing is trackable.
    pub enabled: bool,
    /// Whether containers with forced tracking count as tracked.
    pub allow_forced: bool,
    /// Posts not modified for this many days are considered read.
    /// `0` disables pruning.
    pub old_post_days: i64,
    /// Hour of the day (0-23) the prune job is scheduled for.
    pub clean_read_hour: u8,
}

impl Default for ReadTrackingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allow_forced: false,
            old_post_days: 14,
            clean_read_hour: 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MailSettings {
    /// Posts older than this many hours are never mailed.
    pub max_mailing_time_hours: i64,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            max_mailing_time_hours: 48,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
