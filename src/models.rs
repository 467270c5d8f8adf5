//! Data models for the matchmaker service.
//! Defines the value types exchanged with API handlers and collaborators:
//! matching preferences, user profiles and queue/match summaries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::matches::{Match, MatchStatus};
use crate::queue::{EntryStatus, QueueEntry};

/// Identifier of a user account, owned by the (external) user service.
pub type UserId = i64;

/// Geographic location represented by latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees (-90 to 90)
    pub lat: f64,
    /// Longitude in degrees (-180 to 180)
    pub long: f64,
}

/// Inclusive age range a user is willing to be matched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u8,
    pub max: u8,
}

impl AgeRange {
    pub fn contains(&self, age: u8) -> bool {
        (self.min..=self.max).contains(&age)
    }
}

/// Search area: other users must be within `radius_km` of `center`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationPreference {
    pub center: Location,
    pub radius_km: f64,
}

/// What a waiting user is looking for. Every field is optional; an empty
/// preference set accepts everyone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_range: Option<AgeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationPreference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub community: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interests: Vec<String>,
}

impl Preferences {
    pub fn is_empty(&self) -> bool {
        self.age_range.is_none()
            && self.location.is_none()
            && self.community.is_none()
            && self.interests.is_empty()
    }
}

/// Attributes of a user that preferences are checked against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub location: Option<Location>,
    #[serde(default)]
    pub community: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
}

/// A user's view of their place in the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatus {
    pub entry_id: Uuid,
    pub user_id: UserId,
    pub status: EntryStatus,
    pub priority_score: f64,
    /// 1-based rank among waiting entries; absent unless waiting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    /// Estimated seconds until a pass could match this entry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_secs: Option<u64>,
    pub preferences: Preferences,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_with_user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<Uuid>,
}

impl QueueStatus {
    pub fn from_entry(entry: &QueueEntry, position: Option<usize>, estimated_wait_secs: Option<u64>) -> Self {
        Self {
            entry_id: entry.id,
            user_id: entry.user_id,
            status: entry.status,
            priority_score: entry.priority_score,
            position,
            estimated_wait_secs,
            preferences: entry.preferences.clone(),
            created_at: entry.created_at,
            expires_at: entry.expires_at,
            matched_with_user_id: entry.matched_with_user_id,
            match_id: entry.match_id,
        }
    }
}

/// Aggregate view of the queue, for admin endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatistics {
    /// Entries still in the active pool (waiting or processing)
    pub queue_length: usize,
    pub status_counts: BTreeMap<EntryStatus, usize>,
    /// Mean age in seconds of entries in the active pool
    pub avg_wait_secs: f64,
}

/// Compact description of a match created by a batch pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSummary {
    pub match_id: Uuid,
    pub user_a: UserId,
    pub user_b: UserId,
    pub compatibility_score: u8,
    pub status: MatchStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&Match> for MatchSummary {
    fn from(m: &Match) -> Self {
        Self {
            match_id: m.id,
            user_a: m.user_a,
            user_b: m.user_b,
            compatibility_score: m.compatibility_score,
            status: m.status,
            created_at: m.created_at,
        }
    }
}
