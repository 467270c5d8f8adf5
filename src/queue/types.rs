use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::MatchmakerError;
use crate::models::{Preferences, UserId};

/// Represents the state of an entry in the matching process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// In the pool and available to the next batch pass
    Waiting,
    /// Claimed by a batch pass that has not finished yet
    Processing,
    /// Paired; `matched_with_user_id` and `match_id` are set
    Matched,
    /// Left the pool unmatched after `expires_at`
    Expired,
}

impl EntryStatus {
    /// Waiting and processing entries are still in the active pool.
    pub fn is_active(&self) -> bool {
        matches!(self, EntryStatus::Waiting | EntryStatus::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// A user's place in the matching queue. At most one row per user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub status: EntryStatus,
    /// 0.0..=1.0, recomputed before every pass
    pub priority_score: f64,
    pub preferences: Preferences,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last claim or match time
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub matched_with_user_id: Option<UserId>,
    pub match_id: Option<Uuid>,
}

impl QueueEntry {
    /// Creates a waiting entry that expires `ttl` after `created_at`.
    pub fn new(user_id: UserId, preferences: Preferences, created_at: OffsetDateTime, ttl: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            status: EntryStatus::Waiting,
            priority_score: 0.0,
            preferences,
            created_at,
            processed_at: None,
            expires_at: created_at + ttl,
            matched_with_user_id: None,
            match_id: None,
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }

    /// Seconds spent in the queue so far, never negative.
    pub fn waited_secs(&self, now: OffsetDateTime) -> f64 {
        (now - self.created_at).as_seconds_f64().max(0.0)
    }
}

/// Event emitted when the queue state changes.
/// Broadcast to subscribers such as the notification service.
#[derive(Clone, Debug, PartialEq)]
pub enum QueueEvent {
    Joined { user_id: UserId, entry_id: Uuid },
    Updated { user_id: UserId },
    Left { user_id: UserId },
    Matched { user_id: UserId, matched_with: UserId, match_id: Uuid },
    Expired { user_id: UserId },
    /// An entry stranded in `processing` was put back in the pool
    Reverted { user_id: UserId },
}

/// Storage for queue entries.
///
/// Every status change is a conditional update on the expected prior
/// status; the returned count is the number of rows that changed, and 0
/// means the caller lost a race and should treat the change as not made.
#[async_trait::async_trait]
pub trait QueueStore: Send + Sync + 'static {
    /// Insert a new entry. Replaces a terminal row for the same user;
    /// fails with `AlreadyQueued` if the user has an active row.
    async fn insert(&self, entry: QueueEntry) -> Result<(), MatchmakerError>;

    async fn get_by_user(&self, user_id: UserId) -> Result<Option<QueueEntry>, MatchmakerError>;

    async fn list_by_status(&self, status: EntryStatus) -> Result<Vec<QueueEntry>, MatchmakerError>;

    async fn update_preferences(
        &self,
        user_id: UserId,
        expected: EntryStatus,
        preferences: Preferences,
        priority_score: f64,
    ) -> Result<u64, MatchmakerError>;

    async fn set_priority(&self, entry_id: Uuid, expected: EntryStatus, score: f64) -> Result<u64, MatchmakerError>;

    /// `from -> to` on one entry. Stamps `processed_at` when moving to processing.
    async fn transition(
        &self,
        entry_id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
        at: OffsetDateTime,
    ) -> Result<u64, MatchmakerError>;

    /// Moves both entries from processing to matched with cross references,
    /// or neither. Returns 2 on success, 0 otherwise.
    async fn mark_pair_matched(
        &self,
        a: Uuid,
        b: Uuid,
        match_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<u64, MatchmakerError>;

    async fn remove(&self, user_id: UserId, expected: EntryStatus) -> Result<u64, MatchmakerError>;

    /// Expires waiting entries past `expires_at`, and processing entries past
    /// `expires_at` whose claim is no newer than `claim_cutoff`.
    async fn expire_stale(
        &self,
        now: OffsetDateTime,
        claim_cutoff: OffsetDateTime,
    ) -> Result<Vec<QueueEntry>, MatchmakerError>;

    /// Deletes terminal rows last touched before `older_than`.
    async fn purge_terminal(&self, older_than: OffsetDateTime) -> Result<usize, MatchmakerError>;

    async fn status_counts(&self) -> Result<BTreeMap<EntryStatus, usize>, MatchmakerError>;
}
