//! Match rows and their persistence.
//!
//! The matcher only ever creates matches. Later transitions (completion,
//! expiry) belong to the chat/task side, which owns the `MatchStore`
//! implementation in production; `MemoryMatchStore` stands in for it here.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::MatchmakerError;
use crate::models::UserId;

/// Lifecycle state of a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Active,
    Completed,
    Expired,
}

impl MatchStatus {
    /// Pending and active matches still occupy the pair.
    pub fn is_live(&self) -> bool {
        matches!(self, MatchStatus::Pending | MatchStatus::Active)
    }
}

/// A persisted pairing of two distinct users.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub user_a: UserId,
    pub user_b: UserId,
    /// 0..=100, computed from preference overlap
    pub compatibility_score: u8,
    pub status: MatchStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Match {
    pub fn involves(&self, user_id: UserId) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    pub fn pairs(&self, a: UserId, b: UserId) -> bool {
        (self.user_a == a && self.user_b == b) || (self.user_a == b && self.user_b == a)
    }
}

/// Persistence interface for matches.
#[async_trait::async_trait]
pub trait MatchStore: Send + Sync + 'static {
    /// Persist a new match. Rejects self-pairs.
    async fn create_match(&self, new_match: Match) -> Result<Match, MatchmakerError>;

    async fn get_match(&self, match_id: Uuid) -> Result<Option<Match>, MatchmakerError>;

    /// Compensation for a pass that could not commit its queue transitions.
    async fn delete_match(&self, match_id: Uuid) -> Result<bool, MatchmakerError>;

    /// True if a pending/active match already pairs these two users.
    async fn has_live_match_between(&self, a: UserId, b: UserId) -> Result<bool, MatchmakerError>;

    /// Let the owner of match lifecycles retire matches past `expires_at`.
    /// Returns the number of matches affected.
    async fn cleanup_expired(&self, now: OffsetDateTime) -> Result<usize, MatchmakerError>;
}

/// In-memory match store shared between clones.
#[derive(Clone, Default)]
pub struct MemoryMatchStore {
    matches: Arc<parking_lot::RwLock<HashMap<Uuid, Match>>>,
}

impl MemoryMatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matches.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All matches involving `user_id`, oldest first.
    pub fn matches_for(&self, user_id: UserId) -> Vec<Match> {
        let mut found: Vec<Match> = self
            .matches
            .read()
            .values()
            .filter(|m| m.involves(user_id))
            .cloned()
            .collect();
        found.sort_by_key(|m| m.created_at);
        found
    }
}

#[async_trait::async_trait]
impl MatchStore for MemoryMatchStore {
    async fn create_match(&self, new_match: Match) -> Result<Match, MatchmakerError> {
        if new_match.user_a == new_match.user_b {
            return Err(MatchmakerError::ValidationError(format!(
                "Cannot match user {} with themselves",
                new_match.user_a
            )));
        }
        let mut matches = self.matches.write();
        if matches.contains_key(&new_match.id) {
            return Err(MatchmakerError::Storage(format!("Match {} already exists", new_match.id)));
        }
        matches.insert(new_match.id, new_match.clone());
        Ok(new_match)
    }

    async fn get_match(&self, match_id: Uuid) -> Result<Option<Match>, MatchmakerError> {
        Ok(self.matches.read().get(&match_id).cloned())
    }

    async fn delete_match(&self, match_id: Uuid) -> Result<bool, MatchmakerError> {
        Ok(self.matches.write().remove(&match_id).is_some())
    }

    async fn has_live_match_between(&self, a: UserId, b: UserId) -> Result<bool, MatchmakerError> {
        Ok(self
            .matches
            .read()
            .values()
            .any(|m| m.status.is_live() && m.pairs(a, b)))
    }

    async fn cleanup_expired(&self, now: OffsetDateTime) -> Result<usize, MatchmakerError> {
        let mut matches = self.matches.write();
        let mut expired = 0;
        for m in matches.values_mut() {
            if m.status.is_live() && m.expires_at <= now {
                m.status = MatchStatus::Expired;
                expired += 1;
            }
        }
        if expired > 0 {
            log::info!("Expired {} stale matches", expired);
        }
        Ok(expired)
    }
}
