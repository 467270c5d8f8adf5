use std::collections::HashMap;
use std::sync::Arc;

use crate::error::MatchmakerError;
use crate::models::{UserId, UserProfile};
use crate::queue::{matching, QueueEntry};

/// Read access to user profiles.
#[async_trait::async_trait]
pub trait ProfileDirectory: Send + Sync + 'static {
    async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>, MatchmakerError>;
}

/// Pairwise compatibility, consulted by the batch matcher.
#[async_trait::async_trait]
pub trait CompatibilityService: Send + Sync + 'static {
    /// Compatibility of the two queued users, 0..=100.
    async fn score(&self, a: &QueueEntry, b: &QueueEntry) -> Result<u8, MatchmakerError>;

    /// True when each side meets the other's stated preferences.
    async fn satisfies_preferences(&self, a: &QueueEntry, b: &QueueEntry) -> Result<bool, MatchmakerError>;
}

/// In-memory profile directory.
#[derive(Clone, Default)]
pub struct MemoryProfiles {
    profiles: Arc<parking_lot::RwLock<HashMap<UserId, UserProfile>>>,
}

impl MemoryProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, profile: UserProfile) {
        self.profiles.write().insert(profile.user_id, profile);
    }
}

#[async_trait::async_trait]
impl ProfileDirectory for MemoryProfiles {
    async fn profile(&self, user_id: UserId) -> Result<Option<UserProfile>, MatchmakerError> {
        Ok(self.profiles.read().get(&user_id).cloned())
    }
}

/// Compatibility computed from profile attributes and queue preferences.
pub struct ProfileCompatibility {
    directory: Arc<dyn ProfileDirectory>,
}

impl ProfileCompatibility {
    pub fn new(directory: Arc<dyn ProfileDirectory>) -> Self {
        Self { directory }
    }

    async fn load(&self, user_id: UserId) -> Result<UserProfile, MatchmakerError> {
        self.directory
            .profile(user_id)
            .await?
            .ok_or(MatchmakerError::UserNotFound(user_id))
    }
}

#[async_trait::async_trait]
impl CompatibilityService for ProfileCompatibility {
    async fn score(&self, a: &QueueEntry, b: &QueueEntry) -> Result<u8, MatchmakerError> {
        let profile_a = self.load(a.user_id).await?;
        let profile_b = self.load(b.user_id).await?;
        Ok(matching::compatibility_score(
            &a.preferences,
            &profile_a,
            &b.preferences,
            &profile_b,
        ))
    }

    async fn satisfies_preferences(&self, a: &QueueEntry, b: &QueueEntry) -> Result<bool, MatchmakerError> {
        // A missing profile counts as a mismatch.
        let (profile_a, profile_b) = match (
            self.directory.profile(a.user_id).await?,
            self.directory.profile(b.user_id).await?,
        ) {
            (Some(pa), Some(pb)) => (pa, pb),
            _ => {
                log::debug!("Missing profile for {} or {}", a.user_id, b.user_id);
                return Ok(false);
            }
        };
        Ok(matching::mutually_compatible(
            &a.preferences,
            &profile_a,
            &b.preferences,
            &profile_b,
        ))
    }
}
