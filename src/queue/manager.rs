use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::MatchingConfig;
use crate::error::MatchmakerError;
use crate::external::{Clock, SlotService};
use crate::models::{Preferences, QueueStatistics, QueueStatus, UserId};
use crate::queue::priority::{priority_order, PriorityScorer};
use crate::queue::types::*;

/// Owns queue membership: joins, leaves, preference updates and expiry.
///
/// Every write is a conditional update against the store, so the manager
/// can run alongside a batch pass without a shared lock. An entry the
/// pass has claimed (`processing`) is never modified from here.
pub struct QueueManager {
    store: Arc<dyn QueueStore>,
    slots: Arc<dyn SlotService>,
    clock: Arc<dyn Clock>,
    scorer: Arc<PriorityScorer>,
    config: MatchingConfig,
    event_tx: broadcast::Sender<QueueEvent>,
}

impl QueueManager {
    pub fn new(
        store: Arc<dyn QueueStore>,
        slots: Arc<dyn SlotService>,
        clock: Arc<dyn Clock>,
        scorer: Arc<PriorityScorer>,
        config: MatchingConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            store,
            slots,
            clock,
            scorer,
            config,
            event_tx,
        }
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn publish(&self, event: QueueEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Puts `user_id` in the queue, or refreshes the preferences of their
    /// waiting entry.
    ///
    /// # Errors
    /// - `ValidationError` for malformed preferences
    /// - `AlreadyQueued` if the user's entry is claimed by a running pass,
    ///   or is waiting and re-join updates are disabled
    /// - `UserNotFound` if the slot service does not know the user
    /// - `NoAvailableSlots` if a new entry is needed and the user has no
    ///   slot left; nothing is stored
    ///
    /// Updating a waiting entry does not need a slot.
    pub async fn join(&self, user_id: UserId, preferences: Preferences) -> Result<QueueEntry, MatchmakerError> {
        validate_preferences(&preferences)?;

        let now = self.clock.now();

        if let Some(existing) = self.store.get_by_user(user_id).await? {
            match existing.status {
                EntryStatus::Processing => return Err(MatchmakerError::AlreadyQueued(user_id)),
                EntryStatus::Waiting if !self.config.rejoin_updates_preferences => {
                    return Err(MatchmakerError::AlreadyQueued(user_id));
                }
                EntryStatus::Waiting => {
                    return self.refresh_waiting(existing, preferences, now).await;
                }
                EntryStatus::Matched | EntryStatus::Expired => {
                    log::debug!("Replacing {:?} entry {} for user {}", existing.status, existing.id, user_id);
                }
            }
        }

        if !self.slots.has_available_slot(user_id).await? {
            log::info!("User {} has no available slots, join rejected", user_id);
            return Err(MatchmakerError::NoAvailableSlots(user_id));
        }

        let mut entry = QueueEntry::new(user_id, preferences, now, self.config.queue_ttl());
        entry.priority_score = self.scorer.score(&entry, now);
        self.store.insert(entry.clone()).await?;

        log::info!(
            "User {} joined the queue (entry {}, priority {:.3})",
            user_id,
            entry.id,
            entry.priority_score
        );
        self.publish(QueueEvent::Joined {
            user_id,
            entry_id: entry.id,
        });
        Ok(entry)
    }

    async fn refresh_waiting(
        &self,
        existing: QueueEntry,
        preferences: Preferences,
        now: time::OffsetDateTime,
    ) -> Result<QueueEntry, MatchmakerError> {
        let user_id = existing.user_id;
        let mut updated = existing;
        updated.preferences = preferences;
        updated.priority_score = self.scorer.score(&updated, now);

        let affected = self
            .store
            .update_preferences(
                user_id,
                EntryStatus::Waiting,
                updated.preferences.clone(),
                updated.priority_score,
            )
            .await?;
        if affected == 0 {
            // Claimed or removed since we read it
            log::warn!("Lost race updating preferences for user {}", user_id);
            return Err(MatchmakerError::AlreadyQueued(user_id));
        }

        log::info!("User {} updated preferences while waiting", user_id);
        self.publish(QueueEvent::Updated { user_id });
        Ok(updated)
    }

    /// Changes the preferences of a waiting entry.
    pub async fn update_preferences(
        &self,
        user_id: UserId,
        preferences: Preferences,
    ) -> Result<QueueEntry, MatchmakerError> {
        validate_preferences(&preferences)?;
        let existing = self
            .store
            .get_by_user(user_id)
            .await?
            .filter(|e| e.status == EntryStatus::Waiting)
            .ok_or_else(|| MatchmakerError::NotFound(format!("No waiting queue entry for user {}", user_id)))?;

        let now = self.clock.now();
        self.refresh_waiting(existing, preferences, now)
            .await
            .map_err(|e| match e {
                MatchmakerError::AlreadyQueued(_) => {
                    MatchmakerError::NotFound(format!("No waiting queue entry for user {}", user_id))
                }
                other => other,
            })
    }

    /// Removes the user's waiting entry.
    ///
    /// Returns false when there is nothing to remove. An entry claimed by a
    /// running pass is left alone: the pass decides whether it ends matched
    /// or back in the pool.
    pub async fn leave(&self, user_id: UserId) -> Result<bool, MatchmakerError> {
        let Some(entry) = self.store.get_by_user(user_id).await? else {
            return Ok(false);
        };

        match entry.status {
            EntryStatus::Waiting => {
                let removed = self.store.remove(user_id, EntryStatus::Waiting).await?;
                if removed == 0 {
                    log::info!("User {} entry was claimed before leave completed", user_id);
                    return Ok(false);
                }
                log::info!("User {} left the queue", user_id);
                self.publish(QueueEvent::Left { user_id });
                Ok(true)
            }
            EntryStatus::Processing => {
                log::info!("User {} tried to leave during a batch pass; ignored", user_id);
                Ok(false)
            }
            EntryStatus::Matched | EntryStatus::Expired => Ok(false),
        }
    }

    /// Current entry of the user with position and wait estimate.
    pub async fn status(&self, user_id: UserId) -> Result<QueueStatus, MatchmakerError> {
        let entry = self
            .store
            .get_by_user(user_id)
            .await?
            .ok_or_else(|| MatchmakerError::NotFound(format!("No queue entry for user {}", user_id)))?;

        if entry.status != EntryStatus::Waiting {
            return Ok(QueueStatus::from_entry(&entry, None, None));
        }

        let mut waiting = self.store.list_by_status(EntryStatus::Waiting).await?;
        waiting.sort_by(priority_order);
        let position = waiting
            .iter()
            .position(|e| e.id == entry.id)
            .map(|index| index + 1);

        let estimate = position.map(|p| self.estimate_wait_secs(&entry, p));
        Ok(QueueStatus::from_entry(&entry, position, estimate))
    }

    /// Each pass can pair the two entries at the front, so position `p`
    /// needs about `ceil(p / 2)` passes. Capped at the time left to expiry.
    fn estimate_wait_secs(&self, entry: &QueueEntry, position: usize) -> u64 {
        let passes = position.div_ceil(2) as u64;
        let interval_secs = self.config.batch_interval().as_secs().max(1);
        let remaining = (entry.expires_at - self.clock.now()).whole_seconds().max(0) as u64;
        (passes * interval_secs).min(remaining)
    }

    /// Marks entries past `expires_at` as expired. Returns how many changed.
    pub async fn expire_stale(&self) -> Result<usize, MatchmakerError> {
        let now = self.clock.now();
        let claim_cutoff = now - self.config.claim_timeout();
        let expired = self.store.expire_stale(now, claim_cutoff).await?;

        for entry in &expired {
            self.publish(QueueEvent::Expired {
                user_id: entry.user_id,
            });
        }
        if !expired.is_empty() {
            log::info!("Expired {} stale queue entries", expired.len());
        }
        Ok(expired.len())
    }

    /// Recomputes the priority of every waiting entry.
    pub async fn refresh_priorities(&self) -> Result<usize, MatchmakerError> {
        let now = self.clock.now();
        let waiting = self.store.list_by_status(EntryStatus::Waiting).await?;
        let mut updated = 0;
        for entry in &waiting {
            let score = self.scorer.score(entry, now);
            updated += self.store.set_priority(entry.id, EntryStatus::Waiting, score).await?;
        }
        Ok(updated as usize)
    }

    /// Deletes matched/expired rows past the retention window.
    pub async fn purge_terminal(&self) -> Result<usize, MatchmakerError> {
        let cutoff = self.clock.now() - self.config.terminal_retention();
        let purged = self.store.purge_terminal(cutoff).await?;
        if purged > 0 {
            log::info!("Purged {} finished queue entries", purged);
        }
        Ok(purged)
    }

    pub async fn statistics(&self) -> Result<QueueStatistics, MatchmakerError> {
        let now = self.clock.now();
        let status_counts = self.store.status_counts().await?;

        let mut active = self.store.list_by_status(EntryStatus::Waiting).await?;
        active.extend(self.store.list_by_status(EntryStatus::Processing).await?);

        let avg_wait_secs = if active.is_empty() {
            0.0
        } else {
            active.iter().map(|e| e.waited_secs(now)).sum::<f64>() / active.len() as f64
        };

        Ok(QueueStatistics {
            queue_length: active.len(),
            status_counts,
            avg_wait_secs,
        })
    }
}

fn validate_preferences(prefs: &Preferences) -> Result<(), MatchmakerError> {
    if let Some(range) = &prefs.age_range {
        if range.min > range.max {
            return Err(MatchmakerError::ValidationError(
                "age_range.min must not exceed age_range.max".to_string(),
            ));
        }
    }

    if let Some(area) = &prefs.location {
        let center = &area.center;
        if !(-90.0..=90.0).contains(&center.lat) || !(-180.0..=180.0).contains(&center.long) {
            return Err(MatchmakerError::ValidationError(
                "Invalid location coordinates".to_string(),
            ));
        }
        if !(area.radius_km > 0.0) {
            return Err(MatchmakerError::ValidationError(
                "location.radius_km must be positive".to_string(),
            ));
        }
    }

    if prefs.interests.iter().any(|i| i.trim().is_empty()) {
        return Err(MatchmakerError::ValidationError(
            "interests must not contain blank entries".to_string(),
        ));
    }

    Ok(())
}
