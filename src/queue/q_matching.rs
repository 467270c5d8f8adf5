use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::error::MatchmakerError;
use crate::external::{CompatibilityService, SlotService};
use crate::matches::{Match, MatchStore};
use crate::models::UserId;
use crate::queue::manager::QueueManager;
use crate::queue::priority::priority_order;
use crate::queue::types::*;

/// Pairs waiting users in periodic passes.
///
/// A pass claims every eligible waiting entry (`waiting -> processing`),
/// walks them in priority order and pairs each unconsumed entry with the
/// first later entry that is mutually compatible. Anything left unpaired
/// goes back to `waiting`. Passes are serialized by `pass_lock`, and the
/// conditional claim keeps other writers off claimed rows.
pub struct BatchMatcher {
    manager: Arc<QueueManager>,
    matches: Arc<dyn MatchStore>,
    compatibility: Arc<dyn CompatibilityService>,
    slots: Arc<dyn SlotService>,
    config: MatchingConfig,
    pass_lock: tokio::sync::Mutex<()>,
}

impl BatchMatcher {
    pub fn new(
        manager: Arc<QueueManager>,
        matches: Arc<dyn MatchStore>,
        compatibility: Arc<dyn CompatibilityService>,
        slots: Arc<dyn SlotService>,
        config: MatchingConfig,
    ) -> Self {
        Self {
            manager,
            matches,
            compatibility,
            slots,
            config,
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn store(&self) -> &Arc<dyn QueueStore> {
        self.manager.store()
    }

    fn now(&self) -> OffsetDateTime {
        self.manager.clock().now()
    }

    /// Runs one pass and returns the matches it created.
    ///
    /// On failure every entry the pass still holds is put back to `waiting`
    /// and `BatchPassFailure` is returned; matches committed before the
    /// failure stay committed.
    pub async fn process_batch(&self) -> Result<Vec<Match>, MatchmakerError> {
        let _pass = self.pass_lock.lock().await;
        let started = Instant::now();

        let mut claimed: Vec<QueueEntry> = Vec::new();
        let mut matched: HashSet<Uuid> = HashSet::new();

        let outcome = self.run_pass(&mut claimed, &mut matched).await;
        let reverted = self.release_unmatched(&claimed, &matched).await;

        match outcome {
            Ok(created) => {
                log::info!(
                    "Batch pass: claimed {}, matched {} pairs, reverted {} ({:?})",
                    claimed.len(),
                    created.len(),
                    reverted,
                    started.elapsed()
                );
                Ok(created)
            }
            Err(e) => {
                log::error!(
                    "Batch pass failed after matching {} entries, reverted {}: {}",
                    matched.len(),
                    reverted,
                    e
                );
                Err(MatchmakerError::BatchPassFailure(e.to_string()))
            }
        }
    }

    /// Everything a pass does between taking the lock and releasing what
    /// it still holds. `claimed` is filled as claims land, so the caller
    /// can release them whichever step fails.
    async fn run_pass(
        &self,
        claimed: &mut Vec<QueueEntry>,
        matched: &mut HashSet<Uuid>,
    ) -> Result<Vec<Match>, MatchmakerError> {
        self.reclaim_orphans().await?;
        self.manager.refresh_priorities().await?;
        self.claim_candidates(claimed).await?;

        if claimed.len() < 2 {
            return Ok(Vec::new());
        }
        self.pair_claimed(claimed, matched).await
    }

    /// Any `processing` row seen while holding the pass lock was left by a
    /// pass that never finished. Put it back in the pool.
    async fn reclaim_orphans(&self) -> Result<usize, MatchmakerError> {
        let now = self.now();
        let orphans = self.store().list_by_status(EntryStatus::Processing).await?;
        let mut reclaimed = 0;
        for entry in orphans {
            let affected = self
                .store()
                .transition(entry.id, EntryStatus::Processing, EntryStatus::Waiting, now)
                .await?;
            if affected == 1 {
                log::warn!(
                    "Reclaimed entry {} (user {}) stranded in processing",
                    entry.id,
                    entry.user_id
                );
                self.manager.publish(QueueEvent::Reverted {
                    user_id: entry.user_id,
                });
                reclaimed += 1;
            }
        }
        Ok(reclaimed)
    }

    /// Claims unexpired waiting entries in pass order. Entries that change
    /// under us between the read and the claim are skipped.
    async fn claim_candidates(&self, claimed: &mut Vec<QueueEntry>) -> Result<(), MatchmakerError> {
        let now = self.now();
        let mut waiting: Vec<QueueEntry> = self
            .store()
            .list_by_status(EntryStatus::Waiting)
            .await?
            .into_iter()
            .filter(|e| !e.is_expired(now))
            .collect();
        waiting.sort_by(priority_order);
        waiting.truncate(self.config.max_batch_size);

        claimed.reserve(waiting.len());
        for mut entry in waiting {
            let affected = self
                .store()
                .transition(entry.id, EntryStatus::Waiting, EntryStatus::Processing, now)
                .await?;
            if affected == 1 {
                entry.status = EntryStatus::Processing;
                entry.processed_at = Some(now);
                claimed.push(entry);
            } else {
                log::debug!("Entry {} changed before it could be claimed", entry.id);
            }
        }
        Ok(())
    }

    async fn pair_claimed(
        &self,
        claimed: &[QueueEntry],
        matched: &mut HashSet<Uuid>,
    ) -> Result<Vec<Match>, MatchmakerError> {
        let mut created = Vec::new();
        let mut consumed = vec![false; claimed.len()];
        let mut paired_users: HashSet<UserId> = HashSet::new();

        for i in 0..claimed.len() {
            if consumed[i] {
                continue;
            }
            let a = &claimed[i];
            if !self.has_slot(a.user_id).await? {
                log::debug!("User {} has no slot left, skipping this pass", a.user_id);
                continue;
            }

            for j in (i + 1)..claimed.len() {
                if consumed[j] {
                    continue;
                }
                let b = &claimed[j];
                if paired_users.contains(&b.user_id) {
                    continue;
                }
                let Some(score) = self.pair_score(a, b).await? else {
                    continue;
                };

                if let Some(m) = self.commit_pair(a, b, score).await? {
                    consumed[i] = true;
                    consumed[j] = true;
                    matched.insert(a.id);
                    matched.insert(b.id);
                    paired_users.insert(a.user_id);
                    paired_users.insert(b.user_id);
                    created.push(m);
                }
                break;
            }
        }
        Ok(created)
    }

    /// Compatibility score if `a` and `b` may be paired, `None` otherwise.
    async fn pair_score(&self, a: &QueueEntry, b: &QueueEntry) -> Result<Option<u8>, MatchmakerError> {
        if a.user_id == b.user_id {
            return Ok(None);
        }
        if self.matches.has_live_match_between(a.user_id, b.user_id).await? {
            log::debug!("Users {} and {} already share a live match", a.user_id, b.user_id);
            return Ok(None);
        }
        if !self.compatibility.satisfies_preferences(a, b).await? {
            log::debug!("Users {} and {} fail each other's preferences", a.user_id, b.user_id);
            return Ok(None);
        }
        if !self.has_slot(b.user_id).await? {
            return Ok(None);
        }

        let score = self.compatibility.score(a, b).await?;
        if score < self.config.min_compatibility_score {
            log::debug!(
                "Users {} and {} score {} below minimum {}",
                a.user_id,
                b.user_id,
                score,
                self.config.min_compatibility_score
            );
            return Ok(None);
        }
        Ok(Some(score))
    }

    /// Persists the match, then flips both entries to `matched` in one
    /// conditional update. If the flip loses, the match row is deleted and
    /// both entries are left for the release step.
    async fn commit_pair(&self, a: &QueueEntry, b: &QueueEntry, score: u8) -> Result<Option<Match>, MatchmakerError> {
        let now = self.now();
        let candidate = Match {
            id: Uuid::new_v4(),
            user_a: a.user_id,
            user_b: b.user_id,
            compatibility_score: score,
            status: self.config.initial_match_status,
            created_at: now,
            expires_at: now + self.config.match_ttl(),
        };
        let created = self.matches.create_match(candidate).await?;

        let affected = match self.store().mark_pair_matched(a.id, b.id, created.id, now).await {
            Ok(affected) => affected,
            Err(e) => {
                if let Err(cleanup) = self.matches.delete_match(created.id).await {
                    log::error!("Failed to roll back match {}: {}", created.id, cleanup);
                }
                return Err(e);
            }
        };
        if affected != 2 {
            log::warn!(
                "Lost race committing match {} for users {} and {}; rolling back",
                created.id,
                a.user_id,
                b.user_id
            );
            self.matches.delete_match(created.id).await?;
            return Ok(None);
        }

        for user_id in [a.user_id, b.user_id] {
            if !self.slots.consume_slot(user_id).await? {
                log::warn!("User {} matched without a slot to consume", user_id);
            }
        }

        self.manager.publish(QueueEvent::Matched {
            user_id: a.user_id,
            matched_with: b.user_id,
            match_id: created.id,
        });
        self.manager.publish(QueueEvent::Matched {
            user_id: b.user_id,
            matched_with: a.user_id,
            match_id: created.id,
        });

        log::info!(
            "Matched users {} and {} (match {}, compatibility {})",
            a.user_id,
            b.user_id,
            created.id,
            score
        );
        Ok(Some(created))
    }

    /// Puts every claimed, unmatched entry back to `waiting`. Failures are
    /// logged; the next pass reclaims whatever is left.
    async fn release_unmatched(&self, claimed: &[QueueEntry], matched: &HashSet<Uuid>) -> usize {
        let now = self.now();
        let mut reverted = 0;
        for entry in claimed.iter().filter(|e| !matched.contains(&e.id)) {
            match self
                .store()
                .transition(entry.id, EntryStatus::Processing, EntryStatus::Waiting, now)
                .await
            {
                Ok(1) => reverted += 1,
                Ok(_) => log::debug!("Entry {} no longer processing at release", entry.id),
                Err(e) => log::error!("Failed to release entry {}: {}", entry.id, e),
            }
        }
        reverted
    }

    /// Unknown users have no slot.
    async fn has_slot(&self, user_id: UserId) -> Result<bool, MatchmakerError> {
        match self.slots.has_available_slot(user_id).await {
            Ok(available) => Ok(available),
            Err(MatchmakerError::UserNotFound(_)) => {
                log::warn!("User {} is queued but unknown to the slot service", user_id);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
