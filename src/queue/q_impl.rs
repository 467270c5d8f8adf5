use std::collections::BTreeMap;

use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::MatchmakerError;
use crate::models::{Preferences, UserId};
use crate::queue::q_core::MemoryQueue;
use crate::queue::types::*;

#[async_trait::async_trait]
impl QueueStore for MemoryQueue {
    async fn insert(&self, entry: QueueEntry) -> Result<(), MatchmakerError> {
        let mut table = self.table.write();

        if let Some(existing) = table.entry_for_user(entry.user_id) {
            if existing.status.is_active() {
                return Err(MatchmakerError::AlreadyQueued(entry.user_id));
            }
            let old_id = existing.id;
            table.remove_entry(old_id);
        }

        log::debug!("Inserting queue entry {} for user {}", entry.id, entry.user_id);
        table.by_user.insert(entry.user_id, entry.id);
        table.entries.insert(entry.id, entry);
        Ok(())
    }

    async fn get_by_user(&self, user_id: UserId) -> Result<Option<QueueEntry>, MatchmakerError> {
        Ok(self.table.read().entry_for_user(user_id).cloned())
    }

    async fn list_by_status(&self, status: EntryStatus) -> Result<Vec<QueueEntry>, MatchmakerError> {
        Ok(self
            .table
            .read()
            .entries
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect())
    }

    async fn update_preferences(
        &self,
        user_id: UserId,
        expected: EntryStatus,
        preferences: Preferences,
        priority_score: f64,
    ) -> Result<u64, MatchmakerError> {
        let mut table = self.table.write();
        let Some(entry_id) = table.by_user.get(&user_id).copied() else {
            return Ok(0);
        };
        match table.entries.get_mut(&entry_id) {
            Some(entry) if entry.status == expected => {
                entry.preferences = preferences;
                entry.priority_score = priority_score;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn set_priority(&self, entry_id: Uuid, expected: EntryStatus, score: f64) -> Result<u64, MatchmakerError> {
        let mut table = self.table.write();
        match table.entries.get_mut(&entry_id) {
            Some(entry) if entry.status == expected => {
                entry.priority_score = score;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn transition(
        &self,
        entry_id: Uuid,
        from: EntryStatus,
        to: EntryStatus,
        at: OffsetDateTime,
    ) -> Result<u64, MatchmakerError> {
        if to == EntryStatus::Matched {
            return Err(MatchmakerError::Storage(
                "matched entries need a partner; use mark_pair_matched".to_string(),
            ));
        }
        let mut table = self.table.write();
        match table.entries.get_mut(&entry_id) {
            Some(entry) if entry.status == from => {
                entry.status = to;
                if to != EntryStatus::Waiting {
                    entry.processed_at = Some(at);
                }
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn mark_pair_matched(
        &self,
        a: Uuid,
        b: Uuid,
        match_id: Uuid,
        at: OffsetDateTime,
    ) -> Result<u64, MatchmakerError> {
        if a == b {
            return Ok(0);
        }
        let mut table = self.table.write();
        let (user_a, user_b) = match (table.entries.get(&a), table.entries.get(&b)) {
            (Some(ea), Some(eb))
                if ea.status == EntryStatus::Processing && eb.status == EntryStatus::Processing =>
            {
                (ea.user_id, eb.user_id)
            }
            _ => return Ok(0),
        };

        for (id, partner) in [(a, user_b), (b, user_a)] {
            if let Some(entry) = table.entries.get_mut(&id) {
                entry.status = EntryStatus::Matched;
                entry.matched_with_user_id = Some(partner);
                entry.match_id = Some(match_id);
                entry.processed_at = Some(at);
            }
        }
        Ok(2)
    }

    async fn remove(&self, user_id: UserId, expected: EntryStatus) -> Result<u64, MatchmakerError> {
        let mut table = self.table.write();
        let entry_id = match table.entry_for_user(user_id) {
            Some(entry) if entry.status == expected => entry.id,
            _ => return Ok(0),
        };
        table.remove_entry(entry_id);
        Ok(1)
    }

    async fn expire_stale(
        &self,
        now: OffsetDateTime,
        claim_cutoff: OffsetDateTime,
    ) -> Result<Vec<QueueEntry>, MatchmakerError> {
        let mut table = self.table.write();
        let mut expired = Vec::new();
        for entry in table.entries.values_mut() {
            if !entry.is_expired(now) {
                continue;
            }
            let stale = match entry.status {
                EntryStatus::Waiting => true,
                // A fresh claim belongs to a running pass.
                EntryStatus::Processing => entry.processed_at.map_or(true, |t| t <= claim_cutoff),
                EntryStatus::Matched | EntryStatus::Expired => false,
            };
            if stale {
                entry.status = EntryStatus::Expired;
                entry.processed_at = Some(now);
                expired.push(entry.clone());
            }
        }
        Ok(expired)
    }

    async fn purge_terminal(&self, older_than: OffsetDateTime) -> Result<usize, MatchmakerError> {
        let mut table = self.table.write();
        let doomed: Vec<Uuid> = table
            .entries
            .values()
            .filter(|e| e.status.is_terminal())
            .filter(|e| e.processed_at.unwrap_or(e.expires_at) < older_than)
            .map(|e| e.id)
            .collect();
        for id in &doomed {
            table.remove_entry(*id);
        }
        Ok(doomed.len())
    }

    async fn status_counts(&self) -> Result<BTreeMap<EntryStatus, usize>, MatchmakerError> {
        let table = self.table.read();
        let mut counts = BTreeMap::new();
        for entry in table.entries.values() {
            *counts.entry(entry.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}
