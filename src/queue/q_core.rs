use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::models::UserId;
use crate::queue::types::*;

/// Rows plus the unique-per-user index, guarded together.
#[derive(Default)]
pub(super) struct QueueTable {
    pub(super) entries: HashMap<Uuid, QueueEntry>,
    pub(super) by_user: HashMap<UserId, Uuid>,
}

impl QueueTable {
    pub(super) fn entry_for_user(&self, user_id: UserId) -> Option<&QueueEntry> {
        self.by_user.get(&user_id).and_then(|id| self.entries.get(id))
    }

    pub(super) fn remove_entry(&mut self, entry_id: Uuid) -> Option<QueueEntry> {
        let entry = self.entries.remove(&entry_id)?;
        if self.by_user.get(&entry.user_id) == Some(&entry_id) {
            self.by_user.remove(&entry.user_id);
        }
        Some(entry)
    }
}

/// In-memory implementation of `QueueStore`.
///
/// - Thread-safe: one `parking_lot::RwLock` over the table, shared between clones
/// - Every conditional update checks the expected status under the write lock,
///   so two callers racing on the same row see exactly one winner
/// - Unique per user through the `by_user` index
#[derive(Clone, Default)]
pub struct MemoryQueue {
    pub(super) table: Arc<parking_lot::RwLock<QueueTable>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows of any status.
    pub fn len(&self) -> usize {
        self.table.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts a row as-is, bypassing the active-row check. Used to seed
    /// rows in states a live queue only reaches through failures.
    pub fn force_insert(&self, entry: QueueEntry) {
        let mut table = self.table.write();
        if let Some(old) = table.by_user.insert(entry.user_id, entry.id) {
            table.entries.remove(&old);
        }
        table.entries.insert(entry.id, entry);
    }
}
