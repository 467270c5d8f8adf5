use std::collections::HashMap;
use std::sync::Arc;

use crate::error::MatchmakerError;
use crate::models::UserId;

/// Per-user match allowance, owned by the user/reward side of the backend.
#[async_trait::async_trait]
pub trait SlotService: Send + Sync + 'static {
    /// Fails with `UserNotFound` for unknown users.
    async fn has_available_slot(&self, user_id: UserId) -> Result<bool, MatchmakerError>;

    /// Takes one slot. Returns false if none was left.
    async fn consume_slot(&self, user_id: UserId) -> Result<bool, MatchmakerError>;

    /// Restores every user to their daily allowance. Returns users touched.
    async fn reset_slots(&self) -> Result<usize, MatchmakerError>;
}

#[derive(Debug, Clone, Copy)]
struct SlotAccount {
    available: u32,
    daily_limit: u32,
}

/// In-memory slot accounts.
#[derive(Clone)]
pub struct MemorySlots {
    accounts: Arc<parking_lot::RwLock<HashMap<UserId, SlotAccount>>>,
    default_daily_slots: u32,
}

impl MemorySlots {
    pub fn new(default_daily_slots: u32) -> Self {
        Self {
            accounts: Arc::new(parking_lot::RwLock::new(HashMap::new())),
            default_daily_slots,
        }
    }

    /// Registers a user with the default daily allowance.
    pub fn register(&self, user_id: UserId) {
        self.register_with(user_id, self.default_daily_slots);
    }

    pub fn register_with(&self, user_id: UserId, daily_limit: u32) {
        self.accounts.write().insert(
            user_id,
            SlotAccount {
                available: daily_limit,
                daily_limit,
            },
        );
    }

    /// Overrides the remaining slots without touching the daily limit.
    pub fn set_available(&self, user_id: UserId, available: u32) -> Result<(), MatchmakerError> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&user_id)
            .ok_or(MatchmakerError::UserNotFound(user_id))?;
        account.available = available;
        Ok(())
    }

    pub fn available(&self, user_id: UserId) -> Option<u32> {
        self.accounts.read().get(&user_id).map(|a| a.available)
    }
}

#[async_trait::async_trait]
impl SlotService for MemorySlots {
    async fn has_available_slot(&self, user_id: UserId) -> Result<bool, MatchmakerError> {
        self.accounts
            .read()
            .get(&user_id)
            .map(|a| a.available > 0)
            .ok_or(MatchmakerError::UserNotFound(user_id))
    }

    async fn consume_slot(&self, user_id: UserId) -> Result<bool, MatchmakerError> {
        let mut accounts = self.accounts.write();
        let account = accounts
            .get_mut(&user_id)
            .ok_or(MatchmakerError::UserNotFound(user_id))?;
        if account.available == 0 {
            return Ok(false);
        }
        account.available -= 1;
        Ok(true)
    }

    async fn reset_slots(&self) -> Result<usize, MatchmakerError> {
        let mut accounts = self.accounts.write();
        for account in accounts.values_mut() {
            account.available = account.daily_limit;
        }
        Ok(accounts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consume_until_empty_then_reset() {
        let slots = MemorySlots::new(1);
        slots.register(1);

        assert!(slots.has_available_slot(1).await.unwrap());
        assert!(slots.consume_slot(1).await.unwrap());
        assert!(!slots.consume_slot(1).await.unwrap());
        assert!(!slots.has_available_slot(1).await.unwrap());

        assert_eq!(slots.reset_slots().await.unwrap(), 1);
        assert_eq!(slots.available(1), Some(1));
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let slots = MemorySlots::new(3);
        let result = slots.has_available_slot(42).await;
        assert!(matches!(result, Err(MatchmakerError::UserNotFound(42))));
    }
}
