use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::MatchingConfig;
use crate::error::MatchmakerError;
use crate::external::{Clock, CompatibilityService, SlotService};
use crate::matches::{Match, MatchStore};
use crate::models::{MatchSummary, Preferences, QueueStatistics, QueueStatus, UserId};
use crate::queue::{
    BatchMatcher, FlatSignals, PriorityScorer, QueueEvent, QueueManager, QueueStore, SignalProvider,
};
use crate::scheduler::ScheduledJobs;

/// Everything the matchmaker needs from the rest of the backend.
#[derive(Clone)]
pub struct Collaborators {
    pub queue: Arc<dyn QueueStore>,
    pub matches: Arc<dyn MatchStore>,
    pub slots: Arc<dyn SlotService>,
    pub compatibility: Arc<dyn CompatibilityService>,
    pub clock: Arc<dyn Clock>,
    /// Activity/compatibility priority signals. `None` uses flat defaults
    /// from the configuration.
    pub signals: Option<Arc<dyn SignalProvider>>,
}

/// Entry point for API handlers and the background scheduler.
#[derive(Clone)]
pub struct MatchmakingService {
    manager: Arc<QueueManager>,
    matcher: Arc<BatchMatcher>,
    matches: Arc<dyn MatchStore>,
    slots: Arc<dyn SlotService>,
    config: MatchingConfig,
}

impl MatchmakingService {
    pub fn new(config: Option<MatchingConfig>, deps: Collaborators) -> Self {
        let config = config.unwrap_or_default();

        let signals = deps.signals.unwrap_or_else(|| {
            Arc::new(FlatSignals {
                activity: config.default_activity_score,
                compatibility: config.default_compatibility_score,
            })
        });
        let scorer = Arc::new(PriorityScorer::new(config.priority_weights(), signals));

        let manager = Arc::new(QueueManager::new(
            deps.queue,
            deps.slots.clone(),
            deps.clock,
            scorer,
            config.clone(),
        ));
        let matcher = Arc::new(BatchMatcher::new(
            manager.clone(),
            deps.matches.clone(),
            deps.compatibility,
            deps.slots.clone(),
            config.clone(),
        ));

        Self {
            manager,
            matcher,
            matches: deps.matches,
            slots: deps.slots,
            config,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Queue events for notification delivery.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.manager.subscribe()
    }

    pub async fn join_queue(&self, user_id: UserId, preferences: Preferences) -> Result<QueueStatus, MatchmakerError> {
        self.manager.join(user_id, preferences).await?;
        self.manager.status(user_id).await
    }

    pub async fn leave_queue(&self, user_id: UserId) -> Result<bool, MatchmakerError> {
        self.manager.leave(user_id).await
    }

    pub async fn get_queue_status(&self, user_id: UserId) -> Result<QueueStatus, MatchmakerError> {
        self.manager.status(user_id).await
    }

    pub async fn update_preferences(
        &self,
        user_id: UserId,
        preferences: Preferences,
    ) -> Result<QueueStatus, MatchmakerError> {
        self.manager.update_preferences(user_id, preferences).await?;
        self.manager.status(user_id).await
    }

    pub async fn get_queue_statistics(&self) -> Result<QueueStatistics, MatchmakerError> {
        self.manager.statistics().await
    }

    /// Runs a batch pass now. Waits for a scheduled pass in progress to
    /// finish first.
    pub async fn trigger_batch(&self) -> Result<Vec<MatchSummary>, MatchmakerError> {
        let created = self.matcher.process_batch().await?;
        Ok(created.iter().map(MatchSummary::from).collect())
    }

    pub async fn expire_stale(&self) -> Result<usize, MatchmakerError> {
        self.manager.expire_stale().await
    }

    pub async fn get_match(&self, match_id: Uuid) -> Result<Match, MatchmakerError> {
        self.matches
            .get_match(match_id)
            .await?
            .ok_or_else(|| MatchmakerError::NotFound(format!("Match {} not found", match_id)))
    }
}

#[async_trait::async_trait]
impl ScheduledJobs for MatchmakingService {
    async fn run_batch(&self) -> Result<usize, MatchmakerError> {
        Ok(self.matcher.process_batch().await?.len())
    }

    async fn expire_stale(&self) -> Result<usize, MatchmakerError> {
        self.manager.expire_stale().await
    }

    /// Purges finished queue rows and lets the match store retire
    /// expired matches.
    async fn run_maintenance(&self) -> Result<(), MatchmakerError> {
        self.manager.purge_terminal().await?;
        let now = self.manager.clock().now();
        self.matches.cleanup_expired(now).await?;
        Ok(())
    }

    async fn run_daily_maintenance(&self) -> Result<(), MatchmakerError> {
        let reset = self.slots.reset_slots().await?;
        log::info!("Reset match slots for {} users", reset);
        Ok(())
    }
}
