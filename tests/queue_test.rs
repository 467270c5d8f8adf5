mod common;

use common::*;
use matchmaker::matches::MatchStatus;
use matchmaker::models::{AgeRange, Preferences};
use matchmaker::queue::{EntryStatus, QueueEvent, QueueStore};
use matchmaker::{MatchingConfig, MatchmakerError};
use serial_test::serial;
use std::time::Duration as StdDuration;

#[tokio::test]
async fn test_join_creates_waiting_entry() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));

    let status = h.service.join_queue(1, Preferences::default()).await.unwrap();

    assert_eq!(status.user_id, 1);
    assert_eq!(status.status, EntryStatus::Waiting);
    assert_eq!(status.position, Some(1));
    assert_eq!(status.created_at, t0());
    assert_eq!(status.expires_at, t0() + time::Duration::hours(1));
    // Fresh entry: no wait yet, flat 0.5 signals
    assert!((status.priority_score - 0.3).abs() < 1e-9);
}

#[tokio::test]
async fn test_join_without_slots_persists_nothing() {
    let h = Harness::new();
    h.add_user(profile(3, 30, "hiking", &[]));
    h.slots.set_available(3, 0).unwrap();

    let result = h.service.join_queue(3, Preferences::default()).await;

    assert!(matches!(result, Err(MatchmakerError::NoAvailableSlots(3))));
    assert!(h.queue.get_by_user(3).await.unwrap().is_none());
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn test_join_unknown_user() {
    let h = Harness::new();
    let result = h.service.join_queue(99, Preferences::default()).await;
    assert!(matches!(result, Err(MatchmakerError::UserNotFound(99))));
}

#[tokio::test]
async fn test_join_rejects_bad_preferences() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));

    let prefs = Preferences {
        age_range: Some(AgeRange { min: 40, max: 20 }),
        ..Default::default()
    };
    let result = h.service.join_queue(1, prefs).await;

    assert!(matches!(result, Err(MatchmakerError::ValidationError(_))));
    assert!(h.queue.is_empty());
}

#[tokio::test]
async fn test_rejoin_while_waiting_updates_preferences() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));

    let first = h.service.join_queue(1, Preferences::default()).await.unwrap();
    h.advance_secs(60);
    let second = h.service.join_queue(1, community_prefs("hiking")).await.unwrap();

    assert_eq!(first.entry_id, second.entry_id);
    assert_eq!(second.preferences.community.as_deref(), Some("hiking"));
    // Creation time is kept, so the wait keeps counting
    assert_eq!(second.created_at, t0());
    assert!(second.priority_score > first.priority_score);
    assert_eq!(h.queue.len(), 1);
}

#[tokio::test]
async fn test_rejoin_rejected_when_upsert_disabled() {
    let h = Harness::with_config(MatchingConfig {
        rejoin_updates_preferences: false,
        ..Default::default()
    });
    h.add_user(profile(1, 30, "hiking", &[]));

    h.service.join_queue(1, Preferences::default()).await.unwrap();
    let result = h.service.join_queue(1, Preferences::default()).await;

    assert!(matches!(result, Err(MatchmakerError::AlreadyQueued(1))));
}

#[tokio::test]
async fn test_join_while_processing_is_already_queued() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));
    let status = h.service.join_queue(1, Preferences::default()).await.unwrap();

    // Simulate a pass holding the claim
    h.queue
        .transition(status.entry_id, EntryStatus::Waiting, EntryStatus::Processing, t0())
        .await
        .unwrap();

    let result = h.service.join_queue(1, Preferences::default()).await;
    assert!(matches!(result, Err(MatchmakerError::AlreadyQueued(1))));
}

#[tokio::test]
async fn test_rejoin_while_waiting_needs_no_slot() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));
    let first = h.service.join_queue(1, Preferences::default()).await.unwrap();

    // Last slot spent on a match made elsewhere
    h.slots.set_available(1, 0).unwrap();

    let second = h.service.join_queue(1, community_prefs("hiking")).await.unwrap();
    assert_eq!(second.entry_id, first.entry_id);
    assert_eq!(second.preferences, community_prefs("hiking"));
}

#[tokio::test]
async fn test_join_while_processing_without_slots_is_already_queued() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));
    let status = h.service.join_queue(1, Preferences::default()).await.unwrap();
    h.queue
        .transition(status.entry_id, EntryStatus::Waiting, EntryStatus::Processing, t0())
        .await
        .unwrap();
    h.slots.set_available(1, 0).unwrap();

    let result = h.service.join_queue(1, Preferences::default()).await;
    assert!(matches!(result, Err(MatchmakerError::AlreadyQueued(1))));
}

#[tokio::test]
async fn test_rejoin_after_expiry_creates_new_entry() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));
    let first = h.service.join_queue(1, Preferences::default()).await.unwrap();

    h.advance_secs(3601);
    assert_eq!(h.service.expire_stale().await.unwrap(), 1);

    let second = h.service.join_queue(1, Preferences::default()).await.unwrap();
    assert_ne!(first.entry_id, second.entry_id);
    assert_eq!(second.status, EntryStatus::Waiting);
    assert_eq!(h.queue.len(), 1);
}

#[tokio::test]
async fn test_leave_is_idempotent() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));
    h.service.join_queue(1, Preferences::default()).await.unwrap();

    assert!(h.service.leave_queue(1).await.unwrap());
    assert!(!h.service.leave_queue(1).await.unwrap());
    assert!(h.queue.get_by_user(1).await.unwrap().is_none());
}

#[tokio::test]
async fn test_leave_during_pass_is_a_no_op() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));
    let status = h.service.join_queue(1, Preferences::default()).await.unwrap();
    h.queue
        .transition(status.entry_id, EntryStatus::Waiting, EntryStatus::Processing, t0())
        .await
        .unwrap();

    assert!(!h.service.leave_queue(1).await.unwrap());

    let entry = h.queue.get_by_user(1).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Processing);
}

#[tokio::test]
async fn test_status_of_unknown_user_is_not_found() {
    let h = Harness::new();
    let result = h.service.get_queue_status(5).await;
    assert!(matches!(result, Err(MatchmakerError::NotFound(_))));
}

#[tokio::test]
async fn test_status_position_and_wait_estimate() {
    let h = Harness::new();
    for user in 1..=5 {
        h.add_user(profile(user, 30, "hiking", &[]));
        h.service.join_queue(user, Preferences::default()).await.unwrap();
        h.advance_secs(10);
    }
    // Scores are set at join time and all equal here, so age decides
    let first = h.service.get_queue_status(1).await.unwrap();
    let fifth = h.service.get_queue_status(5).await.unwrap();

    assert_eq!(first.position, Some(1));
    assert_eq!(fifth.position, Some(5));
    // ceil(1/2) and ceil(5/2) passes of 30 s
    assert_eq!(first.estimated_wait_secs, Some(30));
    assert_eq!(fifth.estimated_wait_secs, Some(90));
}

#[tokio::test]
async fn test_wait_estimate_capped_by_expiry() {
    let h = Harness::with_config(MatchingConfig {
        batch_interval_ms: 600_000,
        ..Default::default()
    });
    h.add_user(profile(1, 30, "hiking", &[]));
    h.service.join_queue(1, Preferences::default()).await.unwrap();
    h.advance_secs(3500);

    let status = h.service.get_queue_status(1).await.unwrap();
    assert_eq!(status.estimated_wait_secs, Some(100));
}

#[tokio::test]
async fn test_update_preferences_requires_waiting_entry() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));

    let missing = h.service.update_preferences(1, community_prefs("chess")).await;
    assert!(matches!(missing, Err(MatchmakerError::NotFound(_))));

    h.service.join_queue(1, Preferences::default()).await.unwrap();
    let updated = h.service.update_preferences(1, community_prefs("chess")).await.unwrap();
    assert_eq!(updated.preferences, community_prefs("chess"));
}

#[tokio::test]
async fn test_expire_stale_after_default_ttl() {
    let h = Harness::new();
    h.add_user(profile(1, 30, "hiking", &[]));
    h.service.join_queue(1, Preferences::default()).await.unwrap();

    h.advance_secs(3599);
    assert_eq!(h.service.expire_stale().await.unwrap(), 0);

    h.advance_secs(2);
    assert_eq!(h.service.expire_stale().await.unwrap(), 1);
    let entry = h.queue.get_by_user(1).await.unwrap().unwrap();
    assert_eq!(entry.status, EntryStatus::Expired);

    // Second call leaves it alone
    assert_eq!(h.service.expire_stale().await.unwrap(), 0);
    assert!(!h.service.leave_queue(1).await.unwrap());
}

#[tokio::test]
async fn test_statistics() {
    let h = Harness::new();
    for user in 1..=3 {
        h.add_user(profile(user, 30, "hiking", &[]));
    }
    h.service.join_queue(1, Preferences::default()).await.unwrap();
    h.advance_secs(60);
    h.service.join_queue(2, Preferences::default()).await.unwrap();
    h.advance_secs(3600);
    h.service.join_queue(3, Preferences::default()).await.unwrap();
    // Users 1 and 2 are now past their hour
    h.service.expire_stale().await.unwrap();
    h.advance_secs(30);

    let stats = h.service.get_queue_statistics().await.unwrap();

    assert_eq!(stats.queue_length, 1);
    assert_eq!(stats.status_counts.get(&EntryStatus::Waiting), Some(&1));
    assert_eq!(stats.status_counts.get(&EntryStatus::Expired), Some(&2));
    assert!((stats.avg_wait_secs - 30.0).abs() < 1e-9);
}

#[tokio::test]
#[serial]
async fn test_event_broadcasting() {
    let h = Harness::new();
    let mut rx1 = h.service.subscribe();
    let mut rx2 = h.service.subscribe();
    h.add_user(profile(1, 30, "hiking", &[]));

    let status = h.service.join_queue(1, Preferences::default()).await.unwrap();
    h.service.leave_queue(1).await.unwrap();

    let timeout = StdDuration::from_secs(1);
    for rx in [&mut rx1, &mut rx2] {
        let joined = tokio::time::timeout(timeout, rx.recv())
            .await
            .expect("Timed out waiting for Joined event")
            .expect("Failed to receive Joined event");
        assert_eq!(
            joined,
            QueueEvent::Joined {
                user_id: 1,
                entry_id: status.entry_id
            }
        );

        let left = tokio::time::timeout(timeout, rx.recv())
            .await
            .expect("Timed out waiting for Left event")
            .expect("Failed to receive Left event");
        assert_eq!(left, QueueEvent::Left { user_id: 1 });
    }
}

#[tokio::test]
async fn test_pending_matches_when_configured() {
    let h = Harness::with_config(MatchingConfig {
        initial_match_status: MatchStatus::Pending,
        ..Default::default()
    });
    h.add_user(profile(1, 30, "hiking", &[]));
    h.add_user(profile(2, 30, "hiking", &[]));
    h.service.join_queue(1, Preferences::default()).await.unwrap();
    h.service.join_queue(2, Preferences::default()).await.unwrap();

    assert_eq!(h.service.config().initial_match_status, MatchStatus::Pending);

    let created = h.service.trigger_batch().await.unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].status, MatchStatus::Pending);
}
