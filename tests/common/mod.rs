#![allow(dead_code)]

use std::sync::{Arc, Once};

use matchmaker::external::{ManualClock, MemoryProfiles, MemorySlots, ProfileCompatibility};
use matchmaker::matches::MemoryMatchStore;
use matchmaker::models::{AgeRange, Location, Preferences, UserId, UserProfile};
use matchmaker::queue::MemoryQueue;
use matchmaker::{Collaborators, MatchingConfig, MatchmakingService};
use time::{Duration, OffsetDateTime};

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// 2024-05-01T12:00:00Z
pub fn t0() -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp(1_714_564_800).unwrap()
}

/// Central Berlin
pub fn berlin() -> Location {
    Location { lat: 52.5200, long: 13.4050 }
}

pub fn profile(user_id: UserId, age: u8, community: &str, interests: &[&str]) -> UserProfile {
    UserProfile {
        user_id,
        age: Some(age),
        location: Some(berlin()),
        community: Some(community.to_string()),
        interests: interests.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn community_prefs(community: &str) -> Preferences {
    Preferences {
        community: Some(community.to_string()),
        ..Default::default()
    }
}

pub fn age_prefs(min: u8, max: u8) -> Preferences {
    Preferences {
        age_range: Some(AgeRange { min, max }),
        ..Default::default()
    }
}

/// A service wired to in-memory collaborators and a manual clock at `t0()`.
pub struct Harness {
    pub service: MatchmakingService,
    pub queue: MemoryQueue,
    pub matches: MemoryMatchStore,
    pub slots: MemorySlots,
    pub profiles: MemoryProfiles,
    pub clock: ManualClock,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(MatchingConfig::default())
    }

    pub fn with_config(config: MatchingConfig) -> Self {
        init();
        let queue = MemoryQueue::new();
        let matches = MemoryMatchStore::new();
        let slots = MemorySlots::new(config.default_daily_slots);
        let profiles = MemoryProfiles::new();
        let clock = ManualClock::new(t0());

        let deps = Collaborators {
            queue: Arc::new(queue.clone()),
            matches: Arc::new(matches.clone()),
            slots: Arc::new(slots.clone()),
            compatibility: Arc::new(ProfileCompatibility::new(Arc::new(profiles.clone()))),
            clock: Arc::new(clock.clone()),
            signals: None,
        };
        let service = MatchmakingService::new(Some(config), deps);

        Self {
            service,
            queue,
            matches,
            slots,
            profiles,
            clock,
        }
    }

    /// Registers a profile and a default slot account.
    pub fn add_user(&self, profile: UserProfile) {
        self.slots.register(profile.user_id);
        self.profiles.upsert(profile);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.clock.advance(Duration::seconds(secs));
    }
}
