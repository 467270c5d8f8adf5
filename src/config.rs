//! Configuration management for the matchmaker service.
//!
//! This module provides configuration handling via environment variables with sensible defaults.
//! All configuration parameters can be customized through environment variables with the
//! MATCHMAKER_ prefix. Unset variables keep their default.
//!
//! # Environment Variables
//! - MATCHMAKER_BATCH_INTERVAL_MS: Time between batch passes (default: 30000)
//! - MATCHMAKER_MAINTENANCE_INTERVAL_MS: Cleanup tier interval (default: 300000)
//! - MATCHMAKER_DAILY_MAINTENANCE_INTERVAL_MS: Slot reset tier interval (default: 86400000)
//! - MATCHMAKER_QUEUE_TTL_SECS: Lifetime of a queue entry (default: 3600)
//! - MATCHMAKER_CLAIM_TIMEOUT_SECS: Age after which a processing claim is stale (default: 120)
//! - MATCHMAKER_TERMINAL_RETENTION_SECS: How long matched/expired rows are kept (default: 86400)
//! - MATCHMAKER_WAIT_WEIGHT / _ACTIVITY_WEIGHT / _COMPATIBILITY_WEIGHT: Priority weights (0.4/0.3/0.3)
//! - MATCHMAKER_DEFAULT_ACTIVITY_SCORE / _DEFAULT_COMPATIBILITY_SCORE: Flat signals (0.5/0.5)
//! - MATCHMAKER_MAX_BATCH_SIZE: Entries claimed per pass (default: 500)
//! - MATCHMAKER_MIN_COMPATIBILITY_SCORE: Lowest score that may be matched (default: 0)
//! - MATCHMAKER_MATCH_TTL_SECS: Lifetime of a created match (default: 86400)
//! - MATCHMAKER_INITIAL_MATCH_STATUS: `active` or `pending` (default: active)
//! - MATCHMAKER_REJOIN_UPDATES_PREFERENCES: Re-join while waiting updates preferences (default: true)
//! - MATCHMAKER_DEFAULT_DAILY_SLOTS: Daily slots for in-memory accounts (default: 3)
//! - MATCHMAKER_EVENT_BUFFER: Queue event channel capacity (default: 100)

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::matches::MatchStatus;
use crate::queue::PriorityWeights;

/// Prefix for all matchmaker environment variables.
const ENV_PREFIX: &str = "MATCHMAKER_";

/// Configuration parameters for the matchmaker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Interval between scheduled batch passes, in milliseconds.
    pub batch_interval_ms: u64,

    /// Interval of the cleanup maintenance tier, in milliseconds.
    pub maintenance_interval_ms: u64,

    /// Interval of the slot-reset maintenance tier, in milliseconds.
    pub daily_maintenance_interval_ms: u64,

    /// Seconds after `created_at` at which a queue entry expires.
    pub queue_ttl_secs: u64,

    /// A processing claim older than this is treated as abandoned.
    pub claim_timeout_secs: u64,

    /// Matched/expired rows older than this are purged.
    pub terminal_retention_secs: u64,

    pub wait_weight: f64,
    pub activity_weight: f64,
    pub compatibility_weight: f64,

    /// Flat activity signal used until a real one is plugged in.
    pub default_activity_score: f64,
    /// Flat compatibility signal used until a real one is plugged in.
    pub default_compatibility_score: f64,

    /// Maximum number of entries claimed by one pass.
    pub max_batch_size: usize,

    /// Pairs scoring below this are never matched.
    pub min_compatibility_score: u8,

    /// Seconds a created match lives before its owner may expire it.
    pub match_ttl_secs: u64,

    /// Status given to freshly created matches.
    pub initial_match_status: MatchStatus,

    /// Whether joining while already waiting updates preferences instead of failing.
    pub rejoin_updates_preferences: bool,

    pub default_daily_slots: u32,

    pub event_buffer: usize,
}

impl MatchingConfig {
    /// Attempts to load configuration from environment variables.
    ///
    /// # Returns
    /// - Ok(config) if all present variables are valid
    /// - Err(message) if any variable fails to parse or validate
    pub fn from_env() -> Result<Self, String> {
        // Load .env file if it exists for local development
        dotenv::dotenv().ok();

        let env_vars: std::collections::HashMap<String, String> = env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .map(|(k, v)| (k.trim_start_matches(ENV_PREFIX).to_string(), v))
            .collect();

        let config = Self::from_vars(env_vars)?;
        config.validate()?;
        Ok(config)
    }

    fn from_vars<I>(vars: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter::<_, Self>(vars).map_err(|e| format!("Failed to parse environment variables: {}", e))
    }

    /// Loads configuration from environment variables, falling back to defaults
    /// if environment variables are invalid.
    pub fn from_env_or_default() -> Self {
        match Self::from_env() {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Using default configuration: {}", e);
                Self::default()
            }
        }
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }

    pub fn daily_maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.daily_maintenance_interval_ms)
    }

    pub fn queue_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.queue_ttl_secs as i64)
    }

    pub fn claim_timeout(&self) -> time::Duration {
        time::Duration::seconds(self.claim_timeout_secs as i64)
    }

    pub fn terminal_retention(&self) -> time::Duration {
        time::Duration::seconds(self.terminal_retention_secs as i64)
    }

    pub fn match_ttl(&self) -> time::Duration {
        time::Duration::seconds(self.match_ttl_secs as i64)
    }

    pub fn priority_weights(&self) -> PriorityWeights {
        PriorityWeights {
            wait: self.wait_weight,
            activity: self.activity_weight,
            compatibility: self.compatibility_weight,
        }
    }

    /// Validates all configuration parameters.
    ///
    /// # Validation Rules
    /// - Intervals, TTLs and sizes must be positive
    /// - Priority weights must be non-negative and sum to 1.0
    /// - Flat signals must lie in [0, 1]
    /// - Minimum compatibility must be at most 100
    /// - New matches start as `active` or `pending`
    ///
    /// # Returns
    /// - Ok(()) if all validation passes
    /// - Err(message) with description of the first validation failure
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_interval_ms == 0 {
            return Err("batch_interval_ms must be positive".to_string());
        }
        if self.maintenance_interval_ms == 0 || self.daily_maintenance_interval_ms == 0 {
            return Err("maintenance intervals must be positive".to_string());
        }
        if self.queue_ttl_secs == 0 {
            return Err("queue_ttl_secs must be positive".to_string());
        }
        if self.claim_timeout_secs == 0 {
            return Err("claim_timeout_secs must be positive".to_string());
        }
        self.priority_weights().validate()?;
        if !(0.0..=1.0).contains(&self.default_activity_score)
            || !(0.0..=1.0).contains(&self.default_compatibility_score)
        {
            return Err("default signal scores must be within [0, 1]".to_string());
        }
        if self.max_batch_size == 0 {
            return Err("max_batch_size must be positive".to_string());
        }
        if self.min_compatibility_score > 100 {
            return Err("min_compatibility_score must be at most 100".to_string());
        }
        if self.match_ttl_secs == 0 {
            return Err("match_ttl_secs must be positive".to_string());
        }
        if !self.initial_match_status.is_live() {
            return Err("initial_match_status must be active or pending".to_string());
        }
        if self.event_buffer == 0 {
            return Err("event_buffer must be positive".to_string());
        }
        Ok(())
    }
}

/// Default configuration values.
impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            batch_interval_ms: 30_000,              // 30 s between passes
            maintenance_interval_ms: 300_000,       // 5 min cleanup tier
            daily_maintenance_interval_ms: 86_400_000, // 24 h slot reset tier
            queue_ttl_secs: 3600,                   // 1 h in the queue
            claim_timeout_secs: 120,
            terminal_retention_secs: 86_400,
            wait_weight: 0.4,
            activity_weight: 0.3,
            compatibility_weight: 0.3,
            default_activity_score: 0.5,
            default_compatibility_score: 0.5,
            max_batch_size: 500,
            min_compatibility_score: 0,
            match_ttl_secs: 86_400,
            initial_match_status: MatchStatus::Active,
            rejoin_updates_preferences: true,
            default_daily_slots: 3,
            event_buffer: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_are_valid() {
        assert!(MatchingConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_vars_keep_defaults() {
        let config = MatchingConfig::from_vars(vars(&[
            ("BATCH_INTERVAL_MS", "1000"),
            ("INITIAL_MATCH_STATUS", "pending"),
        ]))
        .unwrap();

        assert_eq!(config.batch_interval_ms, 1000);
        assert_eq!(config.initial_match_status, MatchStatus::Pending);
        assert_eq!(config.queue_ttl_secs, 3600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unparsable_value_is_rejected() {
        let result = MatchingConfig::from_vars(vars(&[("MAX_BATCH_SIZE", "lots")]));
        assert!(result.is_err());
    }

    #[test]
    fn weights_must_sum_to_one() {
        let config = MatchingConfig {
            wait_weight: 0.9,
            ..Default::default()
        };
        assert_eq!(
            config.validate().unwrap_err(),
            "priority weights must sum to 1.0"
        );
    }

    #[test]
    fn completed_is_not_a_valid_initial_status() {
        let config = MatchingConfig {
            initial_match_status: MatchStatus::Completed,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
