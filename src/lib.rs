//! Matchmaker: the queue processor of a social matching backend.
//!
//! Users join a waiting queue with their preferences. A background
//! scheduler periodically runs a batch pass that pairs compatible users in
//! priority order, creates match records and returns everyone else to the
//! pool. Stale entries expire after an hour.

pub mod api;
pub mod config;
pub mod error;
pub mod external;
pub mod matches;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod service;

pub use config::MatchingConfig;
pub use error::MatchmakerError;
pub use scheduler::{BackgroundScheduler, ScheduleIntervals, ScheduledJobs, SchedulerState};
pub use service::{Collaborators, MatchmakingService};
