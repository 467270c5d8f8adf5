// Re-export all necessary types and interfaces
mod types;
pub mod matching;
mod priority;
mod q_core;
mod q_impl;
mod manager;
mod q_matching;

// Public exports from the queue module
pub use types::*;
pub use q_core::MemoryQueue;
pub use priority::{priority_order, FlatSignals, PriorityScorer, PriorityWeights, SignalProvider};
pub use manager::QueueManager;
pub use q_matching::BatchMatcher;

// Constants
/// Seconds of waiting after which the wait component of the priority saturates
pub const WAIT_SATURATION_SECS: f64 = 3600.0;

/// Search radius used for proximity scoring when neither side states one
pub const DEFAULT_PROXIMITY_RADIUS_KM: f64 = 50.0;

/// Compatibility points for identical interest sets
pub const INTEREST_POINTS: f64 = 40.0;

/// Compatibility points for a shared community
pub const COMMUNITY_POINTS: f64 = 30.0;

/// Compatibility points for being in the same place
pub const PROXIMITY_POINTS: f64 = 20.0;

/// Compatibility points when both ages sit inside the other's range
pub const AGE_FIT_POINTS: f64 = 10.0;
