//! Matching engine: batch admission and cross-instance coordination

pub mod coordinator;
pub mod matcher;

// Re-export commonly used types
pub use coordinator::{CoordinatorConfig, QueueCoordinator};
pub use matcher::{MatchOutcome, Matcher, MatcherConfig};
