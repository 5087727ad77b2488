//! Configuration management for the waiting-room service
//!
//! This module handles all configuration loading from environment variables,
//! optional TOML files, validation, and default values for the gateway.

pub mod app;

// Re-export commonly used types
pub use app::{validate_config, AmqpSettings, AppConfig, MatchmakingSettings, ServiceSettings};
