//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! waiting-room matchmaking gateway, including environment variable loading
//! and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub amqp: AmqpSettings,
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host to bind the gateway to
    pub host: String,
    /// Port serving both the WebSocket endpoint and the health check
    pub port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// AMQP connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AmqpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Shared coordination queue consumed by every instance
    pub queue_name: String,
    /// Maximum retry attempts for failed connections
    pub max_retry_attempts: u32,
    /// Retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Connection timeout in seconds
    pub connection_timeout_seconds: u64,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Pre-shared passphrase for ticket decryption
    pub ticket_key: String,
    /// Admission freshness window in seconds
    pub freshness_window_seconds: u64,
    /// How far priority tickets are shifted back in the queue ordering
    pub priority_offset_minutes: i64,
    /// Staged delay before session-assignment notifications, milliseconds
    pub assignment_delay_ms: u64,
    /// Staged delay between session assignment and join, milliseconds
    pub join_delay_ms: u64,
    /// Join-delay hint sent to clients in the Play notification, seconds
    pub join_delay_hint_secs: u32,
    /// Whether a default-pool server may satisfy a custom-key bucket when no
    /// exact match is online
    pub allow_default_key_fallback: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "waiting-room".to_string(),
            log_level: "info".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for AmqpSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            queue_name: "matchmaker".to_string(),
            max_retry_attempts: 5,
            retry_delay_ms: 1000,
            connection_timeout_seconds: 30,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            ticket_key: "test".to_string(),
            freshness_window_seconds: 30,
            priority_offset_minutes: 10,
            assignment_delay_ms: 100,
            join_delay_ms: 200,
            join_delay_hint_secs: 1,
            allow_default_key_fallback: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(host) = env::var("BIND_HOST") {
            config.service.host = host;
        }
        if let Ok(port) = env::var("BIND_PORT") {
            config.service.port = port
                .parse()
                .map_err(|_| anyhow!("Invalid BIND_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // AMQP settings
        if let Ok(host) = env::var("AMQP_HOST") {
            config.amqp.host = host;
        }
        if let Ok(port) = env::var("AMQP_PORT") {
            config.amqp.port = port
                .parse()
                .map_err(|_| anyhow!("Invalid AMQP_PORT value: {}", port))?;
        }
        if let Ok(username) = env::var("AMQP_USERNAME") {
            config.amqp.username = username;
        }
        if let Ok(password) = env::var("AMQP_PASSWORD") {
            config.amqp.password = password;
        }
        if let Ok(vhost) = env::var("AMQP_VHOST") {
            config.amqp.vhost = vhost;
        }
        if let Ok(queue) = env::var("AMQP_QUEUE_NAME") {
            config.amqp.queue_name = queue;
        }
        if let Ok(retries) = env::var("AMQP_MAX_RETRY_ATTEMPTS") {
            config.amqp.max_retry_attempts = retries
                .parse()
                .map_err(|_| anyhow!("Invalid AMQP_MAX_RETRY_ATTEMPTS value: {}", retries))?;
        }
        if let Ok(delay) = env::var("AMQP_RETRY_DELAY_MS") {
            config.amqp.retry_delay_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid AMQP_RETRY_DELAY_MS value: {}", delay))?;
        }
        if let Ok(timeout) = env::var("AMQP_CONNECTION_TIMEOUT_SECONDS") {
            config.amqp.connection_timeout_seconds = timeout.parse().map_err(|_| {
                anyhow!("Invalid AMQP_CONNECTION_TIMEOUT_SECONDS value: {}", timeout)
            })?;
        }

        // Matchmaking settings
        if let Ok(key) = env::var("TICKET_KEY") {
            config.matchmaking.ticket_key = key;
        }
        if let Ok(window) = env::var("FRESHNESS_WINDOW_SECONDS") {
            config.matchmaking.freshness_window_seconds = window
                .parse()
                .map_err(|_| anyhow!("Invalid FRESHNESS_WINDOW_SECONDS value: {}", window))?;
        }
        if let Ok(offset) = env::var("PRIORITY_OFFSET_MINUTES") {
            config.matchmaking.priority_offset_minutes = offset
                .parse()
                .map_err(|_| anyhow!("Invalid PRIORITY_OFFSET_MINUTES value: {}", offset))?;
        }
        if let Ok(delay) = env::var("ASSIGNMENT_DELAY_MS") {
            config.matchmaking.assignment_delay_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid ASSIGNMENT_DELAY_MS value: {}", delay))?;
        }
        if let Ok(delay) = env::var("JOIN_DELAY_MS") {
            config.matchmaking.join_delay_ms = delay
                .parse()
                .map_err(|_| anyhow!("Invalid JOIN_DELAY_MS value: {}", delay))?;
        }
        if let Ok(hint) = env::var("JOIN_DELAY_HINT_SECS") {
            config.matchmaking.join_delay_hint_secs = hint
                .parse()
                .map_err(|_| anyhow!("Invalid JOIN_DELAY_HINT_SECS value: {}", hint))?;
        }
        if let Ok(fallback) = env::var("ALLOW_DEFAULT_KEY_FALLBACK") {
            config.matchmaking.allow_default_key_fallback = fallback
                .parse()
                .map_err(|_| anyhow!("Invalid ALLOW_DEFAULT_KEY_FALLBACK value: {}", fallback))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get admission freshness window as chrono Duration
    pub fn freshness_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.matchmaking.freshness_window_seconds as i64)
    }

    /// Get priority queue-jump offset as chrono Duration
    pub fn priority_offset(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.matchmaking.priority_offset_minutes)
    }

    /// Get staged session-assignment delay as Duration
    pub fn assignment_delay(&self) -> Duration {
        Duration::from_millis(self.matchmaking.assignment_delay_ms)
    }

    /// Get staged join delay as Duration
    pub fn join_delay(&self) -> Duration {
        Duration::from_millis(self.matchmaking.join_delay_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.port == 0 {
        return Err(anyhow!("Bind port cannot be 0"));
    }
    if config.amqp.port == 0 {
        return Err(anyhow!("AMQP port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.amqp.connection_timeout_seconds == 0 {
        return Err(anyhow!("AMQP connection timeout must be greater than 0"));
    }

    // Validate AMQP settings
    if config.amqp.host.is_empty() {
        return Err(anyhow!("AMQP host cannot be empty"));
    }
    if config.amqp.queue_name.is_empty() {
        return Err(anyhow!("AMQP queue name cannot be empty"));
    }

    // Validate matchmaking settings
    if config.matchmaking.ticket_key.is_empty() {
        return Err(anyhow!("Ticket key cannot be empty"));
    }
    if config.matchmaking.freshness_window_seconds == 0 {
        return Err(anyhow!("Freshness window must be greater than 0"));
    }
    if config.matchmaking.priority_offset_minutes < 0 {
        return Err(anyhow!("Priority offset cannot be negative"));
    }

    Ok(())
}
