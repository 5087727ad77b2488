//! Error types for the matchmaking gateway
//!
//! This module defines all error types using anyhow for consistent error
//! handling throughout the application.

use crate::types::CloseReason;

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakerError {
    #[error("AMQP connection failed: {message}")]
    AmqpConnectionFailed { message: String },

    #[error("invalid ticket payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("ticket timestamp expired ({age_secs}s old)")]
    TimestampExpired { age_secs: i64 },

    #[error("player already queued: {player_id}")]
    AlreadyQueued { player_id: String },

    #[error("no capacity on server {server_id}")]
    NoCapacity { server_id: String },

    #[error("notification delivery failed for player {player_id}")]
    DeliveryFailure { player_id: String },

    #[error("server not found: {server_id}")]
    ServerNotFound { server_id: String },

    #[error("internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakerError {
    /// Reason carried on the policy close frame when this error is terminal
    /// for a connection. Admission errors map to their wire reason; anything
    /// else that reaches the socket degrades to `invalid_payload`.
    pub fn close_reason(&self) -> CloseReason {
        match self {
            MatchmakerError::TimestampExpired { .. } => CloseReason::TimestampExpired,
            MatchmakerError::AlreadyQueued { .. } => CloseReason::AlreadyQueued,
            _ => CloseReason::InvalidPayload,
        }
    }
}
