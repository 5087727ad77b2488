//! Waiting Room - WebSocket matchmaking gateway
//!
//! Game clients open a persistent connection carrying an encrypted ticket,
//! wait in time-ordered per-bucket queues, and are assigned to game servers
//! with finite capacity. Service instances coordinate matching with each
//! other over a shared AMQP queue.

pub mod amqp;
pub mod config;
pub mod directory;
pub mod error;
pub mod matchmaker;
pub mod service;
pub mod session;
pub mod ticket;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakerError, Result};
pub use types::*;

// Re-export key components
pub use amqp::publisher::CoordinationPublisher;
pub use directory::{InMemoryServerDirectory, ServerDirectory};
pub use matchmaker::{Matcher, QueueCoordinator};
pub use ticket::{TicketCodec, TicketRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
