//! AMQP integration for the matchmaking gateway
//!
//! This module handles the broker connection, the coordination message
//! definitions, and the publish/consume sides of the shared `matchmaker`
//! queue every service instance competes on.

pub mod connection;
pub mod consumer;
pub mod messages;
pub mod publisher;

// Re-export commonly used types
pub use connection::{AmqpConfig, AmqpConnection};
pub use consumer::{CoordinationConsumer, CoordinationHandler};
pub use messages::*;
pub use publisher::{
    AmqpCoordinationPublisher, CoordinationPublisher, MockCoordinationPublisher, PublisherConfig,
};
