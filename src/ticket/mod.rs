//! Ticket admission: decryption, validation, bucketing, and the registry
//! of waiting players.

pub mod bucket;
pub mod codec;
pub mod registry;

// Re-export commonly used types
pub use codec::{ParsedTicket, TicketAttributes, TicketCodec, TicketRequest};
pub use registry::TicketRegistry;
