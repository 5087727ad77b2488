//! Utility functions for the matchmaking gateway

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

/// Generate an opaque hyphen-less identifier for tickets, matches, sessions
pub fn generate_opaque_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Ordering key for a ticket. Priority tickets are shifted earlier by a
/// fixed offset so they sort ahead without a separate priority lane.
pub fn effective_join_time(now: DateTime<Utc>, priority: bool, offset: Duration) -> DateTime<Utc> {
    if priority {
        now - offset
    } else {
        now
    }
}
