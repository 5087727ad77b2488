//! Concurrent registry of queued tickets
//!
//! Single source of truth for which players are waiting. Keyed by player id
//! so a player can hold at most one live ticket across all connections.
//! Insertion order is tracked with a monotonic sequence so equal join times
//! resolve first-come-first-served.

use crate::types::{BucketKey, Notification, PlayerId, Ticket};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

struct RegisteredTicket {
    seq: u64,
    ticket: Arc<Ticket>,
}

/// Shared map of all tickets currently queued on this instance
#[derive(Default)]
pub struct TicketRegistry {
    tickets: DashMap<PlayerId, RegisteredTicket>,
    next_seq: AtomicU64,
}

impl TicketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ticket unless its player already holds one.
    /// Returns false without modifying the registry when the player is
    /// already queued.
    pub fn try_add(&self, ticket: Arc<Ticket>) -> bool {
        match self.tickets.entry(ticket.player_id.clone()) {
            Entry::Occupied(_) => {
                debug!("Rejected duplicate ticket for player {}", ticket.player_id);
                false
            }
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                slot.insert(RegisteredTicket { seq, ticket });
                true
            }
        }
    }

    /// Remove a player's ticket. Returns whether a ticket was present, so
    /// callers can make departure announcements exactly once.
    pub fn remove(&self, player_id: &str) -> bool {
        self.tickets.remove(player_id).is_some()
    }

    pub fn get(&self, player_id: &str) -> Option<Arc<Ticket>> {
        self.tickets.get(player_id).map(|r| r.ticket.clone())
    }

    /// Ordered snapshot of the unadmitted tickets waiting in a bucket.
    ///
    /// Sorted by effective join time, then by registration order. Admitted
    /// tickets are excluded; they are no longer candidates for matching.
    pub fn snapshot(&self, bucket: &BucketKey) -> Vec<Arc<Ticket>> {
        let mut waiting: Vec<(i64, u64, Arc<Ticket>)> = self
            .tickets
            .iter()
            .filter(|r| r.ticket.bucket == *bucket && !r.ticket.is_admitted())
            .map(|r| {
                (
                    r.ticket.join_time.timestamp_millis(),
                    r.seq,
                    r.ticket.clone(),
                )
            })
            .collect();

        waiting.sort_by_key(|(join_ms, seq, _)| (*join_ms, *seq));
        waiting.into_iter().map(|(_, _, ticket)| ticket).collect()
    }

    /// Number of unadmitted tickets waiting in a bucket
    pub fn queue_depth(&self, bucket: &BucketKey) -> usize {
        self.tickets
            .iter()
            .filter(|r| r.ticket.bucket == *bucket && !r.ticket.is_admitted())
            .count()
    }

    /// Number of connected players in a bucket, admitted or not
    pub fn bucket_size(&self, bucket: &BucketKey) -> usize {
        self.tickets
            .iter()
            .filter(|r| r.ticket.bucket == *bucket)
            .count()
    }

    /// Deliver a notification to every non-admitted ticket in a bucket.
    /// Admitted tickets are past queue updates; sessions that have gone
    /// away are skipped.
    pub fn broadcast(&self, bucket: &BucketKey, make: impl Fn(&Ticket) -> Notification) {
        for entry in self.tickets.iter() {
            if entry.ticket.bucket == *bucket && !entry.ticket.is_admitted() {
                if let Err(e) = entry.ticket.notify(make(&entry.ticket)) {
                    debug!(
                        "Skipping broadcast to departed player {}: {}",
                        entry.ticket.player_id, e
                    );
                }
            }
        }
    }

    /// Total tickets registered on this instance, across all buckets
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}
