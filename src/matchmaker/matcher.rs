//! Capacity-aware match batch execution
//!
//! A batch runs in two phases against one bucket and one server. Phase one
//! tells the head of the queue a session is being prepared; phase two
//! re-validates that same selection and admits whoever is still registered.
//! The gap between phases is where players disconnect, so selected tickets
//! are checked against the registry again before any slot is spent. Slots
//! are reserved through the directory, which bounds admissions even when
//! batches for the same server race.

use crate::directory::ServerDirectory;
use crate::error::{MatchmakerError, Result};
use crate::ticket::TicketRegistry;
use crate::types::{BucketKey, Notification, PlayPayload, ServerRecord, StatusUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Timing knobs for the two-phase admission flow
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Pause before session assignment notifications go out
    pub assignment_delay: Duration,
    /// Pause between assignment and join notifications
    pub join_delay: Duration,
    /// Join delay hint forwarded to clients in the play payload
    pub join_delay_hint_secs: u32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            assignment_delay: Duration::from_millis(100),
            join_delay: Duration::from_millis(200),
            join_delay_hint_secs: 1,
        }
    }
}

/// Outcome counts for one match batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Players told a session was being assigned
    pub assigned: usize,
    /// Players actually admitted and told to join
    pub joined: usize,
}

/// Runs match batches against the shared registry and server directory
#[derive(Clone)]
pub struct Matcher {
    registry: Arc<TicketRegistry>,
    directory: Arc<dyn ServerDirectory>,
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(
        registry: Arc<TicketRegistry>,
        directory: Arc<dyn ServerDirectory>,
        config: MatcherConfig,
    ) -> Self {
        Self {
            registry,
            directory,
            config,
        }
    }

    /// Run one match batch for `bucket` against `server`.
    ///
    /// Admission is capped by the server's free slots at batch start and
    /// re-checked per player at join time, so a batch never over-admits
    /// even when players vanish mid-flight.
    pub async fn run(&self, bucket: &BucketKey, server: &ServerRecord) -> Result<MatchOutcome> {
        let free = server.free_slots();
        if free == 0 {
            return Err(MatchmakerError::NoCapacity {
                server_id: server.id.clone(),
            }
            .into());
        }

        sleep(self.config.assignment_delay).await;

        let candidates = self.registry.snapshot(bucket);
        let assigned: Vec<_> = candidates.into_iter().take(free as usize).collect();
        if assigned.is_empty() {
            debug!("No waiting players in bucket {}, skipping batch", bucket);
            return Ok(MatchOutcome::default());
        }

        for ticket in &assigned {
            let notification = Notification::StatusUpdate(StatusUpdate::SessionAssignment {
                match_id: ticket.match_id.clone(),
            });
            if let Err(e) = ticket.notify(notification) {
                warn!(
                    "Session assignment not delivered to {}: {}",
                    ticket.player_id, e
                );
            }
        }
        let outcome_assigned = assigned.len();

        sleep(self.config.join_delay).await;

        // Re-validate the phase-one selection: anyone who disconnected
        // during the delay is skipped. Tickets that queued meanwhile were
        // never told a session was coming and must wait for the next batch.
        let eligible: Vec<_> = assigned
            .into_iter()
            .filter(|ticket| {
                !ticket.is_admitted()
                    && self
                        .registry
                        .get(&ticket.player_id)
                        .is_some_and(|current| Arc::ptr_eq(&current, ticket))
            })
            .collect();

        let mut joined = 0usize;
        if !eligible.is_empty() {
            // Reserve seats up front; the directory grants at most the
            // server's remaining capacity, so racing batches cannot send
            // more Play notifications than the server can hold.
            let granted = self
                .directory
                .increment_players(&server.id, eligible.len() as u32)
                .await? as usize;

            for ticket in eligible.into_iter().take(granted) {
                if !ticket.mark_admitted() {
                    continue;
                }

                let play = Notification::Play(PlayPayload {
                    match_id: ticket.match_id.clone(),
                    session_id: ticket.session_id.clone(),
                    join_delay_sec: self.config.join_delay_hint_secs,
                });
                match ticket.notify(play) {
                    Ok(()) => joined += 1,
                    // The seat is already reserved; the player simply
                    // never sees the Play.
                    Err(e) => warn!("Play not delivered to {}: {}", ticket.player_id, e),
                }
            }
        }

        info!(
            "Match batch for bucket {} on server {}: {} assigned, {} joined",
            bucket, server.id, outcome_assigned, joined
        );

        Ok(MatchOutcome {
            assigned: outcome_assigned,
            joined,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryServerDirectory;
    use crate::types::{Region, ServerStatus, Ticket, DEFAULT_CUSTOM_KEY};
    use chrono::{Duration as ChronoDuration, Utc};
    use tokio::sync::mpsc;

    fn bucket() -> BucketKey {
        BucketKey {
            region: Region::Nae,
            playlist: "solo".to_string(),
            custom_key: DEFAULT_CUSTOM_KEY.to_string(),
            season: 1,
        }
    }

    fn server(id: &str, max: u32, players: u32) -> ServerRecord {
        ServerRecord {
            id: id.to_string(),
            region: Region::Nae,
            playlist: "solo".to_string(),
            custom_key: DEFAULT_CUSTOM_KEY.to_string(),
            season: 1,
            status: ServerStatus::Online,
            max_players: Some(max),
            players,
        }
    }

    fn zero_delay_config() -> MatcherConfig {
        MatcherConfig {
            assignment_delay: Duration::ZERO,
            join_delay: Duration::ZERO,
            join_delay_hint_secs: 1,
        }
    }

    fn queue_ticket(
        registry: &TicketRegistry,
        player: &str,
        join_offset_secs: i64,
    ) -> (Arc<Ticket>, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ticket = Arc::new(Ticket::new(
            player.to_string(),
            bucket(),
            false,
            Utc::now() + ChronoDuration::seconds(join_offset_secs),
            tx,
        ));
        assert!(registry.try_add(ticket.clone()));
        (ticket, rx)
    }

    async fn matcher_with(
        server: &ServerRecord,
    ) -> (Matcher, Arc<TicketRegistry>, Arc<InMemoryServerDirectory>) {
        let registry = Arc::new(TicketRegistry::new());
        let directory = Arc::new(InMemoryServerDirectory::new());
        directory.upsert(server.clone()).await;
        let matcher = Matcher::new(registry.clone(), directory.clone(), zero_delay_config());
        (matcher, registry, directory)
    }

    #[tokio::test]
    async fn test_full_server_is_no_capacity() {
        let server = server("s-1", 2, 2);
        let (matcher, _registry, _directory) = matcher_with(&server).await;

        let err = matcher.run(&bucket(), &server).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakerError>(),
            Some(MatchmakerError::NoCapacity { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_bucket_is_a_quiet_noop() {
        let server = server("s-1", 10, 0);
        let (matcher, _registry, directory) = matcher_with(&server).await;

        let outcome = matcher.run(&bucket(), &server).await.unwrap();
        assert_eq!(outcome, MatchOutcome::default());
        assert_eq!(directory.get("s-1").await.unwrap().players, 0);
    }

    #[tokio::test]
    async fn test_batch_admits_up_to_free_slots_in_order() {
        let server = server("s-1", 3, 1);
        let (matcher, registry, directory) = matcher_with(&server).await;

        let (_t1, mut rx1) = queue_ticket(&registry, "first", -30);
        let (_t2, mut rx2) = queue_ticket(&registry, "second", -20);
        let (t3, mut rx3) = queue_ticket(&registry, "third", -10);

        let outcome = matcher.run(&bucket(), &server).await.unwrap();
        assert_eq!(outcome.assigned, 2);
        assert_eq!(outcome.joined, 2);

        for rx in [&mut rx1, &mut rx2] {
            assert!(matches!(
                rx.try_recv().unwrap(),
                Notification::StatusUpdate(StatusUpdate::SessionAssignment { .. })
            ));
            assert!(matches!(rx.try_recv().unwrap(), Notification::Play(_)));
        }
        assert!(rx3.try_recv().is_err());
        assert!(!t3.is_admitted());

        assert_eq!(directory.get("s-1").await.unwrap().players, 3);
    }

    #[tokio::test]
    async fn test_admitted_tickets_are_never_rematched() {
        let server = server("s-1", 5, 0);
        let (matcher, registry, directory) = matcher_with(&server).await;

        let (_t1, mut rx1) = queue_ticket(&registry, "player-1", 0);
        matcher.run(&bucket(), &server).await.unwrap();
        while rx1.try_recv().is_ok() {}

        // Second batch sees no unadmitted candidates
        let outcome = matcher.run(&bucket(), &server).await.unwrap();
        assert_eq!(outcome, MatchOutcome::default());
        assert!(rx1.try_recv().is_err());
        assert_eq!(directory.get("s-1").await.unwrap().players, 1);
    }

    fn spawn_staged_batch(
        server: &ServerRecord,
        directory: Arc<InMemoryServerDirectory>,
        registry: Arc<TicketRegistry>,
    ) -> tokio::task::JoinHandle<crate::error::Result<MatchOutcome>> {
        let matcher = Matcher::new(
            registry,
            directory,
            MatcherConfig {
                assignment_delay: Duration::ZERO,
                join_delay: Duration::from_millis(200),
                join_delay_hint_secs: 1,
            },
        );
        let bucket = bucket();
        let server = server.clone();
        tokio::spawn(async move { matcher.run(&bucket, &server).await })
    }

    #[tokio::test(start_paused = true)]
    async fn test_mid_delay_arrival_waits_for_the_next_batch() {
        let server = server("s-1", 2, 0);
        let registry = Arc::new(TicketRegistry::new());
        let directory = Arc::new(InMemoryServerDirectory::new());
        directory.upsert(server.clone()).await;

        let (_early, mut rx_early) = queue_ticket(&registry, "early", -30);
        let batch = spawn_staged_batch(&server, directory.clone(), registry.clone());

        // A second player queues while the batch sits in its join delay,
        // with a join time that would sort ahead of the selected player.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let (late, mut rx_late) = queue_ticket(&registry, "late", -60);

        let outcome = batch.await.unwrap().unwrap();
        assert_eq!(outcome.assigned, 1);
        assert_eq!(outcome.joined, 1);

        assert!(matches!(
            rx_early.try_recv().unwrap(),
            Notification::StatusUpdate(StatusUpdate::SessionAssignment { .. })
        ));
        assert!(matches!(rx_early.try_recv().unwrap(), Notification::Play(_)));

        // The latecomer was never selected, so it gets neither notification
        assert!(rx_late.try_recv().is_err());
        assert!(!late.is_admitted());
        assert_eq!(directory.get("s-1").await.unwrap().players, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_selected_ticket_departing_mid_delay_is_skipped() {
        let server = server("s-1", 2, 0);
        let registry = Arc::new(TicketRegistry::new());
        let directory = Arc::new(InMemoryServerDirectory::new());
        directory.upsert(server.clone()).await;

        let (_leaver, mut rx_leaver) = queue_ticket(&registry, "leaver", -30);
        let (_stayer, mut rx_stayer) = queue_ticket(&registry, "stayer", -20);
        let batch = spawn_staged_batch(&server, directory.clone(), registry.clone());

        // Leaver disconnects between the assignment and join phases
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.remove("leaver"));

        let outcome = batch.await.unwrap().unwrap();
        assert_eq!(outcome.assigned, 2);
        assert_eq!(outcome.joined, 1);

        assert!(matches!(
            rx_leaver.try_recv().unwrap(),
            Notification::StatusUpdate(StatusUpdate::SessionAssignment { .. })
        ));
        assert!(rx_leaver.try_recv().is_err());

        assert!(matches!(
            rx_stayer.try_recv().unwrap(),
            Notification::StatusUpdate(StatusUpdate::SessionAssignment { .. })
        ));
        assert!(matches!(rx_stayer.try_recv().unwrap(), Notification::Play(_)));
        assert_eq!(directory.get("s-1").await.unwrap().players, 1);
    }
}
