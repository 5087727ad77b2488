//! Shared test fixtures for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use waiting_room::amqp::MockCoordinationPublisher;
use waiting_room::directory::InMemoryServerDirectory;
use waiting_room::matchmaker::{CoordinatorConfig, MatcherConfig, QueueCoordinator};
use waiting_room::ticket::TicketRegistry;
use waiting_room::types::{
    BucketKey, Notification, Region, ServerRecord, ServerStatus, Ticket, DEFAULT_CUSTOM_KEY,
};

/// Standard bucket used across scenarios
pub fn test_bucket() -> BucketKey {
    BucketKey {
        region: Region::Nae,
        playlist: "playlist_defaultsolo".to_string(),
        custom_key: DEFAULT_CUSTOM_KEY.to_string(),
        season: 1,
    }
}

/// Build a ticket with an explicit effective join time and queue it nowhere
pub fn make_ticket(
    player: &str,
    bucket: BucketKey,
    join_time: DateTime<Utc>,
    priority: bool,
) -> (Arc<Ticket>, mpsc::UnboundedReceiver<Notification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ticket = Arc::new(Ticket::new(
        player.to_string(),
        bucket,
        priority,
        join_time,
        tx,
    ));
    (ticket, rx)
}

/// An online server with the given capacity in the given bucket
pub fn online_server(id: &str, bucket: &BucketKey, max_players: u32) -> ServerRecord {
    ServerRecord {
        id: id.to_string(),
        region: bucket.region,
        playlist: bucket.playlist.clone(),
        custom_key: bucket.custom_key.clone(),
        season: bucket.season,
        status: ServerStatus::Online,
        max_players: Some(max_players),
        players: 0,
    }
}

/// Full coordination harness backed by a mock publisher and zero delays
pub struct TestHarness {
    pub coordinator: Arc<QueueCoordinator>,
    pub registry: Arc<TicketRegistry>,
    pub directory: Arc<InMemoryServerDirectory>,
    pub publisher: Arc<MockCoordinationPublisher>,
}

pub fn harness() -> TestHarness {
    harness_with_fallback(false)
}

pub fn harness_with_fallback(allow_default_key_fallback: bool) -> TestHarness {
    let registry = Arc::new(TicketRegistry::new());
    let directory = Arc::new(InMemoryServerDirectory::new());
    let publisher = Arc::new(MockCoordinationPublisher::new());

    let coordinator = Arc::new(QueueCoordinator::new(
        registry.clone(),
        directory.clone(),
        publisher.clone(),
        CoordinatorConfig {
            allow_default_key_fallback,
            matcher: MatcherConfig {
                assignment_delay: Duration::ZERO,
                join_delay: Duration::ZERO,
                join_delay_hint_secs: 1,
            },
        },
    ));

    TestHarness {
        coordinator,
        registry,
        directory,
        publisher,
    }
}

/// Drain every notification currently buffered on a session channel
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut collected = Vec::new();
    while let Ok(notification) = rx.try_recv() {
        collected.push(notification);
    }
    collected
}
