//! Cross-instance queue coordination
//!
//! Sessions and the broker consumer both talk to the coordinator. It owns
//! the instance's view of the flow: local queue changes go out as `UPDATE`
//! messages, inbound `UPDATE`s refresh every waiting client and probe for
//! an online server, and inbound `STATUS online` messages trigger match
//! batches. Batches run as background tasks so a slow admission flow never
//! stalls the consumer.

use crate::amqp::{
    ChangeType, CoordinationHandler, CoordinationMessage, CoordinationPublisher, QueueUpdate,
    ServerStatusChange,
};
use crate::directory::ServerDirectory;
use crate::error::{MatchmakerError, Result};
use crate::matchmaker::matcher::{Matcher, MatcherConfig};
use crate::ticket::TicketRegistry;
use crate::types::{
    BucketKey, Notification, ServerRecord, ServerStatus, StatusUpdate, DEFAULT_CUSTOM_KEY,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Coordinator behavior knobs
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// When no server matches a private custom key, retry the lookup
    /// against the public pool
    pub allow_default_key_fallback: bool,
    pub matcher: MatcherConfig,
}

/// Per-instance coordination hub
pub struct QueueCoordinator {
    registry: Arc<TicketRegistry>,
    directory: Arc<dyn ServerDirectory>,
    publisher: Arc<dyn CoordinationPublisher>,
    matcher: Matcher,
    allow_default_key_fallback: bool,
    batches: Mutex<JoinSet<()>>,
}

impl QueueCoordinator {
    pub fn new(
        registry: Arc<TicketRegistry>,
        directory: Arc<dyn ServerDirectory>,
        publisher: Arc<dyn CoordinationPublisher>,
        config: CoordinatorConfig,
    ) -> Self {
        let matcher = Matcher::new(registry.clone(), directory.clone(), config.matcher);

        Self {
            registry,
            directory,
            publisher,
            matcher,
            allow_default_key_fallback: config.allow_default_key_fallback,
            batches: Mutex::new(JoinSet::new()),
        }
    }

    /// Announce a local queue membership change to every instance
    pub async fn announce_update(&self, bucket: &BucketKey, change: ChangeType) -> Result<()> {
        let depth = self.registry.queue_depth(bucket);
        let update = QueueUpdate::new(bucket, depth, change);
        self.publisher
            .publish(CoordinationMessage::Update(update))
            .await
    }

    /// Find an online server for the bucket, optionally falling back to the
    /// public pool when the private key has no server
    async fn lookup_online(&self, bucket: &BucketKey) -> Result<Option<ServerRecord>> {
        if let Some(server) = self.directory.find_online(bucket).await? {
            return Ok(Some(server));
        }

        if self.allow_default_key_fallback && bucket.custom_key != DEFAULT_CUSTOM_KEY {
            let fallback = bucket.with_custom_key(DEFAULT_CUSTOM_KEY);
            debug!(
                "No server for custom key bucket {}, probing public pool {}",
                bucket, fallback
            );
            return self.directory.find_online(&fallback).await;
        }

        Ok(None)
    }

    /// Refresh queue positions for everyone waiting in the bucket
    fn broadcast_queued(&self, bucket: &BucketKey) {
        let depth = self.registry.queue_depth(bucket);
        let status = if depth == 0 { 2 } else { 3 };

        self.registry.broadcast(bucket, |ticket| {
            Notification::StatusUpdate(StatusUpdate::Queued {
                ticket_id: ticket.ticket_id.clone(),
                queued_players: depth,
                estimated_wait_sec: depth * 2,
                status,
            })
        });
    }

    async fn handle_update(&self, update: QueueUpdate) -> Result<()> {
        let bucket = update.bucket();
        debug!(
            "Queue update for {}: {:?}, remote depth {}",
            bucket, update.change, update.client_amount
        );

        self.broadcast_queued(&bucket);

        // A populated bucket with a ready server starts the admission flow
        // via a STATUS message, so every instance reacts uniformly.
        if let Some(server) = self.lookup_online(&bucket).await? {
            let change = ServerStatusChange::new(&server.bucket(), &server.id, ServerStatus::Online);
            self.publisher
                .publish(CoordinationMessage::Status(change))
                .await?;
        }

        Ok(())
    }

    async fn handle_status(&self, change: ServerStatusChange) -> Result<()> {
        if change.status != ServerStatus::Online {
            debug!(
                "Ignoring status {:?} for server {}",
                change.status, change.server_id
            );
            return Ok(());
        }

        let bucket = change.bucket();
        let Some(server) = self.lookup_online(&bucket).await? else {
            // Directory view lags the broker; skip and let the next UPDATE
            // re-trigger matching.
            debug!("No online server found for {} on STATUS, skipping", bucket);
            return Ok(());
        };

        self.spawn_batch(bucket, server).await;
        Ok(())
    }

    /// Run a match batch in the background, reaping finished batches as we go
    async fn spawn_batch(&self, bucket: BucketKey, server: ServerRecord) {
        let matcher = self.matcher.clone();
        let mut batches = self.batches.lock().await;

        while batches.try_join_next().is_some() {}

        batches.spawn(async move {
            match matcher.run(&bucket, &server).await {
                Ok(outcome) if outcome.joined > 0 => {
                    info!(
                        "Batch complete for {}: {} players joined {}",
                        bucket, outcome.joined, server.id
                    );
                }
                Ok(_) => {}
                Err(e) => match e.downcast_ref::<MatchmakerError>() {
                    // A full server is an expected race, not a failure
                    Some(MatchmakerError::NoCapacity { server_id }) => {
                        debug!("Server {} filled before the batch ran", server_id);
                    }
                    _ => warn!("Match batch for {} failed: {}", bucket, e),
                },
            }
        });
    }

    /// Wait for all in-flight batches to finish. Test-facing; production
    /// shutdown aborts instead.
    pub async fn flush_batches(&self) {
        let mut batches = self.batches.lock().await;
        while batches.join_next().await.is_some() {}
    }

    /// Abort in-flight batches during shutdown
    pub async fn shutdown(&self) {
        let mut batches = self.batches.lock().await;
        batches.abort_all();
        while batches.join_next().await.is_some() {}
        info!("Coordinator shut down, all batches stopped");
    }
}

#[async_trait]
impl CoordinationHandler for QueueCoordinator {
    async fn handle(&self, message: CoordinationMessage) -> Result<()> {
        match message {
            CoordinationMessage::Update(update) => self.handle_update(update).await,
            CoordinationMessage::Status(change) => self.handle_status(change).await,
        }
    }
}
