//! Game server directory
//!
//! Tracks the game servers eligible to receive matched players. The matcher
//! only ever needs two operations: find an online server for a bucket and
//! record that players were sent to it. Production deployments back this
//! with the fleet manager; the in-memory implementation covers single-node
//! operation and tests.

use crate::error::{MatchmakerError, Result};
use crate::types::{BucketKey, ServerRecord, ServerStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Lookup and occupancy tracking for game servers
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Find an online server whose bucket matches exactly
    async fn find_online(&self, bucket: &BucketKey) -> Result<Option<ServerRecord>>;

    /// Reserve up to `delta` seats on a server. Returns how many were
    /// actually granted; a full server grants zero. The read-modify-write
    /// must be safe for concurrent callers, since matching batches for the
    /// same server can run on several instances at once.
    async fn increment_players(&self, server_id: &str, delta: u32) -> Result<u32>;
}

/// In-memory directory keyed by server id
#[derive(Default)]
pub struct InMemoryServerDirectory {
    servers: RwLock<HashMap<String, ServerRecord>>,
}

impl InMemoryServerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a server record
    pub async fn upsert(&self, record: ServerRecord) {
        info!(
            "Registered server {} for bucket {} ({:?})",
            record.id,
            record.bucket(),
            record.status
        );
        self.servers.write().await.insert(record.id.clone(), record);
    }

    /// Transition a server's status. Occupancy is reset on every transition;
    /// a server reports its own live player count when it comes back online.
    pub async fn set_status(&self, server_id: &str, status: ServerStatus) -> Result<()> {
        let mut servers = self.servers.write().await;
        let record = servers
            .get_mut(server_id)
            .ok_or_else(|| MatchmakerError::ServerNotFound {
                server_id: server_id.to_string(),
            })?;

        debug!(
            "Server {} status {:?} -> {:?}",
            server_id, record.status, status
        );
        record.status = status;
        record.players = 0;
        Ok(())
    }

    pub async fn get(&self, server_id: &str) -> Option<ServerRecord> {
        self.servers.read().await.get(server_id).cloned()
    }
}

#[async_trait]
impl ServerDirectory for InMemoryServerDirectory {
    async fn find_online(&self, bucket: &BucketKey) -> Result<Option<ServerRecord>> {
        let servers = self.servers.read().await;
        Ok(servers
            .values()
            .find(|s| s.status == ServerStatus::Online && s.bucket() == *bucket)
            .cloned())
    }

    async fn increment_players(&self, server_id: &str, delta: u32) -> Result<u32> {
        let mut servers = self.servers.write().await;
        let record = servers
            .get_mut(server_id)
            .ok_or_else(|| MatchmakerError::ServerNotFound {
                server_id: server_id.to_string(),
            })?;

        // A server with unknown capacity grants nothing
        let cap = record.max_players.unwrap_or(record.players);
        let granted = delta.min(cap.saturating_sub(record.players));
        record.players += granted;
        debug!(
            "Server {} granted {} of {} seats, occupancy now {}/{:?}",
            server_id, granted, delta, record.players, record.max_players
        );
        Ok(granted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Region, DEFAULT_CUSTOM_KEY};

    fn server(id: &str, playlist: &str, status: ServerStatus, max: Option<u32>) -> ServerRecord {
        ServerRecord {
            id: id.to_string(),
            region: Region::Eu,
            playlist: playlist.to_string(),
            custom_key: DEFAULT_CUSTOM_KEY.to_string(),
            season: 1,
            status,
            max_players: max,
            players: 0,
        }
    }

    fn bucket(playlist: &str) -> BucketKey {
        BucketKey {
            region: Region::Eu,
            playlist: playlist.to_string(),
            custom_key: DEFAULT_CUSTOM_KEY.to_string(),
            season: 1,
        }
    }

    #[tokio::test]
    async fn test_find_online_requires_exact_bucket_and_status() {
        let directory = InMemoryServerDirectory::new();
        directory
            .upsert(server("offline-1", "solo", ServerStatus::Offline, Some(100)))
            .await;
        directory
            .upsert(server("duo-1", "duos", ServerStatus::Online, Some(100)))
            .await;

        assert!(directory.find_online(&bucket("solo")).await.unwrap().is_none());

        directory
            .upsert(server("solo-1", "solo", ServerStatus::Online, Some(100)))
            .await;
        let found = directory.find_online(&bucket("solo")).await.unwrap().unwrap();
        assert_eq!(found.id, "solo-1");
    }

    #[tokio::test]
    async fn test_increment_grants_only_remaining_seats() {
        let directory = InMemoryServerDirectory::new();
        directory
            .upsert(server("s-1", "solo", ServerStatus::Online, Some(3)))
            .await;

        assert_eq!(directory.increment_players("s-1", 2).await.unwrap(), 2);
        assert_eq!(directory.increment_players("s-1", 2).await.unwrap(), 1);
        assert_eq!(directory.increment_players("s-1", 2).await.unwrap(), 0);

        assert_eq!(directory.get("s-1").await.unwrap().players, 3);
    }

    #[tokio::test]
    async fn test_increment_without_capacity_grants_nothing() {
        let directory = InMemoryServerDirectory::new();
        directory
            .upsert(server("s-1", "solo", ServerStatus::Online, None))
            .await;

        assert_eq!(directory.increment_players("s-1", 4).await.unwrap(), 0);
        assert_eq!(directory.get("s-1").await.unwrap().players, 0);
    }

    #[tokio::test]
    async fn test_increment_unknown_server_errors() {
        let directory = InMemoryServerDirectory::new();
        let err = directory.increment_players("ghost", 1).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakerError>(),
            Some(MatchmakerError::ServerNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_status_transition_resets_occupancy() {
        let directory = InMemoryServerDirectory::new();
        directory
            .upsert(server("s-1", "solo", ServerStatus::Online, Some(10)))
            .await;
        directory.increment_players("s-1", 5).await.unwrap();

        directory
            .set_status("s-1", ServerStatus::GameStarted)
            .await
            .unwrap();

        let record = directory.get("s-1").await.unwrap();
        assert_eq!(record.status, ServerStatus::GameStarted);
        assert_eq!(record.players, 0);
        assert!(directory.find_online(&bucket("solo")).await.unwrap().is_none());
    }
}
