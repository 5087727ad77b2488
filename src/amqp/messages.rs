//! Coordination message definitions and serialization
//!
//! Every service instance publishes and consumes these messages on the
//! shared `matchmaker` queue. Delivery is competing-consumer and
//! at-least-once, so handlers stay idempotent.

use crate::error::{MatchmakerError, Result};
use crate::types::{BucketKey, Region, ServerStatus};
use serde::{Deserialize, Serialize};

/// Name of the shared coordination queue
pub const MATCHMAKER_QUEUE: &str = "matchmaker";

/// Kind of queue membership change carried by an `UPDATE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeType {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "CLOSE")]
    Close,
}

/// Queue membership change for one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueUpdate {
    pub region: Region,
    pub playlist: String,
    #[serde(rename = "customkey")]
    pub custom_key: String,
    pub season: u32,
    /// Queue depth on the publishing instance at publish time
    #[serde(rename = "clientAmount")]
    pub client_amount: usize,
    #[serde(rename = "type")]
    pub change: ChangeType,
}

impl QueueUpdate {
    pub fn new(bucket: &BucketKey, queue_depth: usize, change: ChangeType) -> Self {
        Self {
            region: bucket.region,
            playlist: bucket.playlist.clone(),
            custom_key: bucket.custom_key.clone(),
            season: bucket.season,
            client_amount: queue_depth,
            change,
        }
    }

    pub fn bucket(&self) -> BucketKey {
        BucketKey {
            region: self.region,
            playlist: self.playlist.clone(),
            custom_key: self.custom_key.clone(),
            season: self.season,
        }
    }
}

/// Server status transition for one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatusChange {
    pub region: Region,
    pub playlist: String,
    #[serde(rename = "customkey")]
    pub custom_key: String,
    pub season: u32,
    #[serde(rename = "serverId")]
    pub server_id: String,
    pub status: ServerStatus,
}

impl ServerStatusChange {
    pub fn new(bucket: &BucketKey, server_id: &str, status: ServerStatus) -> Self {
        Self {
            region: bucket.region,
            playlist: bucket.playlist.clone(),
            custom_key: bucket.custom_key.clone(),
            season: bucket.season,
            server_id: server_id.to_string(),
            status,
        }
    }

    pub fn bucket(&self) -> BucketKey {
        BucketKey {
            region: self.region,
            playlist: self.playlist.clone(),
            custom_key: self.custom_key.clone(),
            season: self.season,
        }
    }
}

/// Union of all coordination messages: `{ action, data }` on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum CoordinationMessage {
    #[serde(rename = "UPDATE")]
    Update(QueueUpdate),
    #[serde(rename = "STATUS")]
    Status(ServerStatusChange),
}

impl CoordinationMessage {
    /// Serialize the message to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            MatchmakerError::InternalError {
                message: format!("Failed to serialize coordination message: {}", e),
            }
            .into()
        })
    }

    /// Deserialize a message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            MatchmakerError::InvalidPayload {
                reason: format!("Failed to deserialize coordination message: {}", e),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_CUSTOM_KEY;

    fn test_bucket() -> BucketKey {
        BucketKey {
            region: Region::Nae,
            playlist: "solo".to_string(),
            custom_key: DEFAULT_CUSTOM_KEY.to_string(),
            season: 1,
        }
    }

    #[test]
    fn test_update_wire_format() {
        let update = QueueUpdate::new(&test_bucket(), 4, ChangeType::New);
        let message = CoordinationMessage::Update(update);

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "action": "UPDATE",
                "data": {
                    "region": "NAE",
                    "playlist": "solo",
                    "customkey": "none",
                    "season": 1,
                    "clientAmount": 4,
                    "type": "NEW"
                }
            })
        );
    }

    #[test]
    fn test_status_wire_format() {
        let change = ServerStatusChange::new(&test_bucket(), "srv-7", ServerStatus::Online);
        let message = CoordinationMessage::Status(change);

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "action": "STATUS",
                "data": {
                    "region": "NAE",
                    "playlist": "solo",
                    "customkey": "none",
                    "season": 1,
                    "serverId": "srv-7",
                    "status": "online"
                }
            })
        );
    }

    #[test]
    fn test_roundtrip_preserves_bucket() {
        let update = QueueUpdate::new(&test_bucket(), 0, ChangeType::Close);
        let message = CoordinationMessage::Update(update.clone());

        let bytes = message.to_bytes().unwrap();
        let decoded = CoordinationMessage::from_bytes(&bytes).unwrap();

        match decoded {
            CoordinationMessage::Update(decoded) => {
                assert_eq!(decoded.bucket(), test_bucket());
                assert_eq!(decoded.change, ChangeType::Close);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(CoordinationMessage::from_bytes(b"not json").is_err());
        assert!(CoordinationMessage::from_bytes(b"{\"action\":\"DELETE\",\"data\":{}}").is_err());
    }
}
