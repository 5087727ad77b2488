//! Common types used throughout the matchmaking gateway

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::error::{MatchmakerError, Result};
use crate::utils;

/// Unique identifier for players
pub type PlayerId = String;

/// Policy close code used for every rejection and for operator shutdown
pub const POLICY_CLOSE_CODE: u16 = 1008;

/// Sentinel custom key denoting the public/default pool
pub const DEFAULT_CUSTOM_KEY: &str = "none";

/// Game region a server or ticket belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Region {
    Nae,
    Eu,
    Oce,
}

impl FromStr for Region {
    type Err = MatchmakerError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "NAE" => Ok(Region::Nae),
            "EU" => Ok(Region::Eu),
            "OCE" => Ok(Region::Oce),
            other => Err(MatchmakerError::InvalidPayload {
                reason: format!("unknown region: {other}"),
            }),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Region::Nae => write!(f, "NAE"),
            Region::Eu => write!(f, "EU"),
            Region::Oce => write!(f, "OCE"),
        }
    }
}

/// Entitlement role carried in the ticket attributes. Lower rank outranks
/// higher; ranks at or above T3 queue-jump.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "OWNER")]
    Owner,
    #[serde(rename = "DEVELOPER")]
    Developer,
    #[serde(rename = "MODERATOR")]
    Moderator,
    #[serde(rename = "HELPER")]
    Helper,
    #[serde(rename = "T3_USER")]
    T3User,
    #[serde(rename = "T2_USER")]
    T2User,
    #[serde(rename = "T1_USER")]
    T1User,
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "BANNED")]
    Banned,
}

impl Role {
    fn rank(&self) -> u8 {
        match self {
            Role::Owner => 0,
            Role::Developer => 1,
            Role::Moderator => 2,
            Role::T3User => 3,
            Role::T2User => 4,
            Role::T1User => 5,
            Role::Helper => 6,
            Role::User => 7,
            Role::Banned => 8,
        }
    }

    /// Whether tickets from this role are ordered ahead of regular tickets
    pub fn is_priority(&self) -> bool {
        self.rank() <= Role::T3User.rank()
    }
}

/// Grouping unit for queueing and matching. Two tickets match each other,
/// and a server, only if all four fields are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketKey {
    pub region: Region,
    pub playlist: String,
    #[serde(rename = "customkey")]
    pub custom_key: String,
    pub season: u32,
}

impl BucketKey {
    /// Same bucket with a different custom key
    pub fn with_custom_key(&self, custom_key: &str) -> Self {
        Self {
            custom_key: custom_key.to_string(),
            ..self.clone()
        }
    }
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.region, self.playlist, self.custom_key, self.season
        )
    }
}

/// Status of a game server, as written by the admin surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Online,
    Offline,
    GameStarted,
    GameEnded,
}

/// Capacity record for one game server, read from the external directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerRecord {
    pub id: String,
    pub region: Region,
    pub playlist: String,
    pub custom_key: String,
    pub season: u32,
    pub status: ServerStatus,
    pub max_players: Option<u32>,
    pub players: u32,
}

impl ServerRecord {
    pub fn bucket(&self) -> BucketKey {
        BucketKey {
            region: self.region,
            playlist: self.playlist.clone(),
            custom_key: self.custom_key.clone(),
            season: self.season,
        }
    }

    /// Remaining seats; a server with undefined capacity has none
    pub fn free_slots(&self) -> u32 {
        match self.max_players {
            Some(max) if self.players < max => max - self.players,
            _ => 0,
        }
    }
}

/// Close reasons surfaced to clients on the policy close frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    InvalidPayload,
    TimestampExpired,
    AlreadyQueued,
    ShuttingDown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::InvalidPayload => "invalid_payload",
            CloseReason::TimestampExpired => "timestamp_expired",
            CloseReason::AlreadyQueued => "already_queued",
            CloseReason::ShuttingDown => "matchmaker_shutting_down",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-visible state updates, one JSON object per message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state")]
pub enum StatusUpdate {
    Connecting,
    #[serde(rename_all = "camelCase")]
    Waiting {
        total_players: usize,
        connected_players: usize,
    },
    #[serde(rename_all = "camelCase")]
    Queued {
        ticket_id: String,
        queued_players: usize,
        estimated_wait_sec: usize,
        status: u8,
    },
    #[serde(rename_all = "camelCase")]
    SessionAssignment { match_id: String },
}

/// Payload of the final `Play` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayPayload {
    pub match_id: String,
    pub session_id: String,
    pub join_delay_sec: u32,
}

/// Outbound notification envelope: `{ name, payload }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload")]
pub enum Notification {
    StatusUpdate(StatusUpdate),
    Play(PlayPayload),
}

/// Handle used to push notifications to a session. Owned by the connection
/// task; the matcher and coordinator only ever send through it.
pub type NotificationSender = mpsc::UnboundedSender<Notification>;

/// One actively-queued player's matchmaking request
#[derive(Debug)]
pub struct Ticket {
    pub player_id: PlayerId,
    pub bucket: BucketKey,
    pub priority: bool,
    /// Ordering key only; shifted earlier for priority tickets, never shown
    pub join_time: DateTime<Utc>,
    pub ticket_id: String,
    pub match_id: String,
    pub session_id: String,
    notifier: NotificationSender,
    admitted: AtomicBool,
}

impl Ticket {
    pub fn new(
        player_id: PlayerId,
        bucket: BucketKey,
        priority: bool,
        join_time: DateTime<Utc>,
        notifier: NotificationSender,
    ) -> Self {
        Self {
            player_id,
            bucket,
            priority,
            join_time,
            ticket_id: utils::generate_opaque_id(),
            match_id: utils::generate_opaque_id(),
            session_id: utils::generate_opaque_id(),
            notifier,
            admitted: AtomicBool::new(false),
        }
    }

    pub fn is_admitted(&self) -> bool {
        self.admitted.load(Ordering::Acquire)
    }

    /// Flip the one-way admission ratchet. Returns false if the ticket was
    /// already admitted, so concurrent batches admit each ticket once.
    pub fn mark_admitted(&self) -> bool {
        !self.admitted.swap(true, Ordering::AcqRel)
    }

    /// Send a notification to the owning session. A closed session surfaces
    /// as a delivery failure; callers log and continue.
    pub fn notify(&self, notification: Notification) -> Result<()> {
        self.notifier.send(notification).map_err(|_| {
            MatchmakerError::DeliveryFailure {
                player_id: self.player_id.clone(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bucket() -> BucketKey {
        BucketKey {
            region: Region::Nae,
            playlist: "solo".to_string(),
            custom_key: DEFAULT_CUSTOM_KEY.to_string(),
            season: 1,
        }
    }

    #[test]
    fn test_region_parsing() {
        assert_eq!("NAE".parse::<Region>().unwrap(), Region::Nae);
        assert_eq!("EU".parse::<Region>().unwrap(), Region::Eu);
        assert_eq!("OCE".parse::<Region>().unwrap(), Region::Oce);
        assert!("nae".parse::<Region>().is_err());
        assert!("MARS".parse::<Region>().is_err());
    }

    #[test]
    fn test_role_priority_threshold() {
        assert!(Role::Owner.is_priority());
        assert!(Role::Moderator.is_priority());
        assert!(Role::T3User.is_priority());
        assert!(!Role::T2User.is_priority());
        assert!(!Role::Helper.is_priority());
        assert!(!Role::User.is_priority());
        assert!(!Role::Banned.is_priority());
    }

    #[test]
    fn test_notification_wire_shapes() {
        let connecting = Notification::StatusUpdate(StatusUpdate::Connecting);
        assert_eq!(
            serde_json::to_value(&connecting).unwrap(),
            serde_json::json!({"name": "StatusUpdate", "payload": {"state": "Connecting"}})
        );

        let queued = Notification::StatusUpdate(StatusUpdate::Queued {
            ticket_id: "t1".to_string(),
            queued_players: 3,
            estimated_wait_sec: 6,
            status: 3,
        });
        assert_eq!(
            serde_json::to_value(&queued).unwrap(),
            serde_json::json!({
                "name": "StatusUpdate",
                "payload": {
                    "state": "Queued",
                    "ticketId": "t1",
                    "queuedPlayers": 3,
                    "estimatedWaitSec": 6,
                    "status": 3
                }
            })
        );

        let play = Notification::Play(PlayPayload {
            match_id: "m1".to_string(),
            session_id: "s1".to_string(),
            join_delay_sec: 1,
        });
        assert_eq!(
            serde_json::to_value(&play).unwrap(),
            serde_json::json!({
                "name": "Play",
                "payload": {"matchId": "m1", "sessionId": "s1", "joinDelaySec": 1}
            })
        );
    }

    #[test]
    fn test_server_status_wire_strings() {
        assert_eq!(
            serde_json::to_string(&ServerStatus::GameStarted).unwrap(),
            "\"gamestarted\""
        );
        assert_eq!(
            serde_json::from_str::<ServerStatus>("\"online\"").unwrap(),
            ServerStatus::Online
        );
    }

    #[test]
    fn test_free_slots_handles_missing_capacity() {
        let mut server = ServerRecord {
            id: "srv-1".to_string(),
            region: Region::Nae,
            playlist: "solo".to_string(),
            custom_key: DEFAULT_CUSTOM_KEY.to_string(),
            season: 1,
            status: ServerStatus::Online,
            max_players: None,
            players: 0,
        };
        assert_eq!(server.free_slots(), 0);

        server.max_players = Some(10);
        server.players = 7;
        assert_eq!(server.free_slots(), 3);

        server.players = 10;
        assert_eq!(server.free_slots(), 0);
    }

    #[test]
    fn test_admission_is_monotonic() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let ticket = Ticket::new(
            "player-1".to_string(),
            sample_bucket(),
            false,
            Utc::now(),
            tx,
        );

        assert!(!ticket.is_admitted());
        assert!(ticket.mark_admitted());
        assert!(ticket.is_admitted());
        // Second attempt reports the ratchet was already flipped
        assert!(!ticket.mark_admitted());
        assert!(ticket.is_admitted());
    }

    #[test]
    fn test_notify_closed_session_is_delivery_failure() {
        let (tx, rx) = mpsc::unbounded_channel();
        let ticket = Ticket::new(
            "player-1".to_string(),
            sample_bucket(),
            false,
            Utc::now(),
            tx,
        );
        drop(rx);

        let err = ticket
            .notify(Notification::StatusUpdate(StatusUpdate::Connecting))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MatchmakerError>(),
            Some(MatchmakerError::DeliveryFailure { .. })
        ));
    }
}
