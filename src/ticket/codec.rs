//! Ticket decryption and admission validation
//!
//! The authorization header's final whitespace-delimited token is a
//! base64-encoded AES-256-GCM ciphertext (12-byte nonce prepended) of a
//! JSON ticket request. Decoding is pure validation: no side effects.

use crate::error::{MatchmakerError, Result};
use crate::ticket::bucket;
use crate::types::{BucketKey, PlayerId, Role};
use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Decrypted ticket request document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRequest {
    pub player_id: String,
    /// Composite routing identifier, `netcl:hotfix:REGION:playlist`
    pub bucket_id: String,
    pub attributes: TicketAttributes,
    pub expire_at: DateTime<Utc>,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// Attributes map carried inside the ticket request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketAttributes {
    #[serde(rename = "player.role")]
    pub role: Role,
    #[serde(rename = "player.season")]
    pub season: u32,
    #[serde(rename = "player.option.customKey", default)]
    pub custom_key: Option<String>,
    /// Client-presentation fields the gateway carries but does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Fully validated admission request: everything a session needs to queue
#[derive(Debug, Clone)]
pub struct ParsedTicket {
    pub player_id: PlayerId,
    pub bucket: BucketKey,
    pub priority: bool,
}

/// Decrypts and validates inbound authorization payloads
pub struct TicketCodec {
    cipher: Aes256Gcm,
    freshness_window: Duration,
}

impl TicketCodec {
    /// Build a codec from the pre-shared passphrase. The AES-256 key is the
    /// SHA-256 digest of the passphrase.
    pub fn new(passphrase: &str, freshness_window: Duration) -> Self {
        let key = Sha256::digest(passphrase.as_bytes());
        let cipher =
            Aes256Gcm::new_from_slice(&key).expect("SHA-256 digest is a valid AES-256 key");

        Self {
            cipher,
            freshness_window,
        }
    }

    /// Decode an authorization header value into a validated ticket.
    ///
    /// Tolerates 3- and 4-token header forms; the final token is always the
    /// ciphertext. Tickets at or past the freshness window are rejected.
    pub fn decode(&self, authorization: &str, now: DateTime<Utc>) -> Result<ParsedTicket> {
        let token = authorization.split_whitespace().last().ok_or_else(|| {
            MatchmakerError::InvalidPayload {
                reason: "empty authorization header".to_string(),
            }
        })?;

        let raw = BASE64
            .decode(token)
            .map_err(|_| MatchmakerError::InvalidPayload {
                reason: "ciphertext is not valid base64".to_string(),
            })?;
        if raw.len() <= NONCE_LEN {
            return Err(MatchmakerError::InvalidPayload {
                reason: "ciphertext too short".to_string(),
            }
            .into());
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| MatchmakerError::InvalidPayload {
                reason: "ticket decryption failed".to_string(),
            })?;

        let request: TicketRequest =
            serde_json::from_slice(&plaintext).map_err(|e| MatchmakerError::InvalidPayload {
                reason: format!("ticket schema violation: {}", e),
            })?;

        if request.player_id.is_empty() {
            return Err(MatchmakerError::InvalidPayload {
                reason: "player id cannot be empty".to_string(),
            }
            .into());
        }

        let age = now.signed_duration_since(request.expire_at);
        if age >= self.freshness_window {
            return Err(MatchmakerError::TimestampExpired {
                age_secs: age.num_seconds(),
            }
            .into());
        }

        let bucket = bucket::derive_bucket(&request)?;
        let priority = request.attributes.role.is_priority();

        Ok(ParsedTicket {
            player_id: request.player_id,
            bucket,
            priority,
        })
    }

    /// Encrypt a ticket request into the token form `decode` accepts.
    /// Used by the tester tool and tests.
    pub fn encrypt(&self, request: &TicketRequest) -> Result<String> {
        let plaintext =
            serde_json::to_vec(request).map_err(|e| MatchmakerError::InternalError {
                message: format!("Failed to serialize ticket request: {}", e),
            })?;

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|_| MatchmakerError::InternalError {
                message: "ticket encryption failed".to_string(),
            })?;

        let mut framed = nonce.to_vec();
        framed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(framed))
    }
}
