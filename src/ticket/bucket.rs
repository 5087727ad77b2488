//! Bucket derivation from a parsed ticket request
//!
//! Pure helpers: split the composite routing identifier into its region and
//! playlist segments and combine them with the attribute-borne custom key
//! and season into the bucket key used for queueing and matching.

use crate::error::{MatchmakerError, Result};
use crate::ticket::codec::TicketRequest;
use crate::types::{BucketKey, Region, DEFAULT_CUSTOM_KEY};

/// Split a `netcl:hotfix:REGION:playlist` routing identifier
pub fn parse_bucket_id(bucket_id: &str) -> Result<(Region, String)> {
    let segments: Vec<&str> = bucket_id.split(':').collect();
    if segments.len() < 4 {
        return Err(MatchmakerError::InvalidPayload {
            reason: format!("malformed bucket id: {bucket_id}"),
        }
        .into());
    }

    let region: Region = segments[2].parse()?;
    let playlist = segments[3];
    if playlist.is_empty() {
        return Err(MatchmakerError::InvalidPayload {
            reason: format!("bucket id has empty playlist: {bucket_id}"),
        }
        .into());
    }

    Ok((region, playlist.to_string()))
}

/// Derive the full bucket key for a validated ticket request
pub fn derive_bucket(request: &TicketRequest) -> Result<BucketKey> {
    let (region, playlist) = parse_bucket_id(&request.bucket_id)?;

    Ok(BucketKey {
        region,
        playlist,
        custom_key: request
            .attributes
            .custom_key
            .clone()
            .unwrap_or_else(|| DEFAULT_CUSTOM_KEY.to_string()),
        season: request.attributes.season,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ticket::codec::TicketAttributes;
    use crate::types::Role;
    use chrono::Utc;

    fn request(bucket_id: &str, custom_key: Option<&str>) -> TicketRequest {
        TicketRequest {
            player_id: "player-1".to_string(),
            bucket_id: bucket_id.to_string(),
            attributes: TicketAttributes {
                role: Role::User,
                season: 4,
                custom_key: custom_key.map(str::to_string),
                extra: serde_json::Map::new(),
            },
            expire_at: Utc::now(),
            nonce: None,
        }
    }

    #[test]
    fn test_parse_bucket_id_segments() {
        let (region, playlist) = parse_bucket_id("1111111:1:EU:playlist_defaultduo").unwrap();
        assert_eq!(region, Region::Eu);
        assert_eq!(playlist, "playlist_defaultduo");
    }

    #[test]
    fn test_parse_rejects_short_and_invalid_ids() {
        assert!(parse_bucket_id("EU:solo").is_err());
        assert!(parse_bucket_id("1:2:ATLANTIS:solo").is_err());
        assert!(parse_bucket_id("1:2:NAE:").is_err());
    }

    #[test]
    fn test_derive_bucket_defaults_custom_key() {
        let bucket = derive_bucket(&request("1:2:NAE:solo", None)).unwrap();
        assert_eq!(bucket.custom_key, DEFAULT_CUSTOM_KEY);
        assert_eq!(bucket.season, 4);
    }

    #[test]
    fn test_derive_bucket_keeps_custom_key() {
        let bucket = derive_bucket(&request("1:2:OCE:squads", Some("scrims"))).unwrap();
        assert_eq!(bucket.region, Region::Oce);
        assert_eq!(bucket.custom_key, "scrims");
    }
}
