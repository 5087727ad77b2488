//! WebSocket session lifecycle
//!
//! One task per connection. The session validates the ticket from the
//! authorization header, registers it, announces the queue join, then pumps
//! notifications out until the client leaves, the server shuts down, or the
//! admission flow finishes. Rejections close with the policy code 1008 and
//! a machine-readable reason.

use crate::amqp::ChangeType;
use crate::error::MatchmakerError;
use crate::matchmaker::QueueCoordinator;
use crate::ticket::{TicketCodec, TicketRegistry};
use crate::types::{CloseReason, Notification, StatusUpdate, Ticket, POLICY_CLOSE_CODE};
use crate::utils;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Shared state for the session endpoint
pub struct SessionContext {
    pub registry: Arc<TicketRegistry>,
    pub coordinator: Arc<QueueCoordinator>,
    pub codec: TicketCodec,
    /// How far priority tickets are shifted ahead in the queue ordering
    pub priority_offset: chrono::Duration,
    pub shutdown: watch::Receiver<bool>,
}

/// Upgrade handler for the matchmaking endpoint
pub async fn ws_handler(
    State(ctx): State<Arc<SessionContext>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let authorization = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    ws.on_upgrade(move |socket| run_session(socket, ctx, authorization))
}

/// Map a ticket decode failure to the close reason sent to the client
fn rejection_reason(error: &anyhow::Error) -> CloseReason {
    error
        .downcast_ref::<MatchmakerError>()
        .map(MatchmakerError::close_reason)
        .unwrap_or(CloseReason::InvalidPayload)
}

async fn run_session(
    mut socket: WebSocket,
    ctx: Arc<SessionContext>,
    authorization: Option<String>,
) {
    let Some(authorization) = authorization else {
        debug!("Connection without authorization header rejected");
        close_with(&mut socket, CloseReason::InvalidPayload).await;
        return;
    };

    let parsed = match ctx.codec.decode(&authorization, Utc::now()) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Ticket rejected: {}", e);
            close_with(&mut socket, rejection_reason(&e)).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let join_time = utils::effective_join_time(Utc::now(), parsed.priority, ctx.priority_offset);
    let ticket = Arc::new(Ticket::new(
        parsed.player_id.clone(),
        parsed.bucket.clone(),
        parsed.priority,
        join_time,
        tx,
    ));

    if !ctx.registry.try_add(ticket.clone()) {
        info!("Player {} is already queued, closing", parsed.player_id);
        close_with(&mut socket, CloseReason::AlreadyQueued).await;
        return;
    }

    info!(
        "Player {} queued in bucket {} (priority: {})",
        parsed.player_id, parsed.bucket, parsed.priority
    );

    // Seed the client state machine through the same channel the matcher
    // uses, so everything reaches the socket in order.
    let connected = ctx.registry.bucket_size(&parsed.bucket);
    let total = ctx.registry.len();
    for update in [
        StatusUpdate::Connecting,
        StatusUpdate::Waiting {
            total_players: total,
            connected_players: connected,
        },
    ] {
        if let Err(e) = ticket.notify(Notification::StatusUpdate(update)) {
            debug!("Initial notification dropped: {}", e);
        }
    }

    if let Err(e) = ctx
        .coordinator
        .announce_update(&parsed.bucket, ChangeType::New)
        .await
    {
        warn!(
            "Queue join announcement failed for {}: {}",
            parsed.player_id, e
        );
    }

    let mut shutdown = ctx.shutdown.clone();
    let mut close_reason = None;

    loop {
        tokio::select! {
            notification = rx.recv() => {
                let Some(notification) = notification else { break };
                match serde_json::to_string(&notification) {
                    Ok(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            debug!("Socket send failed for {}", parsed.player_id);
                            break;
                        }
                    }
                    Err(e) => error!("Failed to serialize notification: {}", e),
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Clients have nothing to say after the ticket
                    }
                    Some(Err(e)) => {
                        debug!("Socket error for {}: {}", parsed.player_id, e);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    close_reason = Some(CloseReason::ShuttingDown);
                    break;
                }
            }
        }
    }

    if let Some(reason) = close_reason {
        close_with(&mut socket, reason).await;
    }

    // Announce the departure only if this session still owned a ticket
    if ctx.registry.remove(&parsed.player_id) {
        if let Err(e) = ctx
            .coordinator
            .announce_update(&parsed.bucket, ChangeType::Close)
            .await
        {
            warn!(
                "Queue leave announcement failed for {}: {}",
                parsed.player_id, e
            );
        }
    }

    info!("Session ended for player {}", parsed.player_id);
}

async fn close_with(socket: &mut WebSocket, reason: CloseReason) {
    let frame = CloseFrame {
        code: POLICY_CLOSE_CODE,
        reason: reason.as_str().into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!("Close frame not delivered: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_reason_mapping() {
        let expired: anyhow::Error = MatchmakerError::TimestampExpired { age_secs: 45 }.into();
        assert_eq!(rejection_reason(&expired), CloseReason::TimestampExpired);

        let dup: anyhow::Error = MatchmakerError::AlreadyQueued {
            player_id: "p".to_string(),
        }
        .into();
        assert_eq!(rejection_reason(&dup), CloseReason::AlreadyQueued);

        let other = anyhow::anyhow!("boom");
        assert_eq!(rejection_reason(&other), CloseReason::InvalidPayload);
    }
}
