//! Health check endpoint

use crate::ticket::TicketRegistry;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queued_players: usize,
    pub uptime_seconds: u64,
}

#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<TicketRegistry>,
    pub started_at: Instant,
}

pub async fn health_handler(State(state): State<HealthState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        queued_players: state.registry.len(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}
