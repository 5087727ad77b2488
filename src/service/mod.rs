//! Service wiring: application state, lifecycle, and the health endpoint

pub mod app;
pub mod health;

// Re-export commonly used types
pub use app::AppState;
pub use health::{health_handler, HealthResponse, HealthState};
