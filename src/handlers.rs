use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::store::Storage;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub gc_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health endpoint, never throttled.
pub async fn health_check(State(storage): State<Arc<Storage>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        gc_enabled: storage.gc_enabled(),
    })
}

pub async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "pong".to_string(),
    })
}

/// Stands in for an expensive operation guarded by a long cooldown.
pub async fn report() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "report scheduled".to_string(),
    })
}
