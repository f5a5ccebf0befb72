//! # Health Endpoint
//!
//! HTTP readiness probe for the provider pod. The provider reports ready
//! once its gRPC socket is bound.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const READY_PATH: &str = "/health/ready";
pub const LIVE_PATH: &str = "/health/live";

/// Health check response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    fn new(status: &str) -> Self {
        Self { status: status.to_string() }
    }
}

/// Readiness flag shared between the gRPC listener and the health router.
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    ready: Arc<AtomicBool>,
}

impl Readiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn ready_handler(State(readiness): State<Readiness>) -> (StatusCode, Json<HealthResponse>) {
    if readiness.is_ready() {
        (StatusCode::OK, Json(HealthResponse::new("ok")))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::new("starting")))
    }
}

async fn live_handler() -> (StatusCode, Json<HealthResponse>) {
    (StatusCode::OK, Json(HealthResponse::new("ok")))
}

/// Router serving the readiness and liveness probes.
pub fn health_router(readiness: Readiness) -> Router {
    Router::new()
        .route(READY_PATH, get(ready_handler))
        .route(LIVE_PATH, get(live_handler))
        .with_state(readiness)
}
