//! Karta webhook gateway: the HTTP edge between the card issuer and the
//! authorization decision core.

pub mod config;
pub mod handlers;
pub mod ingress;

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use karta_core::store::{IdempotencyStore, ReplayStore};
use karta_core::{DecisionCore, PositionCache};

use crate::ingress::RateLimiter;

pub struct AppState {
    pub secret: Vec<u8>,
    pub timestamp_window_secs: i64,
    pub replay_ttl: Duration,
    pub idempotency_ttl: Duration,
    pub replay: Arc<dyn ReplayStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub decision: Arc<DecisionCore>,
    pub cache: Arc<PositionCache>,
    pub limiter: RateLimiter,
    pub internal_token: String,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhooks/card", post(handlers::webhook))
        .route("/internal/cards", post(handlers::link_card))
        .route("/healthz", get(handlers::healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
