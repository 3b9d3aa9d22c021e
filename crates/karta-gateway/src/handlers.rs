use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use karta_core::{idempotency_key, CardEvent, StoredResponse, WebhookEnvelope};

use crate::ingress::{self, IngressError, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::AppState;

fn respond(status: StatusCode, body: serde_json::Value) -> Response {
    (status, Json(body)).into_response()
}

fn stored_to_response(stored: &StoredResponse) -> Response {
    let status = StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK);
    respond(status, stored.body.clone())
}

pub async fn webhook(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let source_ip: IpAddr = connect_info
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));

    if !state.limiter.allow(source_ip) {
        warn!(%source_ip, "rate limited");
        return respond(
            StatusCode::TOO_MANY_REQUESTS,
            json!({"error": "RATE_LIMITED"}),
        );
    }

    let timestamp_raw = match headers.get(TIMESTAMP_HEADER).and_then(|v| v.to_str().ok()) {
        Some(v) => v.to_string(),
        None => return respond(StatusCode::UNAUTHORIZED, json!({"error": "MISSING_TIMESTAMP"})),
    };
    let signature = match headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(v) => v.to_string(),
        None => return respond(StatusCode::UNAUTHORIZED, json!({"error": "MISSING_SIGNATURE"})),
    };

    // HMAC first, window second: an attacker learns nothing about our clock
    if ingress::verify_signature(&state.secret, &timestamp_raw, &body, &signature).is_err() {
        warn!(%source_ip, "signature mismatch");
        return respond(StatusCode::UNAUTHORIZED, json!({"error": "BAD_SIGNATURE"}));
    }
    let now = chrono::Utc::now().timestamp();
    let timestamp: i64 = match timestamp_raw.parse() {
        Ok(ts) => ts,
        Err(_) => return respond(StatusCode::UNAUTHORIZED, json!({"error": "BAD_TIMESTAMP"})),
    };
    if let Err(IngressError::TimestampOutOfWindow) =
        ingress::check_timestamp(now, timestamp, state.timestamp_window_secs)
    {
        return respond(
            StatusCode::UNAUTHORIZED,
            json!({"error": "TIMESTAMP_OUT_OF_WINDOW"}),
        );
    }

    match state.replay.insert(timestamp, &signature, state.replay_ttl).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(%source_ip, timestamp, "replay detected");
            return respond(StatusCode::CONFLICT, json!({"error": "REPLAY_DETECTED"}));
        }
        Err(err) => {
            warn!(%err, "replay store unavailable; failing closed");
            return respond(StatusCode::CONFLICT, json!({"error": "REPLAY_DETECTED"}));
        }
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(%err, "unparseable webhook body");
            return respond(
                StatusCode::OK,
                json!({"received": true, "error": "PROCESSING_ERROR"}),
            );
        }
    };
    let event = match CardEvent::from_envelope(envelope) {
        Ok(event) => event,
        Err(err) => {
            warn!(%err, "invalid webhook event");
            return respond(
                StatusCode::OK,
                json!({"received": true, "error": "PROCESSING_ERROR"}),
            );
        }
    };

    let key = idempotency_key(event.auth_id(), event.event_type());
    match state.idempotency.get(&key).await {
        Ok(Some(cached)) => {
            info!(auth_id = event.auth_id(), "duplicate delivery; replaying cached response");
            let mut body = cached.body.clone();
            if let Some(map) = body.as_object_mut() {
                map.insert("duplicate".into(), json!(true));
            }
            return respond(
                StatusCode::from_u16(cached.status).unwrap_or(StatusCode::OK),
                body,
            );
        }
        Ok(None) => {}
        Err(err) => {
            warn!(%err, "idempotency store read failed");
        }
    }

    let stored = state.decision.handle(event, now).await;
    if let Err(err) = state
        .idempotency
        .put(&key, &stored, state.idempotency_ttl)
        .await
    {
        warn!(%err, "idempotency store write failed");
    }
    stored_to_response(&stored)
}

#[derive(Debug, Deserialize)]
pub struct LinkCardRequest {
    pub card_token: String,
    pub owner: String,
}

/// Internal surface for the external enrollment service: binds an issued
/// card token to a position owner.
pub async fn link_card(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LinkCardRequest>,
) -> Response {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == state.internal_token);
    if !authorized {
        return respond(StatusCode::UNAUTHORIZED, json!({"error": "UNAUTHORIZED"}));
    }

    match state.cache.link_card(&request.card_token, &request.owner).await {
        Ok(()) => {
            info!(owner = %request.owner, "card token linked");
            respond(StatusCode::OK, json!({"linked": true}))
        }
        Err(err) => {
            warn!(%err, "card link failed");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({"error": "STORE_UNAVAILABLE"}),
            )
        }
    }
}

pub async fn healthz() -> Response {
    respond(StatusCode::OK, json!({"ok": true}))
}
