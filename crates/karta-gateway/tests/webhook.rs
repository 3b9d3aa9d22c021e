//! End-to-end webhook tests against the full router with in-memory stores.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use karta_core::store::{MemoryCacheStore, MemoryIdempotencyStore, MemoryPendingAuthStore, MemoryReplayStore};
use karta_core::types::CachedPosition;
use karta_core::{
    CoreResult, DebtQueue, DecisionConfig, DecisionCore, NoRefresh, PositionCache,
};
use karta_gateway::ingress::{sign, RateLimiter, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use karta_gateway::{build_router, AppState};

const SECRET: &[u8] = b"issuer-secret";
const INTERNAL_TOKEN: &str = "internal-token";

#[derive(Default)]
struct RecordingQueue {
    jobs: Mutex<Vec<(String, String, u64)>>,
}

#[async_trait]
impl DebtQueue for RecordingQueue {
    async fn enqueue_record_debt(
        &self,
        owner: &str,
        amount_usd_micro: u64,
        _auth_id: &str,
        idempotency_key: &str,
    ) -> CoreResult<()> {
        self.jobs.lock().unwrap().push((
            "record".into(),
            format!("{owner}:{idempotency_key}"),
            amount_usd_micro,
        ));
        Ok(())
    }

    async fn enqueue_repay_debt(
        &self,
        owner: &str,
        amount_usd_micro: u64,
        idempotency_key: &str,
    ) -> CoreResult<()> {
        self.jobs.lock().unwrap().push((
            "repay".into(),
            format!("{owner}:{idempotency_key}"),
            amount_usd_micro,
        ));
        Ok(())
    }
}

struct Harness {
    app: Router,
    cache: Arc<PositionCache>,
    queue: Arc<RecordingQueue>,
}

fn harness() -> Harness {
    harness_with_rate_limit(600)
}

fn harness_with_rate_limit(max_requests: usize) -> Harness {
    let cache = Arc::new(PositionCache::new(
        Arc::new(MemoryCacheStore::new()),
        Duration::from_secs(60),
    ));
    let queue = Arc::new(RecordingQueue::default());
    let decision = Arc::new(DecisionCore::new(
        cache.clone(),
        Arc::new(MemoryPendingAuthStore::new()),
        queue.clone(),
        Arc::new(NoRefresh),
        DecisionConfig::default(),
    ));
    let state = Arc::new(AppState {
        secret: SECRET.to_vec(),
        timestamp_window_secs: 300,
        replay_ttl: Duration::from_secs(24 * 3600),
        idempotency_ttl: Duration::from_secs(24 * 3600),
        replay: Arc::new(MemoryReplayStore::new()),
        idempotency: Arc::new(MemoryIdempotencyStore::new()),
        decision,
        cache: cache.clone(),
        limiter: RateLimiter::new(Duration::from_secs(60), max_requests),
        internal_token: INTERNAL_TOKEN.to_string(),
    });
    Harness {
        app: build_router(state),
        cache,
        queue,
    }
}

async fn seed_position(h: &Harness, owner: &str, card_token: &str) {
    let now = chrono::Utc::now().timestamp();
    h.cache
        .put_position(&CachedPosition {
            owner: owner.into(),
            collateral_value_usd_micro: 750_000_000,
            debt_usd_micro: 0,
            available_credit_usd_micro: 450_000_000,
            health_factor_bps: u64::MAX,
            index_snapshot: 0,
            version: now,
            as_of_unix: now,
            oracle_stale: false,
        })
        .await
        .unwrap();
    h.cache.link_card(card_token, owner).await.unwrap();
}

fn signed_request(body: &str, timestamp: i64) -> Request<Body> {
    let ts = timestamp.to_string();
    let signature = sign(SECRET, &ts, body.as_bytes());
    Request::builder()
        .method("POST")
        .uri("/webhooks/card")
        .header("content-type", "application/json")
        .header(TIMESTAMP_HEADER, ts)
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

fn auth_request_body(auth_id: &str, amount_minor: u64, card_token: &str) -> String {
    serde_json::json!({
        "event_id": format!("evt_{auth_id}"),
        "type": "authorization.request",
        "data": {
            "authorization": {"id": auth_id},
            "amount": amount_minor,
            "card_token": card_token,
            "merchant": {"name": "ACME", "category": "5411", "country": "US"}
        }
    })
    .to_string()
}

fn capture_body(auth_id: &str, amount_minor: u64) -> String {
    serde_json::json!({
        "event_id": format!("evt_cap_{auth_id}"),
        "type": "transaction.created",
        "data": {
            "transaction": {"id": auth_id},
            "amount": amount_minor
        }
    })
    .to_string()
}

#[tokio::test]
async fn test_approve_path() {
    let h = harness();
    seed_position(&h, "owner_1", "card_1").await;

    let now = chrono::Utc::now().timestamp();
    let (status, body) = send(&h.app, signed_request(&auth_request_body("auth_1", 5_000, "card_1"), now)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approved"], true);
    assert_eq!(body["authorization_amount"], 5_000);
}

#[tokio::test]
async fn test_bad_signature_rejected() {
    let h = harness();
    let now = chrono::Utc::now().timestamp();
    let body = auth_request_body("auth_1", 5_000, "card_1");
    let mut request = signed_request(&body, now);
    // tamper one byte after signing
    let tampered = body.replacen("5000", "5001", 1);
    *request.body_mut() = Body::from(tampered);

    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stale_timestamp_rejected() {
    let h = harness();
    let stale = chrono::Utc::now().timestamp() - 301;
    let (status, body) = send(&h.app, signed_request(&auth_request_body("auth_1", 5_000, "card_1"), stale)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "TIMESTAMP_OUT_OF_WINDOW");
}

#[tokio::test]
async fn test_replay_rejected_with_conflict() {
    let h = harness();
    seed_position(&h, "owner_1", "card_1").await;

    let now = chrono::Utc::now().timestamp();
    let body = auth_request_body("auth_1", 5_000, "card_1");
    let (first_status, _) = send(&h.app, signed_request(&body, now)).await;
    assert_eq!(first_status, StatusCode::OK);

    // identical (timestamp, signature) pair
    let (second_status, second_body) = send(&h.app, signed_request(&body, now)).await;
    assert_eq!(second_status, StatusCode::CONFLICT);
    assert_eq!(second_body["error"], "REPLAY_DETECTED");
}

#[tokio::test]
async fn test_capture_commits_once_and_duplicate_is_marked() {
    let h = harness();
    seed_position(&h, "owner_1", "card_1").await;

    let now = chrono::Utc::now().timestamp();
    send(&h.app, signed_request(&auth_request_body("auth_1", 5_000, "card_1"), now)).await;

    // same event redelivered two seconds later with a fresh signature
    let capture = capture_body("auth_1", 5_000);
    let (s1, b1) = send(&h.app, signed_request(&capture, now + 1)).await;
    let (s2, b2) = send(&h.app, signed_request(&capture, now + 3)).await;

    assert_eq!(s1, StatusCode::OK);
    assert_eq!(s2, StatusCode::OK);
    assert_eq!(b1["received"], true);
    assert_eq!(b2["received"], true);
    assert_eq!(b2["duplicate"], true);
    // identical apart from the duplicate marker
    let mut b2_stripped = b2.clone();
    b2_stripped.as_object_mut().unwrap().remove("duplicate");
    assert_eq!(b1, b2_stripped);

    let jobs = h.queue.jobs.lock().unwrap();
    assert_eq!(jobs.len(), 1, "exactly one on-chain mutation");
    assert_eq!(jobs[0].2, 50_000_000);
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let h = harness_with_rate_limit(2);
    let now = chrono::Utc::now().timestamp();
    for i in 0..2 {
        let body = auth_request_body(&format!("auth_{i}"), 100, "card_1");
        let (status, _) = send(&h.app, signed_request(&body, now + i)).await;
        assert_ne!(status, StatusCode::TOO_MANY_REQUESTS);
    }
    let body = auth_request_body("auth_over", 100, "card_1");
    let (status, json) = send(&h.app, signed_request(&body, now + 10)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_card_link_requires_bearer_token() {
    let h = harness();
    let request = Request::builder()
        .method("POST")
        .uri("/internal/cards")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::json!({"card_token": "card_1", "owner": "owner_1"}).to_string(),
        ))
        .unwrap();
    let (status, _) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method("POST")
        .uri("/internal/cards")
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {INTERNAL_TOKEN}"))
        .body(Body::from(
            serde_json::json!({"card_token": "card_1", "owner": "owner_1"}).to_string(),
        ))
        .unwrap();
    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["linked"], true);
    assert_eq!(
        h.cache.owner_for_card("card_1").await.unwrap().as_deref(),
        Some("owner_1")
    );
}

#[tokio::test]
async fn test_malformed_event_returns_processing_error() {
    let h = harness();
    let now = chrono::Utc::now().timestamp();
    let (status, body) = send(&h.app, signed_request("{\"not\": \"an event\"}", now)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "PROCESSING_ERROR");
}
