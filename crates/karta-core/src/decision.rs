//! Two-phase authorization decision core.
//!
//! Phase one (`authorization.request`) answers approve/decline from the
//! position cache under a hard deadline and never mutates debt. Phase two
//! (`authorization.capture` / `transaction.created`) consults the pending
//! authorization written in phase one and enqueues exactly one on-chain
//! debt mutation. `transaction.updated` reversals and refunds enqueue the
//! protocol-funded repay path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::cache::PositionCache;
use crate::error::CoreResult;
use crate::event::{CardEvent, Merchant, TransactionStatus};
use crate::store::PendingAuthStore;
use crate::types::{
    idempotency_key, minor_units_to_usd_micro, CachedPosition, Decision, DeclineReason,
    PendingAuthorization, StoredResponse,
};

#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Minimum health factor to approve new spend (1.10)
    pub min_health_factor_bps: u64,
    /// Hard per-request deadline; breach declines with TIMEOUT
    pub hard_deadline: Duration,
    /// How long a pending authorization stays consultable; at least the
    /// capture deadline
    pub pending_ttl: Duration,
    pub blocked_mcc: Vec<String>,
    /// Per-authorization ceiling; None = no ceiling
    pub max_authorization_usd_micro: Option<u64>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_health_factor_bps: 11_000,
            hard_deadline: Duration::from_millis(700),
            pending_ttl: Duration::from_secs(7 * 24 * 3600),
            blocked_mcc: Vec::new(),
            max_authorization_usd_micro: None,
        }
    }
}

/// Sink for debt mutations; implemented by the on-chain submission queue.
#[async_trait]
pub trait DebtQueue: Send + Sync {
    async fn enqueue_record_debt(
        &self,
        owner: &str,
        amount_usd_micro: u64,
        auth_id: &str,
        idempotency_key: &str,
    ) -> CoreResult<()>;

    async fn enqueue_repay_debt(
        &self,
        owner: &str,
        amount_usd_micro: u64,
        idempotency_key: &str,
    ) -> CoreResult<()>;
}

/// Synchronous cache refill for misses, budget permitting; implemented by
/// the indexer.
#[async_trait]
pub trait PositionRefresher: Send + Sync {
    async fn refresh(&self, owner: &str) -> CoreResult<Option<CachedPosition>>;
}

/// Refresher that never refreshes; misses fall through to decline.
pub struct NoRefresh;

#[async_trait]
impl PositionRefresher for NoRefresh {
    async fn refresh(&self, _owner: &str) -> CoreResult<Option<CachedPosition>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationResponse {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_reason: Option<DeclineReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_amount: Option<u64>,
}

impl AuthorizationResponse {
    fn approve(amount_minor: u64) -> Self {
        Self {
            approved: true,
            decline_reason: None,
            authorization_amount: Some(amount_minor),
        }
    }

    fn decline(reason: DeclineReason) -> Self {
        Self {
            approved: false,
            decline_reason: Some(reason),
            authorization_amount: None,
        }
    }
}

struct Evaluation {
    reason: Option<DeclineReason>,
    owner: String,
}

impl Evaluation {
    fn declined(reason: DeclineReason, owner: String) -> Self {
        Self {
            reason: Some(reason),
            owner,
        }
    }
}

pub struct DecisionCore {
    cache: Arc<PositionCache>,
    pending: Arc<dyn PendingAuthStore>,
    queue: Arc<dyn DebtQueue>,
    refresher: Arc<dyn PositionRefresher>,
    config: DecisionConfig,
}

impl DecisionCore {
    pub fn new(
        cache: Arc<PositionCache>,
        pending: Arc<dyn PendingAuthStore>,
        queue: Arc<dyn DebtQueue>,
        refresher: Arc<dyn PositionRefresher>,
        config: DecisionConfig,
    ) -> Self {
        Self {
            cache,
            pending,
            queue,
            refresher,
            config,
        }
    }

    /// Process one validated event. Always yields an HTTP-200 body; the
    /// ingress layer owns the security status codes.
    pub async fn handle(&self, event: CardEvent, now_unix: i64) -> StoredResponse {
        match event {
            CardEvent::AuthorizationRequest {
                event_id,
                auth_id,
                amount_minor,
                card_token,
                merchant,
            } => {
                let decided = tokio::time::timeout(
                    self.config.hard_deadline,
                    self.decide_authorization(&auth_id, amount_minor, &card_token, &merchant, now_unix),
                )
                .await;
                let response = match decided {
                    Ok(response) => response,
                    Err(_) => {
                        warn!(%event_id, %auth_id, "decision deadline exceeded");
                        self.record_pending(
                            &auth_id,
                            "",
                            &card_token,
                            0,
                            Decision::Declined(DeclineReason::Timeout),
                            now_unix,
                        )
                        .await;
                        AuthorizationResponse::decline(DeclineReason::Timeout)
                    }
                };
                info!(
                    %event_id,
                    %auth_id,
                    approved = response.approved,
                    reason = response.decline_reason.map(|r| r.as_str()),
                    "authorization decided"
                );
                StoredResponse {
                    status: 200,
                    body: serde_json::to_value(&response).unwrap_or_else(|_| json!({"approved": false})),
                }
            }
            CardEvent::AuthorizationAdvice { event_id, auth_id, .. } => {
                debug!(%event_id, %auth_id, "authorization advice recorded");
                StoredResponse {
                    status: 200,
                    body: json!({"received": true}),
                }
            }
            CardEvent::Capture {
                event_id,
                auth_id,
                amount_minor,
                ..
            } => self.commit_capture(&event_id, &auth_id, amount_minor, now_unix).await,
            CardEvent::TransactionUpdated {
                event_id,
                auth_id,
                status,
                amount_minor,
            } => {
                self.apply_transaction_update(&event_id, &auth_id, status, amount_minor, now_unix)
                    .await
            }
        }
    }

    async fn decide_authorization(
        &self,
        auth_id: &str,
        amount_minor: u64,
        card_token: &str,
        merchant: &Option<Merchant>,
        now_unix: i64,
    ) -> AuthorizationResponse {
        let evaluation = match self
            .evaluate(auth_id, amount_minor, card_token, merchant, now_unix)
            .await
        {
            Ok(evaluation) => evaluation,
            Err(err) => {
                error!(auth_id, %err, "authorization evaluation failed");
                Evaluation {
                    reason: Some(DeclineReason::ProcessingError),
                    owner: String::new(),
                }
            }
        };

        let amount_usd_micro = minor_units_to_usd_micro(amount_minor).unwrap_or(u64::MAX);
        let decision = match evaluation.reason {
            None => Decision::Approved,
            Some(reason) => Decision::Declined(reason),
        };
        self.record_pending(
            auth_id,
            &evaluation.owner,
            card_token,
            amount_usd_micro,
            decision,
            now_unix,
        )
        .await;

        match evaluation.reason {
            None => AuthorizationResponse::approve(amount_minor),
            Some(reason) => AuthorizationResponse::decline(reason),
        }
    }

    /// Reason is None to approve; owner is whatever the card token resolved
    /// to, kept for the pending record.
    async fn evaluate(
        &self,
        auth_id: &str,
        amount_minor: u64,
        card_token: &str,
        merchant: &Option<Merchant>,
        now_unix: i64,
    ) -> CoreResult<Evaluation> {
        // A request landing after its own capture is out of order
        if let Some(prior) = self.pending.get(auth_id).await? {
            warn!(auth_id, committed = prior.committed_at.is_some(), "out-of-order authorization.request");
            return Ok(Evaluation::declined(DeclineReason::ProcessingError, prior.owner));
        }

        let amount_usd_micro = match minor_units_to_usd_micro(amount_minor) {
            Some(v) => v,
            None => return Ok(Evaluation::declined(DeclineReason::CapExceeded, String::new())),
        };

        let owner = match self.cache.owner_for_card(card_token).await? {
            Some(owner) => owner,
            None => return Ok(Evaluation::declined(DeclineReason::NoPosition, String::new())),
        };
        let declined = |reason| Ok(Evaluation::declined(reason, owner.clone()));

        let horizon = self.cache.staleness_horizon_secs();
        let mut position = self.cache.get_position(&owner).await?;
        let fresh = position
            .as_ref()
            .map(|p| p.is_fresh(now_unix, horizon))
            .unwrap_or(false);
        if !fresh {
            // One synchronous refresh attempt inside the deadline
            position = self.refresher.refresh(&owner).await?.or(position);
        }
        let position = match position {
            Some(p) => p,
            None => return declined(DeclineReason::NoPosition),
        };
        if !position.is_fresh(now_unix, horizon) {
            return declined(DeclineReason::StalePosition);
        }

        if let Some(mcc) = merchant.as_ref().and_then(|m| m.category.as_deref()) {
            if self.config.blocked_mcc.iter().any(|b| b == mcc) {
                return declined(DeclineReason::BlockedMcc);
            }
        }
        if let Some(cap) = self.config.max_authorization_usd_micro {
            if amount_usd_micro > cap {
                return declined(DeclineReason::CapExceeded);
            }
        }
        if position.health_factor_bps < self.config.min_health_factor_bps {
            return declined(DeclineReason::HealthFactorLow);
        }
        if amount_usd_micro > position.available_credit_usd_micro {
            return declined(DeclineReason::InsufficientCredit);
        }
        Ok(Evaluation {
            reason: None,
            owner,
        })
    }

    async fn record_pending(
        &self,
        auth_id: &str,
        owner: &str,
        card_token: &str,
        amount_usd_micro: u64,
        decision: Decision,
        now_unix: i64,
    ) {
        // Never clobber an existing record; a late out-of-order request must
        // not erase the committed state of the original decision
        match self.pending.get(auth_id).await {
            Ok(None) => {}
            Ok(Some(_)) => return,
            Err(err) => {
                error!(auth_id, %err, "pending-auth lookup failed before write");
                return;
            }
        }
        let pending = PendingAuthorization {
            auth_id: auth_id.to_string(),
            owner: owner.to_string(),
            card_token: card_token.to_string(),
            amount_usd_micro,
            decision,
            decided_at: now_unix,
            committed_at: None,
            expires_at: now_unix + self.config.pending_ttl.as_secs() as i64,
        };
        if let Err(err) = self.pending.put(&pending, self.config.pending_ttl).await {
            error!(auth_id, %err, "failed to persist pending authorization");
        }
    }

    async fn commit_capture(
        &self,
        event_id: &str,
        auth_id: &str,
        amount_minor: u64,
        now_unix: i64,
    ) -> StoredResponse {
        let received = StoredResponse {
            status: 200,
            body: json!({"received": true}),
        };

        let pending = match self.pending.get(auth_id).await {
            Ok(pending) => pending,
            Err(err) => {
                error!(event_id, auth_id, %err, "pending-auth lookup failed; not committing");
                return received;
            }
        };
        let pending = match pending {
            Some(p) => p,
            None => {
                error!(event_id, auth_id, "capture without a pending authorization; not committing");
                return received;
            }
        };
        if let Decision::Declined(reason) = pending.decision {
            error!(event_id, auth_id, %reason, "capture arrived for a declined authorization; not committing");
            return received;
        }
        if pending.committed_at.is_some() {
            debug!(event_id, auth_id, "capture already committed");
            return received;
        }

        let amount_usd_micro = match minor_units_to_usd_micro(amount_minor) {
            Some(v) => v,
            None => {
                error!(event_id, auth_id, amount_minor, "capture amount out of range");
                return received;
            }
        };
        let key = idempotency_key(auth_id, "commit");
        if let Err(err) = self
            .queue
            .enqueue_record_debt(&pending.owner, amount_usd_micro, auth_id, &key)
            .await
        {
            error!(event_id, auth_id, %err, "failed to enqueue record_debt");
            return received;
        }
        if let Err(err) = self.pending.mark_committed(auth_id, now_unix).await {
            error!(event_id, auth_id, %err, "failed to mark authorization committed");
        }
        info!(event_id, auth_id, amount_usd_micro, "capture enqueued");
        received
    }

    async fn apply_transaction_update(
        &self,
        event_id: &str,
        auth_id: &str,
        status: TransactionStatus,
        amount_minor: u64,
        _now_unix: i64,
    ) -> StoredResponse {
        let received = StoredResponse {
            status: 200,
            body: json!({"received": true}),
        };
        if !matches!(status, TransactionStatus::Reversed | TransactionStatus::Refunded) {
            debug!(event_id, auth_id, "transaction update without debt effect");
            return received;
        }

        let pending = match self.pending.get(auth_id).await {
            Ok(Some(p)) => p,
            Ok(None) => {
                warn!(event_id, auth_id, "refund for an unknown authorization; nothing to repay");
                return received;
            }
            Err(err) => {
                error!(event_id, auth_id, %err, "pending-auth lookup failed for refund");
                return received;
            }
        };
        let amount_usd_micro = match minor_units_to_usd_micro(amount_minor) {
            Some(v) => v,
            None => {
                error!(event_id, auth_id, amount_minor, "refund amount out of range");
                return received;
            }
        };
        let key = idempotency_key(auth_id, "refund");
        if let Err(err) = self
            .queue
            .enqueue_repay_debt(&pending.owner, amount_usd_micro, &key)
            .await
        {
            error!(event_id, auth_id, %err, "failed to enqueue repay_debt");
            return received;
        }
        info!(event_id, auth_id, amount_usd_micro, "refund repay enqueued");
        received
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::store::{MemoryCacheStore, MemoryPendingAuthStore};
    use std::sync::Mutex;

    const NOW: i64 = 1_750_000_000;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum QueuedJob {
        Record {
            owner: String,
            amount: u64,
            key: String,
        },
        Repay {
            owner: String,
            amount: u64,
            key: String,
        },
    }

    #[derive(Default)]
    struct RecordingQueue {
        jobs: Mutex<Vec<QueuedJob>>,
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
            self.jobs.lock().unwrap().push(QueuedJob::Record {
                owner: owner.into(),
                amount: amount_usd_micro,
                key: idempotency_key.into(),
            });
            Ok(())
        }

        async fn enqueue_repay_debt(
            &self,
            owner: &str,
            amount_usd_micro: u64,
            idempotency_key: &str,
        ) -> CoreResult<()> {
            self.jobs.lock().unwrap().push(QueuedJob::Repay {
                owner: owner.into(),
                amount: amount_usd_micro,
                key: idempotency_key.into(),
            });
            Ok(())
        }
    }

    struct SlowRefresher;

    #[async_trait]
    impl PositionRefresher for SlowRefresher {
        async fn refresh(&self, _owner: &str) -> CoreResult<Option<CachedPosition>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }
    }

    struct Harness {
        core: DecisionCore,
        cache: Arc<PositionCache>,
        queue: Arc<RecordingQueue>,
    }

    fn harness_with(config: DecisionConfig, refresher: Arc<dyn PositionRefresher>) -> Harness {
        let cache = Arc::new(PositionCache::new(
            Arc::new(MemoryCacheStore::new()),
            Duration::from_secs(60),
        ));
        let queue = Arc::new(RecordingQueue::default());
        let core = DecisionCore::new(
            cache.clone(),
            Arc::new(MemoryPendingAuthStore::new()),
            queue.clone(),
            refresher,
            config,
        );
        Harness { core, cache, queue }
    }

    fn harness() -> Harness {
        harness_with(DecisionConfig::default(), Arc::new(NoRefresh))
    }

    /// 5 SOL at $150, 60% LTV, no debt: $450 available
    fn healthy_position(owner: &str) -> CachedPosition {
        CachedPosition {
            owner: owner.into(),
            collateral_value_usd_micro: 750_000_000,
            debt_usd_micro: 0,
            available_credit_usd_micro: 450_000_000,
            health_factor_bps: u64::MAX,
            index_snapshot: 0,
            version: NOW,
            as_of_unix: NOW,
            oracle_stale: false,
        }
    }

    async fn seed(h: &Harness, owner: &str, card: &str, position: CachedPosition) {
        h.cache.put_position(&position).await.unwrap();
        h.cache.link_card(card, owner).await.unwrap();
    }

    fn auth_request(auth_id: &str, amount_minor: u64, card: &str) -> CardEvent {
        CardEvent::AuthorizationRequest {
            event_id: format!("evt_{auth_id}"),
            auth_id: auth_id.into(),
            amount_minor,
            card_token: card.into(),
            merchant: None,
        }
    }

    fn capture(auth_id: &str, amount_minor: u64) -> CardEvent {
        CardEvent::Capture {
            event_id: format!("evt_cap_{auth_id}"),
            kind: EventKind::TransactionCreated,
            auth_id: auth_id.into(),
            amount_minor,
        }
    }

    #[tokio::test]
    async fn test_approve_path_fifty_dollars() {
        let h = harness();
        seed(&h, "owner_1", "card_1", healthy_position("owner_1")).await;

        let response = h.core.handle(auth_request("auth_1", 5_000, "card_1"), NOW).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["approved"], true);
        assert_eq!(response.body["authorization_amount"], 5_000);
    }

    #[tokio::test]
    async fn test_capture_commits_exactly_once() {
        let h = harness();
        seed(&h, "owner_1", "card_1", healthy_position("owner_1")).await;

        h.core.handle(auth_request("auth_1", 5_000, "card_1"), NOW).await;
        let first = h.core.handle(capture("auth_1", 5_000), NOW + 1).await;
        let second = h.core.handle(capture("auth_1", 5_000), NOW + 2).await;
        assert_eq!(first.body["received"], true);
        assert_eq!(second.body["received"], true);

        let jobs = h.queue.jobs.lock().unwrap();
        assert_eq!(
            *jobs,
            vec![QueuedJob::Record {
                owner: "owner_1".into(),
                amount: 50_000_000,
                key: idempotency_key("auth_1", "commit"),
            }]
        );
    }

    #[tokio::test]
    async fn test_declined_authorization_never_commits() {
        let h = harness();
        seed(&h, "owner_1", "card_1", healthy_position("owner_1")).await;

        // $460 > $450 available
        let response = h.core.handle(auth_request("auth_1", 46_000, "card_1"), NOW).await;
        assert_eq!(response.body["approved"], false);
        assert_eq!(response.body["decline_reason"], "INSUFFICIENT_CREDIT");

        h.core.handle(capture("auth_1", 46_000), NOW + 1).await;
        assert!(h.queue.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_capture_without_authorization_never_commits() {
        let h = harness();
        h.core.handle(capture("auth_unseen", 5_000), NOW).await;
        assert!(h.queue.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_card_declines_no_position() {
        let h = harness();
        let response = h.core.handle(auth_request("auth_1", 5_000, "card_x"), NOW).await;
        assert_eq!(response.body["decline_reason"], "NO_POSITION");
    }

    #[tokio::test]
    async fn test_stale_entry_declines_stale_position() {
        let h = harness();
        let mut position = healthy_position("owner_1");
        position.as_of_unix = NOW - 120;
        seed(&h, "owner_1", "card_1", position).await;

        let response = h.core.handle(auth_request("auth_1", 5_000, "card_1"), NOW).await;
        assert_eq!(response.body["decline_reason"], "STALE_POSITION");
    }

    #[tokio::test]
    async fn test_oracle_stale_entry_declines() {
        let h = harness();
        let mut position = healthy_position("owner_1");
        position.oracle_stale = true;
        seed(&h, "owner_1", "card_1", position).await;

        let response = h.core.handle(auth_request("auth_1", 2_500, "card_1"), NOW).await;
        assert_eq!(response.body["decline_reason"], "STALE_POSITION");
    }

    #[tokio::test]
    async fn test_low_health_factor_declines() {
        let h = harness();
        let mut position = healthy_position("owner_1");
        position.debt_usd_micro = 400_000_000;
        position.available_credit_usd_micro = 50_000_000;
        position.health_factor_bps = 10_500;
        seed(&h, "owner_1", "card_1", position).await;

        let response = h.core.handle(auth_request("auth_1", 100, "card_1"), NOW).await;
        assert_eq!(response.body["decline_reason"], "HEALTH_FACTOR_LOW");
    }

    #[tokio::test]
    async fn test_blocked_mcc_declines() {
        let config = DecisionConfig {
            blocked_mcc: vec!["7995".into()],
            ..DecisionConfig::default()
        };
        let h = harness_with(config, Arc::new(NoRefresh));
        seed(&h, "owner_1", "card_1", healthy_position("owner_1")).await;

        let event = CardEvent::AuthorizationRequest {
            event_id: "evt_1".into(),
            auth_id: "auth_1".into(),
            amount_minor: 100,
            card_token: "card_1".into(),
            merchant: Some(Merchant {
                name: Some("Casino".into()),
                category: Some("7995".into()),
                country: Some("US".into()),
            }),
        };
        let response = h.core.handle(event, NOW).await;
        assert_eq!(response.body["decline_reason"], "BLOCKED_MCC");
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_breach_declines_timeout() {
        let config = DecisionConfig {
            hard_deadline: Duration::from_millis(50),
            ..DecisionConfig::default()
        };
        let h = harness_with(config, Arc::new(SlowRefresher));
        // cache miss forces the slow refresher onto the decision path
        h.cache.link_card("card_1", "owner_1").await.unwrap();

        let response = h.core.handle(auth_request("auth_1", 100, "card_1"), NOW).await;
        assert_eq!(response.body["decline_reason"], "TIMEOUT");
    }

    #[tokio::test]
    async fn test_refund_enqueues_repay_once() {
        let h = harness();
        seed(&h, "owner_1", "card_1", healthy_position("owner_1")).await;
        h.core.handle(auth_request("auth_1", 4_500, "card_1"), NOW).await;
        h.core.handle(capture("auth_1", 4_500), NOW + 1).await;

        let refund = CardEvent::TransactionUpdated {
            event_id: "evt_ref".into(),
            auth_id: "auth_1".into(),
            status: TransactionStatus::Refunded,
            amount_minor: 3_000,
        };
        h.core.handle(refund, NOW + 2).await;

        let jobs = h.queue.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(
            jobs[1],
            QueuedJob::Repay {
                owner: "owner_1".into(),
                amount: 30_000_000,
                key: idempotency_key("auth_1", "refund"),
            }
        );
    }

    #[tokio::test]
    async fn test_late_request_after_capture_is_out_of_order() {
        let h = harness();
        seed(&h, "owner_1", "card_1", healthy_position("owner_1")).await;
        h.core.handle(auth_request("auth_1", 5_000, "card_1"), NOW).await;
        h.core.handle(capture("auth_1", 5_000), NOW + 1).await;

        let response = h.core.handle(auth_request("auth_1", 5_000, "card_1"), NOW + 2).await;
        assert_eq!(response.body["approved"], false);
        assert_eq!(response.body["decline_reason"], "PROCESSING_ERROR");
    }
}
