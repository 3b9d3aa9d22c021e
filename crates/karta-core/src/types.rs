use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Card networks bill in minor units (cents); the engine accounts in
/// 6-decimal micro-USD.
pub fn minor_units_to_usd_micro(minor: u64) -> Option<u64> {
    minor.checked_mul(10_000)
}

/// Stable response-cache key: one effect per (auth_id, event type).
pub fn idempotency_key(auth_id: &str, event_type: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(auth_id.as_bytes());
    hasher.update(b":");
    hasher.update(event_type.as_bytes());
    hex::encode(hasher.finalize())
}

/// 32-byte tag handed to the on-chain engine for at-most-once record_debt.
pub fn auth_tag(auth_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(auth_id.as_bytes());
    hasher.finalize().into()
}

/// Stable decline reasons surfaced to the card issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeclineReason {
    NoPosition,
    StalePosition,
    InsufficientCredit,
    HealthFactorLow,
    BlockedMcc,
    CapExceeded,
    RateLimited,
    ReplayDetected,
    Timeout,
    ProcessingError,
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::NoPosition => "NO_POSITION",
            DeclineReason::StalePosition => "STALE_POSITION",
            DeclineReason::InsufficientCredit => "INSUFFICIENT_CREDIT",
            DeclineReason::HealthFactorLow => "HEALTH_FACTOR_LOW",
            DeclineReason::BlockedMcc => "BLOCKED_MCC",
            DeclineReason::CapExceeded => "CAP_EXCEEDED",
            DeclineReason::RateLimited => "RATE_LIMITED",
            DeclineReason::ReplayDetected => "REPLAY_DETECTED",
            DeclineReason::Timeout => "TIMEOUT",
            DeclineReason::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

impl std::fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Approved,
    Declined(DeclineReason),
}

/// Snapshot of a position's derived quantities, written by the indexer and
/// read by the decision core. Not authoritative; the chain is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPosition {
    pub owner: String,
    pub collateral_value_usd_micro: u64,
    pub debt_usd_micro: u64,
    pub available_credit_usd_micro: u64,
    pub health_factor_bps: u64,
    pub index_snapshot: u128,
    /// Position.last_update_timestamp at the observed write
    pub version: i64,
    /// Wall clock when the entry was computed
    pub as_of_unix: i64,
    /// Entry computed against a stale oracle; treat as missing for approvals
    pub oracle_stale: bool,
}

impl CachedPosition {
    pub fn is_fresh(&self, now_unix: i64, horizon_secs: i64) -> bool {
        !self.oracle_stale && now_unix.saturating_sub(self.as_of_unix) <= horizon_secs
    }
}

/// First-class two-phase record: written at decision time, consulted at
/// capture time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub auth_id: String,
    pub owner: String,
    pub card_token: String,
    pub amount_usd_micro: u64,
    pub decision: Decision,
    pub decided_at: i64,
    pub committed_at: Option<i64>,
    pub expires_at: i64,
}

/// Response cached under an idempotency key and replayed verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommitKind {
    RecordDebt,
    RepayDebt,
    Liquidate,
}

/// Confirmed on-chain mutation, appended by the submitter. This is the
/// on-chain leg consumed by reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub idempotency_key: String,
    pub auth_id: String,
    pub owner: String,
    pub kind: CommitKind,
    pub amount_usd_micro: u64,
    pub signature: String,
    pub slot: u64,
    pub committed_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub program_id: String,
    pub last_processed_slot: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_units_scale() {
        // $50.00 card amount = 5000 cents = 50_000_000 micro-USD
        assert_eq!(minor_units_to_usd_micro(5_000), Some(50_000_000));
        assert_eq!(minor_units_to_usd_micro(u64::MAX), None);
    }

    #[test]
    fn test_idempotency_key_separates_event_types() {
        let a = idempotency_key("auth_1", "authorization.request");
        let b = idempotency_key("auth_1", "transaction.created");
        let c = idempotency_key("auth_1", "authorization.request");
        assert_ne!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_decline_reason_wire_format() {
        let json = serde_json::to_string(&DeclineReason::InsufficientCredit).unwrap();
        assert_eq!(json, "\"INSUFFICIENT_CREDIT\"");
        assert_eq!(DeclineReason::StalePosition.as_str(), "STALE_POSITION");
    }

    #[test]
    fn test_cached_position_freshness() {
        let mut pos = CachedPosition {
            owner: "o".into(),
            collateral_value_usd_micro: 0,
            debt_usd_micro: 0,
            available_credit_usd_micro: 0,
            health_factor_bps: u64::MAX,
            index_snapshot: 0,
            version: 0,
            as_of_unix: 1_000,
            oracle_stale: false,
        };
        assert!(pos.is_fresh(1_059, 60));
        assert!(!pos.is_fresh(1_061, 60));
        pos.oracle_stale = true;
        assert!(!pos.is_fresh(1_001, 60));
    }
}
