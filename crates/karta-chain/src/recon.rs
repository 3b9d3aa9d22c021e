//! Windowed reconciliation: issuer-log captures against confirmed on-chain
//! debt mutations, leg by leg. Read-only; it alerts, it never repairs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use karta_core::store::CommitLog;
use karta_core::types::{CommitKind, CommitRecord};

use crate::error::ChainError;

#[derive(Debug, Clone, Deserialize)]
pub struct IssuerCapture {
    pub auth_id: String,
    pub amount_usd_micro: u64,
    pub captured_at: i64,
}

pub struct IssuerLogClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl IssuerLogClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn captures(&self, from: i64, to: i64) -> Result<Vec<IssuerCapture>, ChainError> {
        let url = format!("{}/captures?from={from}&to={to}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ChainError::IssuerLog(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ChainError::IssuerLog(format!(
                "issuer log returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| ChainError::IssuerLog(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuthDiff {
    pub auth_id: String,
    pub issuer_usd_micro: u64,
    pub chain_usd_micro: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub window_start: i64,
    pub window_end: i64,
    pub issuer_total_usd_micro: u64,
    pub chain_total_usd_micro: u64,
    pub divergence_bps: u64,
    pub diffs: Vec<AuthDiff>,
}

impl ReconReport {
    pub fn diverged(&self, threshold_bps: u64) -> bool {
        self.divergence_bps > threshold_bps
    }
}

/// Compare the capture leg with the record_debt leg over one window.
pub fn reconcile(
    window_start: i64,
    window_end: i64,
    issuer: &[IssuerCapture],
    commits: &[CommitRecord],
) -> ReconReport {
    let mut issuer_by_auth: BTreeMap<&str, u64> = BTreeMap::new();
    for capture in issuer {
        *issuer_by_auth.entry(capture.auth_id.as_str()).or_default() += capture.amount_usd_micro;
    }
    let mut chain_by_auth: BTreeMap<&str, u64> = BTreeMap::new();
    for commit in commits {
        if commit.kind == CommitKind::RecordDebt {
            *chain_by_auth.entry(commit.auth_id.as_str()).or_default() +=
                commit.amount_usd_micro;
        }
    }

    let issuer_total: u64 = issuer_by_auth.values().sum();
    let chain_total: u64 = chain_by_auth.values().sum();

    let mut diffs = Vec::new();
    let auth_ids: std::collections::BTreeSet<&str> = issuer_by_auth
        .keys()
        .chain(chain_by_auth.keys())
        .copied()
        .collect();
    for auth_id in auth_ids {
        let issuer_amount = issuer_by_auth.get(auth_id).copied().unwrap_or(0);
        let chain_amount = chain_by_auth.get(auth_id).copied().unwrap_or(0);
        if issuer_amount != chain_amount {
            diffs.push(AuthDiff {
                auth_id: auth_id.to_string(),
                issuer_usd_micro: issuer_amount,
                chain_usd_micro: chain_amount,
            });
        }
    }

    let divergence_bps = if issuer_total == 0 && chain_total == 0 {
        0
    } else {
        let delta = issuer_total.abs_diff(chain_total) as u128;
        (delta * 10_000 / issuer_total.max(chain_total).max(1) as u128).min(u64::MAX as u128)
            as u64
    };

    ReconReport {
        window_start,
        window_end,
        issuer_total_usd_micro: issuer_total,
        chain_total_usd_micro: chain_total,
        divergence_bps,
        diffs,
    }
}

pub struct Reconciler {
    issuer: IssuerLogClient,
    commit_log: Arc<dyn CommitLog>,
    threshold_bps: u64,
    window: Duration,
}

impl Reconciler {
    pub fn new(
        issuer: IssuerLogClient,
        commit_log: Arc<dyn CommitLog>,
        threshold_bps: u64,
        window: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            issuer,
            commit_log,
            threshold_bps,
            window,
        })
    }

    pub async fn run(self: Arc<Self>) {
        loop {
            let window_end = chrono::Utc::now().timestamp();
            let window_start = window_end - self.window.as_secs() as i64;
            match self.run_window(window_start, window_end).await {
                Ok(report) if report.diverged(self.threshold_bps) => {
                    error!(
                        divergence_bps = report.divergence_bps,
                        issuer_total = report.issuer_total_usd_micro,
                        chain_total = report.chain_total_usd_micro,
                        diffs = %serde_json::to_string(&report.diffs).unwrap_or_default(),
                        "reconciliation divergence above threshold"
                    );
                }
                Ok(report) => {
                    info!(
                        divergence_bps = report.divergence_bps,
                        issuer_total = report.issuer_total_usd_micro,
                        "reconciliation clean"
                    );
                }
                Err(err) => {
                    error!(%err, "reconciliation window failed");
                }
            }
            tokio::time::sleep(self.window).await;
        }
    }

    pub async fn run_window(&self, from: i64, to: i64) -> Result<ReconReport, ChainError> {
        let issuer = self.issuer.captures(from, to).await?;
        let commits = self.commit_log.range(from, to).await.map_err(ChainError::Core)?;
        Ok(reconcile(from, to, &issuer, &commits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(auth_id: &str, amount: u64) -> IssuerCapture {
        IssuerCapture {
            auth_id: auth_id.into(),
            amount_usd_micro: amount,
            captured_at: 100,
        }
    }

    fn commit(auth_id: &str, amount: u64, kind: CommitKind) -> CommitRecord {
        CommitRecord {
            idempotency_key: format!("key_{auth_id}"),
            auth_id: auth_id.into(),
            owner: "owner".into(),
            kind,
            amount_usd_micro: amount,
            signature: "sig".into(),
            slot: 1,
            committed_at: 100,
        }
    }

    #[test]
    fn test_matching_legs_report_zero_divergence() {
        let issuer = vec![capture("a", 50_000_000), capture("b", 30_000_000)];
        let commits = vec![
            commit("a", 50_000_000, CommitKind::RecordDebt),
            commit("b", 30_000_000, CommitKind::RecordDebt),
        ];
        let report = reconcile(0, 200, &issuer, &commits);
        assert_eq!(report.divergence_bps, 0);
        assert!(report.diffs.is_empty());
        assert!(!report.diverged(10));
    }

    #[test]
    fn test_missing_chain_leg_is_flagged_per_auth() {
        let issuer = vec![capture("a", 50_000_000), capture("b", 30_000_000)];
        let commits = vec![commit("a", 50_000_000, CommitKind::RecordDebt)];
        let report = reconcile(0, 200, &issuer, &commits);
        // 30 of 80 missing = 3750 bps
        assert_eq!(report.divergence_bps, 3_750);
        assert_eq!(
            report.diffs,
            vec![AuthDiff {
                auth_id: "b".into(),
                issuer_usd_micro: 30_000_000,
                chain_usd_micro: 0,
            }]
        );
        assert!(report.diverged(10));
    }

    #[test]
    fn test_repays_do_not_count_toward_capture_leg() {
        let issuer = vec![capture("a", 50_000_000)];
        let commits = vec![
            commit("a", 50_000_000, CommitKind::RecordDebt),
            commit("a", 20_000_000, CommitKind::RepayDebt),
        ];
        let report = reconcile(0, 200, &issuer, &commits);
        assert_eq!(report.divergence_bps, 0);
    }

    #[test]
    fn test_small_divergence_below_threshold() {
        // 5 micro off on $50: 0.000001 bps scale, rounds to zero
        let issuer = vec![capture("a", 50_000_005)];
        let commits = vec![commit("a", 50_000_000, CommitKind::RecordDebt)];
        let report = reconcile(0, 200, &issuer, &commits);
        assert!(report.divergence_bps < 10);
        assert_eq!(report.diffs.len(), 1);
    }
}
