//! Durable on-chain submission queue: FIFO per owner, parallel across
//! owners, exponential backoff, dead-letter path, and client-side
//! coalescing by idempotency key.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, error, info, warn};

use karta_core::store::CommitLog;
use karta_core::types::{auth_tag, CommitKind, CommitRecord};
use karta_core::{CoreError, CoreResult, DebtQueue};

use crate::client::TxSender;
use crate::error::ChainError;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub max_attempts: u8,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        // 1s, 2s, 4s, 8s, 16s
        Self {
            base: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    fn delay(&self, attempt: u8) -> Duration {
        self.base * (1u32 << attempt.min(16))
    }
}

#[derive(Debug, Clone)]
pub enum JobKind {
    RecordDebt {
        owner: Pubkey,
        amount_usd_micro: u64,
        auth_id: String,
        auth_tag: [u8; 32],
    },
    RepayDebt {
        owner: Pubkey,
        amount_usd_micro: u64,
    },
    Liquidate {
        owner: Pubkey,
        repay_usd_micro: u64,
        seize_mint: Pubkey,
    },
}

impl JobKind {
    pub fn owner(&self) -> Pubkey {
        match self {
            JobKind::RecordDebt { owner, .. }
            | JobKind::RepayDebt { owner, .. }
            | JobKind::Liquidate { owner, .. } => *owner,
        }
    }

    fn amount_usd_micro(&self) -> u64 {
        match self {
            JobKind::RecordDebt { amount_usd_micro, .. }
            | JobKind::RepayDebt { amount_usd_micro, .. } => *amount_usd_micro,
            JobKind::Liquidate { repay_usd_micro, .. } => *repay_usd_micro,
        }
    }

    fn commit_kind(&self) -> CommitKind {
        match self {
            JobKind::RecordDebt { .. } => CommitKind::RecordDebt,
            JobKind::RepayDebt { .. } => CommitKind::RepayDebt,
            JobKind::Liquidate { .. } => CommitKind::Liquidate,
        }
    }

    fn auth_id(&self) -> &str {
        match self {
            JobKind::RecordDebt { auth_id, .. } => auth_id,
            _ => "",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub idempotency_key: String,
    pub kind: JobKind,
    pub enqueued_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Queued,
    InFlight,
    Done,
    DeadLetter,
    Cancelled,
}

#[derive(Default)]
struct OwnerQueue {
    jobs: VecDeque<Job>,
    running: bool,
}

pub struct Submitter<S: TxSender + 'static> {
    sender: Arc<S>,
    commit_log: Arc<dyn CommitLog>,
    backoff: BackoffPolicy,
    states: DashMap<String, JobState>,
    queues: DashMap<Pubkey, OwnerQueue>,
    dead_letters: Mutex<Vec<(Job, String)>>,
    /// Engine code meaning "this auth tag already landed"; success, not failure
    duplicate_auth_code: u32,
}

impl<S: TxSender + 'static> Submitter<S> {
    pub fn new(sender: Arc<S>, commit_log: Arc<dyn CommitLog>, backoff: BackoffPolicy) -> Arc<Self> {
        Arc::new(Self {
            sender,
            commit_log,
            backoff,
            states: DashMap::new(),
            queues: DashMap::new(),
            dead_letters: Mutex::new(Vec::new()),
            duplicate_auth_code: crate::client::credit_error_code(
                karta_credit::errors::CreditError::DuplicateAuthorization,
            ),
        })
    }

    pub async fn enqueue(self: &Arc<Self>, job: Job) -> CoreResult<()> {
        if self.states.contains_key(&job.idempotency_key) {
            debug!(key = %job.idempotency_key, "duplicate submission coalesced");
            return Ok(());
        }
        if self
            .commit_log
            .contains(&job.idempotency_key)
            .await
            .unwrap_or(false)
        {
            debug!(key = %job.idempotency_key, "already committed; dropping");
            return Ok(());
        }
        self.states
            .insert(job.idempotency_key.clone(), JobState::Queued);

        let owner = job.kind.owner();
        let spawn_worker = {
            let mut queue = self.queues.entry(owner).or_default();
            queue.jobs.push_back(job);
            if queue.running {
                false
            } else {
                queue.running = true;
                true
            }
        };
        if spawn_worker {
            let this = self.clone();
            tokio::spawn(async move { this.run_owner(owner).await });
        }
        Ok(())
    }

    /// Cancel a job that has not been dispatched yet.
    pub fn cancel(&self, idempotency_key: &str) -> bool {
        let mut entry = match self.states.get_mut(idempotency_key) {
            Some(entry) => entry,
            None => return false,
        };
        if *entry.value() == JobState::Queued {
            *entry.value_mut() = JobState::Cancelled;
            true
        } else {
            false
        }
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Wait until every owner queue has drained; test and shutdown helper.
    pub async fn drain(&self) {
        loop {
            let busy = self
                .queues
                .iter()
                .any(|q| q.value().running || !q.value().jobs.is_empty());
            if !busy {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn run_owner(self: Arc<Self>, owner: Pubkey) {
        loop {
            let job = {
                let mut queue = match self.queues.get_mut(&owner) {
                    Some(queue) => queue,
                    None => return,
                };
                match queue.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        queue.running = false;
                        return;
                    }
                }
            };
            let state = self
                .states
                .get(&job.idempotency_key)
                .map(|s| *s.value());
            if state == Some(JobState::Cancelled) {
                info!(key = %job.idempotency_key, "cancelled before dispatch");
                continue;
            }
            self.states
                .insert(job.idempotency_key.clone(), JobState::InFlight);
            self.process(job).await;
        }
    }

    async fn process(&self, job: Job) {
        let mut last_error = String::new();
        for attempt in 0..self.backoff.max_attempts {
            match self.sender.submit(&job.kind).await {
                Ok(receipt) => {
                    let record = CommitRecord {
                        idempotency_key: job.idempotency_key.clone(),
                        auth_id: job.kind.auth_id().to_string(),
                        owner: job.kind.owner().to_string(),
                        kind: job.kind.commit_kind(),
                        amount_usd_micro: job.kind.amount_usd_micro(),
                        signature: receipt.signature.clone(),
                        slot: receipt.slot,
                        committed_at: chrono::Utc::now().timestamp(),
                    };
                    if let Err(err) = self.commit_log.append(&record).await {
                        error!(key = %job.idempotency_key, %err, "commit log append failed");
                    }
                    self.states
                        .insert(job.idempotency_key.clone(), JobState::Done);
                    info!(
                        key = %job.idempotency_key,
                        signature = %receipt.signature,
                        "submission confirmed"
                    );
                    return;
                }
                Err(ChainError::Program { code, name }) if code == self.duplicate_auth_code => {
                    // Another submitter already landed this auth; at-most-once held
                    info!(key = %job.idempotency_key, %name, "engine reports duplicate; treating as committed");
                    self.states
                        .insert(job.idempotency_key.clone(), JobState::Done);
                    return;
                }
                Err(err) if !err.is_retriable() => {
                    self.dead_letter(job, err.to_string());
                    return;
                }
                Err(err) => {
                    last_error = err.to_string();
                    let delay = self.backoff.delay(attempt);
                    warn!(
                        key = %job.idempotency_key,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "submission failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
        self.dead_letter(job, last_error);
    }

    fn dead_letter(&self, job: Job, reason: String) {
        error!(
            key = %job.idempotency_key,
            owner = %job.kind.owner(),
            %reason,
            "submission dead-lettered; operator attention required"
        );
        self.states
            .insert(job.idempotency_key.clone(), JobState::DeadLetter);
        if let Ok(mut dead) = self.dead_letters.lock() {
            dead.push((job, reason));
        }
    }
}

#[async_trait]
impl<S: TxSender + 'static> DebtQueue for Arc<Submitter<S>> {
    async fn enqueue_record_debt(
        &self,
        owner: &str,
        amount_usd_micro: u64,
        auth_id: &str,
        idempotency_key: &str,
    ) -> CoreResult<()> {
        let owner: Pubkey = owner
            .parse()
            .map_err(|_| CoreError::Internal(format!("invalid owner pubkey {owner}")))?;
        self.enqueue(Job {
            idempotency_key: idempotency_key.to_string(),
            kind: JobKind::RecordDebt {
                owner,
                amount_usd_micro,
                auth_id: auth_id.to_string(),
                auth_tag: auth_tag(auth_id),
            },
            enqueued_at: chrono::Utc::now().timestamp(),
        })
        .await
    }

    async fn enqueue_repay_debt(
        &self,
        owner: &str,
        amount_usd_micro: u64,
        idempotency_key: &str,
    ) -> CoreResult<()> {
        let owner: Pubkey = owner
            .parse()
            .map_err(|_| CoreError::Internal(format!("invalid owner pubkey {owner}")))?;
        self.enqueue(Job {
            idempotency_key: idempotency_key.to_string(),
            kind: JobKind::RepayDebt {
                owner,
                amount_usd_micro,
            },
            enqueued_at: chrono::Utc::now().timestamp(),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TxReceipt;
    use karta_core::store::MemoryCommitLog;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn test_backoff() -> BackoffPolicy {
        BackoffPolicy {
            base: Duration::from_millis(1),
            max_attempts: 5,
        }
    }

    /// Fails the first `failures` submissions with a retriable error.
    struct FlakySender {
        failures: AtomicU64,
        submitted: Mutex<Vec<String>>,
    }

    impl FlakySender {
        fn new(failures: u64) -> Self {
            Self {
                failures: AtomicU64::new(failures),
                submitted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TxSender for FlakySender {
        async fn submit(&self, job: &JobKind) -> Result<TxReceipt, ChainError> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(ChainError::AccountNotFound("rpc flake".into()));
            }
            let label = match job {
                JobKind::RecordDebt { auth_id, .. } => format!("record:{auth_id}"),
                JobKind::RepayDebt { amount_usd_micro, .. } => format!("repay:{amount_usd_micro}"),
                JobKind::Liquidate { .. } => "liquidate".to_string(),
            };
            self.submitted.lock().unwrap().push(label);
            Ok(TxReceipt {
                signature: "sig".into(),
                slot: 1,
            })
        }
    }

    struct RejectingSender {
        code: u32,
    }

    #[async_trait]
    impl TxSender for RejectingSender {
        async fn submit(&self, _job: &JobKind) -> Result<TxReceipt, ChainError> {
            Err(ChainError::Program {
                code: self.code,
                name: "rejected".into(),
            })
        }
    }

    fn record_job(key: &str, owner: Pubkey, auth_id: &str) -> Job {
        Job {
            idempotency_key: key.to_string(),
            kind: JobKind::RecordDebt {
                owner,
                amount_usd_micro: 50_000_000,
                auth_id: auth_id.to_string(),
                auth_tag: auth_tag(auth_id),
            },
            enqueued_at: 0,
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let sender = Arc::new(FlakySender::new(2));
        let log = Arc::new(MemoryCommitLog::new());
        let submitter = Submitter::new(sender.clone(), log.clone(), test_backoff());

        let owner = Pubkey::new_unique();
        submitter.enqueue(record_job("k1", owner, "auth_1")).await.unwrap();
        submitter.drain().await;

        assert_eq!(sender.submitted.lock().unwrap().len(), 1);
        assert!(log.contains("k1").await.unwrap());
        assert_eq!(submitter.dead_letter_count(), 0);
    }

    #[tokio::test]
    async fn test_retriable_exhaustion_dead_letters() {
        let sender = Arc::new(FlakySender::new(100));
        let log = Arc::new(MemoryCommitLog::new());
        let submitter = Submitter::new(sender, log.clone(), test_backoff());

        submitter
            .enqueue(record_job("k1", Pubkey::new_unique(), "auth_1"))
            .await
            .unwrap();
        submitter.drain().await;

        assert_eq!(submitter.dead_letter_count(), 1);
        assert!(!log.contains("k1").await.unwrap());
    }

    #[tokio::test]
    async fn test_non_retriable_dead_letters_immediately() {
        // HealthViolation: retrying cannot help
        let code = crate::client::credit_error_code(
            karta_credit::errors::CreditError::HealthViolation,
        );
        let sender = Arc::new(RejectingSender { code });
        let log = Arc::new(MemoryCommitLog::new());
        let submitter = Submitter::new(sender, log, test_backoff());

        submitter
            .enqueue(record_job("k1", Pubkey::new_unique(), "auth_1"))
            .await
            .unwrap();
        submitter.drain().await;
        assert_eq!(submitter.dead_letter_count(), 1);
    }

    #[tokio::test]
    async fn test_engine_duplicate_is_success() {
        let code = crate::client::credit_error_code(
            karta_credit::errors::CreditError::DuplicateAuthorization,
        );
        let sender = Arc::new(RejectingSender { code });
        let log = Arc::new(MemoryCommitLog::new());
        let submitter = Submitter::new(sender, log, test_backoff());

        submitter
            .enqueue(record_job("k1", Pubkey::new_unique(), "auth_1"))
            .await
            .unwrap();
        submitter.drain().await;
        assert_eq!(submitter.dead_letter_count(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_keys_coalesce() {
        let sender = Arc::new(FlakySender::new(0));
        let log = Arc::new(MemoryCommitLog::new());
        let submitter = Submitter::new(sender.clone(), log, test_backoff());

        let owner = Pubkey::new_unique();
        submitter.enqueue(record_job("k1", owner, "auth_1")).await.unwrap();
        submitter.enqueue(record_job("k1", owner, "auth_1")).await.unwrap();
        submitter.drain().await;

        assert_eq!(sender.submitted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_per_owner_fifo_order() {
        let sender = Arc::new(FlakySender::new(0));
        let log = Arc::new(MemoryCommitLog::new());
        let submitter = Submitter::new(sender.clone(), log, test_backoff());

        let owner = Pubkey::new_unique();
        for i in 0..4 {
            submitter
                .enqueue(record_job(&format!("k{i}"), owner, &format!("auth_{i}")))
                .await
                .unwrap();
        }
        submitter.drain().await;

        let submitted = sender.submitted.lock().unwrap();
        assert_eq!(
            *submitted,
            vec!["record:auth_0", "record:auth_1", "record:auth_2", "record:auth_3"]
        );
    }

    /// Completes after a pause so queued jobs stay queued long enough to
    /// exercise cancellation.
    struct SlowSender {
        submitted: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TxSender for SlowSender {
        async fn submit(&self, job: &JobKind) -> Result<TxReceipt, ChainError> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let JobKind::RecordDebt { auth_id, .. } = job {
                self.submitted.lock().unwrap().push(format!("record:{auth_id}"));
            }
            Ok(TxReceipt {
                signature: "sig".into(),
                slot: 1,
            })
        }
    }

    #[tokio::test]
    async fn test_cancel_before_dispatch() {
        let sender = Arc::new(SlowSender {
            submitted: Mutex::new(Vec::new()),
        });
        let log = Arc::new(MemoryCommitLog::new());
        let submitter = Submitter::new(sender.clone(), log, test_backoff());

        // the blocker holds the owner worker while the target sits queued
        let owner = Pubkey::new_unique();
        submitter
            .enqueue(record_job("k_blocker", owner, "auth_0"))
            .await
            .unwrap();
        submitter.enqueue(record_job("k_target", owner, "auth_1")).await.unwrap();
        assert!(submitter.cancel("k_target"));
        submitter.drain().await;

        let submitted = sender.submitted.lock().unwrap();
        assert_eq!(*submitted, vec!["record:auth_0"]);
    }
}
