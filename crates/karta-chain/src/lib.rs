//! Solana plumbing for the Karta service: one owned chain client, the
//! durable per-owner submission queue, the position indexer, the RPC-backed
//! oracle adapter, and windowed reconciliation.

pub mod client;
pub mod error;
pub mod indexer;
pub mod oracle;
pub mod recon;
pub mod submitter;

pub use client::{ChainClient, TxReceipt, TxSender};
pub use error::ChainError;
pub use indexer::{Indexer, IndexerRefresher};
pub use oracle::PythRpcOracle;
pub use recon::{reconcile, IssuerCapture, IssuerLogClient, ReconReport, Reconciler};
pub use submitter::{BackoffPolicy, Job, JobKind, Submitter};
