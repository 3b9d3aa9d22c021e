//! Chain-agnostic domain logic for the Karta authorization service:
//! webhook event schema, the two-phase decision core, store interfaces
//! (in-memory and Redis), the oracle adapter interface, and the position
//! cache.

pub mod cache;
pub mod decision;
pub mod error;
pub mod event;
pub mod oracle;
pub mod redis_store;
pub mod store;
pub mod types;

pub use cache::PositionCache;
pub use decision::{DebtQueue, DecisionConfig, DecisionCore, NoRefresh, PositionRefresher};
pub use error::{CoreError, CoreResult};
pub use event::{CardEvent, EventKind, WebhookEnvelope};
pub use oracle::{GatedOracle, OracleAdapter, OracleError, PriceData};
pub use types::{
    idempotency_key, CachedPosition, Checkpoint, CommitKind, CommitRecord, Decision,
    DeclineReason, PendingAuthorization, StoredResponse,
};
