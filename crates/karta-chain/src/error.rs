use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Rpc(#[from] solana_client::client_error::ClientError),

    /// The program rejected the instruction; never retried as-is
    #[error("program rejected: code {code} ({name})")]
    Program { code: u32, name: String },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account decode failed: {0}")]
    Decode(String),

    #[error("invalid pubkey: {0}")]
    InvalidPubkey(String),

    #[error("issuer log error: {0}")]
    IssuerLog(String),

    #[error(transparent)]
    Core(#[from] karta_core::CoreError),
}

impl ChainError {
    /// Transport-level failures retry with backoff; engine rejections and
    /// malformed state go straight to the dead letter.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            ChainError::Rpc(_) | ChainError::AccountNotFound(_) | ChainError::IssuerLog(_)
        )
    }
}
