use anchor_lang::prelude::*;

#[error_code]
pub enum CreditError {
    #[msg("Invalid amount")]
    InvalidAmount,

    #[msg("Invalid risk parameters")]
    InvalidParameters,

    #[msg("Math overflow")]
    MathOverflow,

    #[msg("Unauthorized")]
    Unauthorized,

    #[msg("Protocol is paused")]
    ProtocolPaused,

    #[msg("Token is not whitelisted")]
    NotWhitelisted,

    #[msg("Token is disabled for new deposits")]
    AssetDisabled,

    #[msg("Deposit cap exceeded")]
    DepositCapExceeded,

    #[msg("Deposit below minimum USD value")]
    BelowMinimumDeposit,

    #[msg("Max collateral types reached")]
    MaxCollateralTypesReached,

    #[msg("Insufficient collateral")]
    InsufficientCollateral,

    #[msg("Position holds none of the requested mint")]
    InsufficientCollateralOfMint,

    #[msg("Operation would violate the LTV limit")]
    HealthViolation,

    #[msg("Nothing to repay")]
    NothingToRepay,

    #[msg("Position is healthy")]
    NotLiquidatable,

    #[msg("Repay amount exceeds the close factor")]
    CloseFactorExceeded,

    #[msg("Oracle price is stale")]
    StalePrice,

    #[msg("Oracle confidence interval too wide")]
    LowConfidence,

    #[msg("Invalid oracle account")]
    InvalidOracle,

    #[msg("Authorization already recorded")]
    DuplicateAuthorization,

    #[msg("Whitelist entry does not match the collateral mint")]
    WhitelistMintMismatch,

    #[msg("Token account does not match the expected mint or owner")]
    InvalidTokenAccount,

    #[msg("Missing collateral valuation accounts")]
    MissingCollateralAccounts,
}
