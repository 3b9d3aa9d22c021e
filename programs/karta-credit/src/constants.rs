/// Basis points denominator (100% = 10000)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Ray precision for the borrow index (1e27)
pub const RAY: u128 = 1_000_000_000_000_000_000_000_000_000;

/// USD amounts are 6-decimal fixed point (micro-USD)
pub const USD_DECIMALS: u8 = 6;
pub const USD_MICRO: u64 = 1_000_000;

/// Seconds per year for APR-to-per-second rate conversion
pub const SECONDS_PER_YEAR: u64 = 31_536_000;

// Seeds for PDA derivation
pub const CONFIG_SEED: &[u8] = b"config";
pub const WHITELIST_SEED: &[u8] = b"whitelist";
pub const POSITION_SEED: &[u8] = b"position";
pub const VAULT_SEED: &[u8] = b"vault";
pub const VAULT_AUTHORITY_SEED: &[u8] = b"vault_authority";

/// Max distinct collateral mints per position
pub const MAX_COLLATERAL_TYPES: usize = 8;

/// Fraction of debt repayable in a single liquidation call
pub const CLOSE_FACTOR_BPS: u64 = 5_000;

/// Authorization tags kept per position for at-most-once record_debt
pub const RECENT_AUTH_RING: usize = 8;

/// Oracle price gating defaults
pub const DEFAULT_MAX_STALENESS_SECS: i64 = 30;
pub const DEFAULT_MAX_CONFIDENCE_BPS: u16 = 500;

/// Upper bound on the liquidation bonus accepted at whitelist time
pub const MAX_LIQUIDATION_BONUS_BPS: u16 = 5_000;
