use anchor_lang::prelude::*;

use crate::constants::{MAX_COLLATERAL_TYPES, RECENT_AUTH_RING};
use crate::errors::CreditError;
use crate::math;

/// Risk bucket for whitelisted collateral. Each bucket carries a hard LTV
/// ceiling that caps whatever the mint-level entry asks for.
#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, PartialEq, Eq, Debug, InitSpace)]
#[repr(u8)]
pub enum AssetCategory {
    Native = 0,
    LiquidStaking = 1,
    Stable = 2,
    BlueChip = 3,
    Memecoin = 4,
    LpStable = 5,
    LpVolatile = 6,
    Other = 7,
}

impl AssetCategory {
    pub fn max_ltv_cap_bps(&self) -> u16 {
        match self {
            AssetCategory::Native => 8_000,
            AssetCategory::LiquidStaking => 7_500,
            AssetCategory::Stable => 9_000,
            AssetCategory::BlueChip => 7_000,
            AssetCategory::Memecoin => 3_000,
            AssetCategory::LpStable => 7_000,
            AssetCategory::LpVolatile => 5_000,
            AssetCategory::Other => 5_000,
        }
    }

    pub fn liquidation_threshold_cap_bps(&self) -> u16 {
        match self {
            AssetCategory::Native => 8_500,
            AssetCategory::LiquidStaking => 8_000,
            AssetCategory::Stable => 9_500,
            AssetCategory::BlueChip => 7_500,
            AssetCategory::Memecoin => 4_000,
            AssetCategory::LpStable => 7_500,
            AssetCategory::LpVolatile => 6_000,
            AssetCategory::Other => 6_000,
        }
    }

    pub fn is_lp(&self) -> bool {
        matches!(self, AssetCategory::LpStable | AssetCategory::LpVolatile)
    }
}

/// Global protocol configuration singleton.
#[account]
#[derive(InitSpace)]
pub struct Config {
    pub admin: Pubkey,
    /// Card-issuer principal allowed to call record_debt
    pub operator: Pubkey,
    pub paused: bool,
    pub ltv_max_bps: u16,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    /// Annual borrow rate in basis points
    pub interest_rate_bps: u16,
    pub max_staleness_secs: i64,
    pub max_confidence_bps: u16,
    /// Stablecoin debt is denominated in
    pub debt_mint: Pubkey,
    /// Ray precision; starts at 1 ray and never decreases
    pub global_borrow_index: u128,
    pub last_update_timestamp: i64,
    /// Protocol-wide scaled debt
    pub total_debt_shares: u128,
    /// Set when a liquidation leaves a position owing more than it holds
    pub bad_debt_flagged: bool,
    pub bump: u8,
}

impl Config {
    pub fn params_valid(ltv_max_bps: u16, liquidation_threshold_bps: u16) -> bool {
        ltv_max_bps <= liquidation_threshold_bps && liquidation_threshold_bps <= 10_000
    }

    /// Advance the global borrow index to `now`. Idempotent within one
    /// second-step.
    pub fn accrue(&mut self, now: i64) -> Result<()> {
        let elapsed = now.saturating_sub(self.last_update_timestamp);
        if elapsed <= 0 {
            return Ok(());
        }
        self.global_borrow_index =
            math::compound_index(self.global_borrow_index, self.interest_rate_bps, elapsed)?;
        self.last_update_timestamp = now;
        Ok(())
    }
}

/// Per-mint whitelist entry. Parameters override Config for this asset,
/// capped by the category ceilings.
#[account]
#[derive(InitSpace)]
pub struct CollateralAsset {
    pub mint: Pubkey,
    pub category: AssetCategory,
    pub decimals: u8,
    pub max_ltv_bps: u16,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    pub oracle: Pubkey,
    /// Disabling forbids new deposits and borrows against this mint, not
    /// withdrawals or repayments
    pub enabled: bool,
    /// Cap in asset units; 0 = unlimited
    pub max_deposit: u64,
    pub min_deposit_usd_micro: u64,
    /// LP metadata, zeroed unless category is lp_*
    pub lp_pool: Pubkey,
    pub lp_token_a: Pubkey,
    pub lp_token_b: Pubkey,
    pub total_deposited: u64,
    pub bump: u8,
}

impl CollateralAsset {
    pub fn effective_ltv_bps(&self) -> u16 {
        self.max_ltv_bps.min(self.category.max_ltv_cap_bps())
    }

    pub fn effective_liquidation_threshold_bps(&self) -> u16 {
        self.liquidation_threshold_bps
            .min(self.category.liquidation_threshold_cap_bps())
    }
}

#[derive(AnchorSerialize, AnchorDeserialize, Clone, Copy, InitSpace)]
pub struct CollateralBalance {
    pub mint: Pubkey,
    pub amount: u64,
}

/// Per-owner credit position.
#[account]
#[derive(InitSpace)]
pub struct Position {
    pub owner: Pubkey,
    #[max_len(8)]
    pub collateral: Vec<CollateralBalance>,
    /// Scaled debt: current debt = shares * global_borrow_index / RAY
    pub debt_shares: u128,
    pub borrow_index_snapshot: u128,
    pub last_update_timestamp: i64,
    /// Ring of recent authorization tags for at-most-once record_debt
    pub recent_auth_tags: [[u8; 32]; RECENT_AUTH_RING],
    pub recent_auth_head: u8,
    pub bump: u8,
}

impl Position {
    pub fn collateral_of(&self, mint: &Pubkey) -> u64 {
        self.collateral
            .iter()
            .find(|c| c.mint == *mint)
            .map(|c| c.amount)
            .unwrap_or(0)
    }

    pub fn credit_collateral(&mut self, mint: &Pubkey, amount: u64) -> Result<()> {
        if let Some(entry) = self.collateral.iter_mut().find(|c| c.mint == *mint) {
            entry.amount = entry
                .amount
                .checked_add(amount)
                .ok_or(CreditError::MathOverflow)?;
            return Ok(());
        }
        require!(
            self.collateral.len() < MAX_COLLATERAL_TYPES,
            CreditError::MaxCollateralTypesReached
        );
        self.collateral.push(CollateralBalance {
            mint: *mint,
            amount,
        });
        Ok(())
    }

    pub fn debit_collateral(&mut self, mint: &Pubkey, amount: u64) -> Result<()> {
        let entry = self
            .collateral
            .iter_mut()
            .find(|c| c.mint == *mint)
            .ok_or(CreditError::InsufficientCollateralOfMint)?;
        entry.amount = entry
            .amount
            .checked_sub(amount)
            .ok_or(CreditError::InsufficientCollateral)?;
        self.collateral.retain(|c| c.amount > 0);
        Ok(())
    }

    /// Debt owed right now, given the post-accrual index.
    pub fn current_debt_usd_micro(&self, global_borrow_index: u128) -> Result<u64> {
        math::debt_from_shares(self.debt_shares, global_borrow_index)
    }

    pub fn has_auth_tag(&self, tag: &[u8; 32]) -> bool {
        *tag != [0u8; 32] && self.recent_auth_tags.iter().any(|t| t == tag)
    }

    pub fn push_auth_tag(&mut self, tag: [u8; 32]) {
        let slot = self.recent_auth_head as usize % RECENT_AUTH_RING;
        self.recent_auth_tags[slot] = tag;
        self.recent_auth_head = self.recent_auth_head.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::RAY;

    fn position() -> Position {
        Position {
            owner: Pubkey::new_unique(),
            collateral: vec![],
            debt_shares: 0,
            borrow_index_snapshot: RAY,
            last_update_timestamp: 0,
            recent_auth_tags: [[0u8; 32]; RECENT_AUTH_RING],
            recent_auth_head: 0,
            bump: 255,
        }
    }

    #[test]
    fn test_collateral_credit_debit() {
        let mut p = position();
        let mint = Pubkey::new_unique();
        p.credit_collateral(&mint, 500).unwrap();
        p.credit_collateral(&mint, 250).unwrap();
        assert_eq!(p.collateral_of(&mint), 750);
        p.debit_collateral(&mint, 750).unwrap();
        assert!(p.collateral.is_empty());
    }

    #[test]
    fn test_collateral_type_cap() {
        let mut p = position();
        for _ in 0..MAX_COLLATERAL_TYPES {
            p.credit_collateral(&Pubkey::new_unique(), 1).unwrap();
        }
        assert!(p.credit_collateral(&Pubkey::new_unique(), 1).is_err());
    }

    #[test]
    fn test_auth_ring_dedupes_and_evicts() {
        let mut p = position();
        let tag = [0xAA; 32];
        assert!(!p.has_auth_tag(&tag));
        p.push_auth_tag(tag);
        assert!(p.has_auth_tag(&tag));
        // fill the ring; the oldest entry falls out
        for i in 0..RECENT_AUTH_RING as u8 {
            p.push_auth_tag([i + 1; 32]);
        }
        assert!(!p.has_auth_tag(&tag));
        assert!(p.has_auth_tag(&[1; 32]));
    }

    #[test]
    fn test_category_caps_apply() {
        let asset = CollateralAsset {
            mint: Pubkey::new_unique(),
            category: AssetCategory::Memecoin,
            decimals: 6,
            max_ltv_bps: 8_000,
            liquidation_threshold_bps: 9_000,
            liquidation_bonus_bps: 500,
            oracle: Pubkey::new_unique(),
            enabled: true,
            max_deposit: 0,
            min_deposit_usd_micro: 0,
            lp_pool: Pubkey::default(),
            lp_token_a: Pubkey::default(),
            lp_token_b: Pubkey::default(),
            total_deposited: 0,
            bump: 255,
        };
        assert_eq!(asset.effective_ltv_bps(), 3_000);
        assert_eq!(asset.effective_liquidation_threshold_bps(), 4_000);
    }

    #[test]
    fn test_zero_debt_reads_zero() {
        let p = position();
        assert_eq!(p.current_debt_usd_micro(2 * RAY).unwrap(), 0);
    }

    #[test]
    fn test_position_schema_round_trip() {
        let mut p = position();
        let mint = Pubkey::new_unique();
        p.credit_collateral(&mint, 123).unwrap();
        p.debt_shares = 42 * RAY;
        p.borrow_index_snapshot = RAY + 7;
        p.push_auth_tag([9; 32]);

        let mut buf = Vec::new();
        p.serialize(&mut buf).unwrap();
        let q = Position::deserialize(&mut buf.as_slice()).unwrap();

        assert_eq!(q.owner, p.owner);
        assert_eq!(q.collateral.len(), 1);
        assert_eq!(q.collateral_of(&mint), 123);
        assert_eq!(q.debt_shares, p.debt_shares);
        assert_eq!(q.borrow_index_snapshot, p.borrow_index_snapshot);
        assert_eq!(q.recent_auth_tags, p.recent_auth_tags);
        assert_eq!(q.recent_auth_head, p.recent_auth_head);
    }

    #[test]
    fn test_config_accrual_idempotent_within_a_second() {
        let mut config = Config {
            admin: Pubkey::new_unique(),
            operator: Pubkey::new_unique(),
            paused: false,
            ltv_max_bps: 6_000,
            liquidation_threshold_bps: 7_500,
            liquidation_bonus_bps: 500,
            interest_rate_bps: 500,
            max_staleness_secs: 30,
            max_confidence_bps: 500,
            debt_mint: Pubkey::new_unique(),
            global_borrow_index: RAY,
            last_update_timestamp: 1_000,
            total_debt_shares: 77,
            bad_debt_flagged: false,
            bump: 255,
        };
        config.accrue(2_000).unwrap();
        let index = config.global_borrow_index;
        assert!(index > RAY);

        let mut first = Vec::new();
        config.serialize(&mut first).unwrap();
        config.accrue(2_000).unwrap();
        let mut second = Vec::new();
        config.serialize(&mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_config_index_monotone_across_accruals() {
        let mut config = Config {
            admin: Pubkey::default(),
            operator: Pubkey::default(),
            paused: false,
            ltv_max_bps: 6_000,
            liquidation_threshold_bps: 7_500,
            liquidation_bonus_bps: 500,
            interest_rate_bps: 1_200,
            max_staleness_secs: 30,
            max_confidence_bps: 500,
            debt_mint: Pubkey::default(),
            global_borrow_index: RAY,
            last_update_timestamp: 0,
            total_debt_shares: 1,
            bad_debt_flagged: false,
            bump: 255,
        };
        let mut previous = config.global_borrow_index;
        for step in 1..=10 {
            config.accrue(step * 3_600).unwrap();
            assert!(config.global_borrow_index >= previous);
            previous = config.global_borrow_index;
        }
    }
}
