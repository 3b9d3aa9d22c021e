use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};

use crate::constants::{
    CONFIG_SEED, MAX_LIQUIDATION_BONUS_BPS, VAULT_AUTHORITY_SEED, VAULT_SEED, WHITELIST_SEED,
};
use crate::errors::CreditError;
use crate::events::TokenWhitelisted;
use crate::state::{AssetCategory, CollateralAsset, Config};

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct WhitelistTokenParams {
    pub category: AssetCategory,
    pub max_ltv_bps: u16,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    pub enabled: bool,
    pub max_deposit: u64,
    pub min_deposit_usd_micro: u64,
    pub lp_pool: Option<Pubkey>,
    pub lp_token_a: Option<Pubkey>,
    pub lp_token_b: Option<Pubkey>,
}

#[derive(Accounts)]
pub struct WhitelistToken<'info> {
    #[account(
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = admin @ CreditError::Unauthorized
    )]
    pub config: Account<'info, Config>,

    #[account(
        init_if_needed,
        payer = admin,
        space = 8 + CollateralAsset::INIT_SPACE,
        seeds = [WHITELIST_SEED, mint.key().as_ref()],
        bump
    )]
    pub whitelist: Account<'info, CollateralAsset>,

    pub mint: Account<'info, Mint>,

    /// CHECK: price account, layout validated at every read
    pub oracle: UncheckedAccount<'info>,

    /// CHECK: PDA signer that owns all protocol vaults
    #[account(seeds = [VAULT_AUTHORITY_SEED], bump)]
    pub vault_authority: UncheckedAccount<'info>,

    /// Per-mint custody vault
    #[account(
        init_if_needed,
        payer = admin,
        seeds = [VAULT_SEED, mint.key().as_ref()],
        bump,
        token::mint = mint,
        token::authority = vault_authority
    )]
    pub vault: Account<'info, TokenAccount>,

    #[account(mut)]
    pub admin: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

pub fn handler(ctx: Context<WhitelistToken>, params: WhitelistTokenParams) -> Result<()> {
    require!(
        Config::params_valid(params.max_ltv_bps, params.liquidation_threshold_bps),
        CreditError::InvalidParameters
    );
    require!(
        params.liquidation_bonus_bps <= MAX_LIQUIDATION_BONUS_BPS,
        CreditError::InvalidParameters
    );
    if params.category.is_lp() {
        require!(
            params.lp_pool.is_some() && params.lp_token_a.is_some() && params.lp_token_b.is_some(),
            CreditError::InvalidParameters
        );
    }

    let whitelist = &mut ctx.accounts.whitelist;
    // total_deposited survives re-whitelisting of an existing entry
    whitelist.mint = ctx.accounts.mint.key();
    whitelist.category = params.category;
    whitelist.decimals = ctx.accounts.mint.decimals;
    whitelist.max_ltv_bps = params.max_ltv_bps;
    whitelist.liquidation_threshold_bps = params.liquidation_threshold_bps;
    whitelist.liquidation_bonus_bps = params.liquidation_bonus_bps;
    whitelist.oracle = ctx.accounts.oracle.key();
    whitelist.enabled = params.enabled;
    whitelist.max_deposit = params.max_deposit;
    whitelist.min_deposit_usd_micro = params.min_deposit_usd_micro;
    whitelist.lp_pool = params.lp_pool.unwrap_or_default();
    whitelist.lp_token_a = params.lp_token_a.unwrap_or_default();
    whitelist.lp_token_b = params.lp_token_b.unwrap_or_default();
    whitelist.bump = ctx.bumps.whitelist;

    emit!(TokenWhitelisted {
        mint: whitelist.mint,
        category: whitelist.category,
        max_ltv_bps: whitelist.max_ltv_bps,
        liquidation_threshold_bps: whitelist.liquidation_threshold_bps,
        enabled: whitelist.enabled,
    });
    msg!("Whitelisted {} ({:?})", whitelist.mint, whitelist.category);
    Ok(())
}
