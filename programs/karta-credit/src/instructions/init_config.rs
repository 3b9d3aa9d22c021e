use anchor_lang::prelude::*;
use anchor_spl::token::{Mint, Token, TokenAccount};

use crate::constants::{CONFIG_SEED, RAY, VAULT_AUTHORITY_SEED, VAULT_SEED};
use crate::errors::CreditError;
use crate::events::ConfigInitialized;
use crate::state::Config;

#[derive(AnchorSerialize, AnchorDeserialize, Clone)]
pub struct InitConfigParams {
    pub operator: Pubkey,
    pub ltv_max_bps: u16,
    pub liquidation_threshold_bps: u16,
    pub liquidation_bonus_bps: u16,
    pub interest_rate_bps: u16,
    pub max_staleness_secs: i64,
    pub max_confidence_bps: u16,
}

#[derive(Accounts)]
pub struct InitConfig<'info> {
    #[account(
        init,
        payer = admin,
        space = 8 + Config::INIT_SPACE,
        seeds = [CONFIG_SEED],
        bump
    )]
    pub config: Account<'info, Config>,

    pub debt_mint: Account<'info, Mint>,

    /// CHECK: PDA signer that owns all protocol vaults
    #[account(seeds = [VAULT_AUTHORITY_SEED], bump)]
    pub vault_authority: UncheckedAccount<'info>,

    /// Stablecoin treasury that receives repayments and liquidation funds
    #[account(
        init,
        payer = admin,
        seeds = [VAULT_SEED, debt_mint.key().as_ref()],
        bump,
        token::mint = debt_mint,
        token::authority = vault_authority
    )]
    pub treasury: Account<'info, TokenAccount>,

    #[account(mut)]
    pub admin: Signer<'info>,

    pub token_program: Program<'info, Token>,
    pub system_program: Program<'info, System>,
}

pub fn handler(ctx: Context<InitConfig>, params: InitConfigParams) -> Result<()> {
    require!(
        Config::params_valid(params.ltv_max_bps, params.liquidation_threshold_bps),
        CreditError::InvalidParameters
    );
    require!(params.max_staleness_secs > 0, CreditError::InvalidParameters);
    require!(params.operator != Pubkey::default(), CreditError::InvalidParameters);

    let now = Clock::get()?.unix_timestamp;
    let config = &mut ctx.accounts.config;
    config.admin = ctx.accounts.admin.key();
    config.operator = params.operator;
    config.paused = false;
    config.ltv_max_bps = params.ltv_max_bps;
    config.liquidation_threshold_bps = params.liquidation_threshold_bps;
    config.liquidation_bonus_bps = params.liquidation_bonus_bps;
    config.interest_rate_bps = params.interest_rate_bps;
    config.max_staleness_secs = params.max_staleness_secs;
    config.max_confidence_bps = params.max_confidence_bps;
    config.debt_mint = ctx.accounts.debt_mint.key();
    config.global_borrow_index = RAY;
    config.last_update_timestamp = now;
    config.total_debt_shares = 0;
    config.bad_debt_flagged = false;
    config.bump = ctx.bumps.config;

    emit!(ConfigInitialized {
        admin: config.admin,
        operator: config.operator,
        debt_mint: config.debt_mint,
        ltv_max_bps: config.ltv_max_bps,
        liquidation_threshold_bps: config.liquidation_threshold_bps,
        interest_rate_bps: config.interest_rate_bps,
    });
    msg!("Config initialized, admin {}", config.admin);
    Ok(())
}
