use anchor_lang::prelude::*;
use anchor_spl::token::{self, Mint, Token, TokenAccount, Transfer};

use crate::constants::{CONFIG_SEED, POSITION_SEED, VAULT_AUTHORITY_SEED, VAULT_SEED, WHITELIST_SEED};
use crate::errors::CreditError;
use crate::events::CollateralAdded;
use crate::math;
use crate::oracle;
use crate::state::{CollateralAsset, Config, Position};

#[derive(Accounts)]
pub struct AddCollateral<'info> {
    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,

    #[account(
        mut,
        seeds = [WHITELIST_SEED, mint.key().as_ref()],
        bump = whitelist.bump
    )]
    pub whitelist: Account<'info, CollateralAsset>,

    #[account(
        mut,
        seeds = [POSITION_SEED, owner.key().as_ref()],
        bump = position.bump,
        has_one = owner @ CreditError::Unauthorized
    )]
    pub position: Account<'info, Position>,

    pub mint: Account<'info, Mint>,

    /// CHECK: must be the oracle registered for this mint
    #[account(address = whitelist.oracle @ CreditError::InvalidOracle)]
    pub oracle: UncheckedAccount<'info>,

    #[account(
        mut,
        constraint = owner_token.owner == owner.key() @ CreditError::InvalidTokenAccount,
        constraint = owner_token.mint == mint.key() @ CreditError::InvalidTokenAccount
    )]
    pub owner_token: Account<'info, TokenAccount>,

    #[account(
        mut,
        seeds = [VAULT_SEED, mint.key().as_ref()],
        bump,
        token::mint = mint,
        token::authority = vault_authority
    )]
    pub vault: Account<'info, TokenAccount>,

    /// CHECK: PDA signer that owns all protocol vaults
    #[account(seeds = [VAULT_AUTHORITY_SEED], bump)]
    pub vault_authority: UncheckedAccount<'info>,

    #[account(mut)]
    pub owner: Signer<'info>,

    pub token_program: Program<'info, Token>,
}

pub fn handler(ctx: Context<AddCollateral>, amount: u64) -> Result<()> {
    let config = &mut ctx.accounts.config;
    let whitelist = &mut ctx.accounts.whitelist;

    require!(!config.paused, CreditError::ProtocolPaused);
    require!(amount > 0, CreditError::InvalidAmount);
    require!(whitelist.enabled, CreditError::AssetDisabled);

    let now = Clock::get()?.unix_timestamp;
    config.accrue(now)?;

    let new_total = whitelist
        .total_deposited
        .checked_add(amount)
        .ok_or(CreditError::MathOverflow)?;
    if whitelist.max_deposit > 0 {
        require!(new_total <= whitelist.max_deposit, CreditError::DepositCapExceeded);
    }

    if whitelist.min_deposit_usd_micro > 0 {
        let price = oracle::read_price(
            &ctx.accounts.oracle.to_account_info(),
            now,
            config.max_staleness_secs,
            config.max_confidence_bps,
        )?;
        let value = math::asset_to_usd_micro(amount, price.price_ray, whitelist.decimals)?;
        require!(
            value >= whitelist.min_deposit_usd_micro,
            CreditError::BelowMinimumDeposit
        );
    }

    token::transfer(
        CpiContext::new(
            ctx.accounts.token_program.to_account_info(),
            Transfer {
                from: ctx.accounts.owner_token.to_account_info(),
                to: ctx.accounts.vault.to_account_info(),
                authority: ctx.accounts.owner.to_account_info(),
            },
        ),
        amount,
    )?;

    let position = &mut ctx.accounts.position;
    position.credit_collateral(&ctx.accounts.mint.key(), amount)?;
    position.last_update_timestamp = now;
    whitelist.total_deposited = new_total;

    emit!(CollateralAdded {
        owner: position.owner,
        mint: ctx.accounts.mint.key(),
        amount,
        total_of_mint: position.collateral_of(&ctx.accounts.mint.key()),
    });
    msg!("Deposited {} of {}", amount, ctx.accounts.mint.key());
    Ok(())
}
