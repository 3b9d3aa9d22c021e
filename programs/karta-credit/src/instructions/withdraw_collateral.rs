use anchor_lang::prelude::*;
use anchor_spl::token::{self, Mint, Token, TokenAccount, Transfer};

use crate::constants::{CONFIG_SEED, POSITION_SEED, VAULT_AUTHORITY_SEED, VAULT_SEED, WHITELIST_SEED};
use crate::errors::CreditError;
use crate::events::CollateralWithdrawn;
use crate::state::{CollateralAsset, Config, Position};
use crate::valuation;

/// Remaining accounts: one (whitelist, oracle) pair per collateral entry in
/// the post-withdraw position, in position order. A position with zero debt
/// needs no pairs.
#[derive(Accounts)]
pub struct WithdrawCollateral<'info> {
    #[account(mut, seeds = [CONFIG_SEED], bump = config.bump)]
    pub config: Account<'info, Config>,

    /// Withdrawals stay allowed for disabled whitelist entries
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

pub fn handler(ctx: Context<WithdrawCollateral>, amount: u64) -> Result<()> {
    let config = &mut ctx.accounts.config;

    require!(!config.paused, CreditError::ProtocolPaused);
    require!(amount > 0, CreditError::InvalidAmount);

    let now = Clock::get()?.unix_timestamp;
    config.accrue(now)?;

    let mint = ctx.accounts.mint.key();
    let position = &mut ctx.accounts.position;
    require!(
        position.collateral_of(&mint) >= amount,
        CreditError::InsufficientCollateral
    );
    position.debit_collateral(&mint, amount)?;

    // Zero debt means every withdrawal is allowed; no oracle needed
    let debt = position.current_debt_usd_micro(config.global_borrow_index)?;
    if debt > 0 {
        let portfolio = valuation::portfolio_value(
            position,
            ctx.remaining_accounts,
            ctx.program_id,
            now,
            config.max_staleness_secs,
            config.max_confidence_bps,
        )?;
        require!(
            debt <= portfolio.borrow_limit_usd_micro,
            CreditError::HealthViolation
        );
    }
    position.last_update_timestamp = now;

    let authority_seeds: &[&[u8]] = &[VAULT_AUTHORITY_SEED, &[ctx.bumps.vault_authority]];
    token::transfer(
        CpiContext::new_with_signer(
            ctx.accounts.token_program.to_account_info(),
            Transfer {
                from: ctx.accounts.vault.to_account_info(),
                to: ctx.accounts.owner_token.to_account_info(),
                authority: ctx.accounts.vault_authority.to_account_info(),
            },
            &[authority_seeds],
        ),
        amount,
    )?;

    let whitelist = &mut ctx.accounts.whitelist;
    whitelist.total_deposited = whitelist.total_deposited.saturating_sub(amount);

    emit!(CollateralWithdrawn {
        owner: ctx.accounts.position.owner,
        mint,
        amount,
        remaining_of_mint: ctx.accounts.position.collateral_of(&mint),
    });
    msg!("Withdrew {} of {}", amount, mint);
    Ok(())
}
