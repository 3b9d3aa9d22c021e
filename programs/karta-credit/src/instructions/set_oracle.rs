use anchor_lang::prelude::*;

use crate::constants::{CONFIG_SEED, WHITELIST_SEED};
use crate::errors::CreditError;
use crate::events::OracleRotated;
use crate::state::{CollateralAsset, Config};

#[derive(Accounts)]
pub struct SetOracle<'info> {
    #[account(
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = admin @ CreditError::Unauthorized
    )]
    pub config: Account<'info, Config>,

    #[account(
        mut,
        seeds = [WHITELIST_SEED, whitelist.mint.as_ref()],
        bump = whitelist.bump
    )]
    pub whitelist: Account<'info, CollateralAsset>,

    /// CHECK: price account, layout validated at every read
    pub new_oracle: UncheckedAccount<'info>,

    pub admin: Signer<'info>,
}

pub fn handler(ctx: Context<SetOracle>) -> Result<()> {
    let whitelist = &mut ctx.accounts.whitelist;
    let old_oracle = whitelist.oracle;
    whitelist.oracle = ctx.accounts.new_oracle.key();

    emit!(OracleRotated {
        mint: whitelist.mint,
        old_oracle,
        new_oracle: whitelist.oracle,
    });
    msg!("Oracle for {} rotated to {}", whitelist.mint, whitelist.oracle);
    Ok(())
}
