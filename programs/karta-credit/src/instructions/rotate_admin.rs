use anchor_lang::prelude::*;

use crate::constants::CONFIG_SEED;
use crate::errors::CreditError;
use crate::events::AdminRotated;
use crate::state::Config;

#[derive(Accounts)]
pub struct RotateAdmin<'info> {
    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = admin @ CreditError::Unauthorized
    )]
    pub config: Account<'info, Config>,

    pub admin: Signer<'info>,
}

pub fn handler(ctx: Context<RotateAdmin>, new_admin: Pubkey) -> Result<()> {
    require!(new_admin != Pubkey::default(), CreditError::InvalidParameters);

    let config = &mut ctx.accounts.config;
    let old_admin = config.admin;
    config.admin = new_admin;

    emit!(AdminRotated {
        old_admin,
        new_admin,
    });
    msg!("Admin rotated to {}", new_admin);
    Ok(())
}
