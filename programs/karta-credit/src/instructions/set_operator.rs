use anchor_lang::prelude::*;

use crate::constants::CONFIG_SEED;
use crate::errors::CreditError;
use crate::events::OperatorRotated;
use crate::state::Config;

#[derive(Accounts)]
pub struct SetOperator<'info> {
    #[account(
        mut,
        seeds = [CONFIG_SEED],
        bump = config.bump,
        has_one = admin @ CreditError::Unauthorized
    )]
    pub config: Account<'info, Config>,

    pub admin: Signer<'info>,
}

pub fn handler(ctx: Context<SetOperator>, new_operator: Pubkey) -> Result<()> {
    require!(new_operator != Pubkey::default(), CreditError::InvalidParameters);

    let config = &mut ctx.accounts.config;
    let old_operator = config.operator;
    config.operator = new_operator;

    emit!(OperatorRotated {
        old_operator,
        new_operator,
    });
    Ok(())
}
