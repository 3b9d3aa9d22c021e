pub mod accrue_interest;
pub mod add_collateral;
pub mod init_config;
pub mod init_position;
pub mod liquidate;
pub mod record_debt;
pub mod repay_debt;
pub mod rotate_admin;
pub mod set_operator;
pub mod set_oracle;
pub mod set_pause;
pub mod whitelist_token;
pub mod withdraw_collateral;

pub use accrue_interest::*;
pub use add_collateral::*;
pub use init_config::*;
pub use init_position::*;
pub use liquidate::*;
pub use record_debt::*;
pub use repay_debt::*;
pub use rotate_admin::*;
pub use set_operator::*;
pub use set_oracle::*;
pub use set_pause::*;
pub use whitelist_token::*;
pub use withdraw_collateral::*;
