//! Bank account aggregate and its events.

mod aggregate;
pub mod events;

pub use aggregate::{Account, AccountStatus};
pub use events::{AccountClosed, AccountOpened, FundsDeposited, FundsWithdrawn};

use thiserror::Error;

/// Business rule violations raised by [`Account`] commands.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    /// Owner is required.
    #[error("Account owner is required")]
    OwnerRequired,

    /// The account was already opened.
    #[error("Account already opened")]
    AlreadyOpened,

    /// The command needs an open account.
    #[error("Cannot {action}: account is not open")]
    NotOpen { action: &'static str },

    /// Amounts must be positive.
    #[error("Invalid amount: {amount} (must be greater than 0)")]
    InvalidAmount { amount: i64 },

    #[error("Insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: i64, requested: i64 },

    #[error("Balance overflow: balance {balance}, amount {amount}")]
    BalanceOverflow { balance: i64, amount: i64 },

    /// Only empty accounts can be closed.
    #[error("Cannot close account with balance {balance}")]
    BalanceNotZero { balance: i64 },
}
