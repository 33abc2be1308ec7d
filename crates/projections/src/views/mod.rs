//! Read model views and reactors for the account domain.

mod account_balances;
mod account_notifier;

pub use account_balances::{AccountBalance, AccountBalances};
pub use account_notifier::{AccountNotifier, Notification};
