//! Account aggregate implementation.

use std::fmt;
use std::sync::OnceLock;

use common::Attributes;
use event_store::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::aggregate::{AggregateRoot, AggregateState, ApplyHandlers};
use crate::error::Result;

use super::AccountError;
use super::events::{self, AccountClosed, AccountOpened, FundsDeposited, FundsWithdrawn};

const OWNER: &str = "owner";
const BALANCE: &str = "balance";
const STATUS: &str = "status";
const OPENED_AT: &str = "opened_at";
const CLOSED_AT: &str = "closed_at";

/// Lifecycle of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Open,
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountStatus::Open => write!(f, "open"),
            AccountStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Account aggregate root.
///
/// State lives in the attribute bag: `owner`, `balance` (minor units),
/// `status`, `opened_at` and `closed_at`.
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Account {
    root: AggregateState,
}

impl AggregateRoot for Account {
    const AGGREGATE_TYPE: &'static str = "Account";

    fn instantiate(root: AggregateState) -> Self {
        Self { root }
    }

    fn root(&self) -> &AggregateState {
        &self.root
    }

    fn root_mut(&mut self) -> &mut AggregateState {
        &mut self.root
    }

    fn handlers() -> &'static ApplyHandlers<Self> {
        static HANDLERS: OnceLock<ApplyHandlers<Account>> = OnceLock::new();
        HANDLERS.get_or_init(|| {
            ApplyHandlers::<Self>::new()
                .on(events::ACCOUNT_OPENED, Self::apply_account_opened)
                .on(events::FUNDS_DEPOSITED, Self::apply_funds_deposited)
                .on(events::FUNDS_WITHDRAWN, Self::apply_funds_withdrawn)
                .on(events::ACCOUNT_CLOSED, Self::apply_account_closed)
        })
    }

    fn defaults() -> Attributes {
        [(BALANCE, 0)].into_iter().collect()
    }
}

// Query methods
impl Account {
    pub fn owner(&self) -> Option<&str> {
        self.root.get_attribute(OWNER).and_then(|v| v.as_str())
    }

    /// Current balance in minor units.
    pub fn balance(&self) -> Result<i64> {
        Ok(self.root.get_attribute_as::<i64>(BALANCE)?.unwrap_or(0))
    }

    /// `None` until the account has been opened.
    pub fn status(&self) -> Result<Option<AccountStatus>> {
        self.root.get_attribute_as(STATUS)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status(), Ok(Some(AccountStatus::Open)))
    }
}

// Command methods (record events)
impl Account {
    pub fn open(&mut self, owner: impl Into<String>) -> Result<()> {
        let owner = owner.into();
        if self.status()?.is_some() {
            return Err(AccountError::AlreadyOpened.into());
        }
        if owner.trim().is_empty() {
            return Err(AccountError::OwnerRequired.into());
        }
        self.record_that(events::account_opened(owner)?)
    }

    pub fn deposit(&mut self, amount: i64) -> Result<()> {
        self.ensure_open("deposit")?;
        ensure_positive(amount)?;
        adjusted(self.balance()?, amount)?;
        self.record_that(events::funds_deposited(amount)?)
    }

    pub fn withdraw(&mut self, amount: i64) -> Result<()> {
        self.ensure_open("withdraw")?;
        ensure_positive(amount)?;

        let balance = self.balance()?;
        if amount > balance {
            return Err(AccountError::InsufficientFunds {
                balance,
                requested: amount,
            }
            .into());
        }
        self.record_that(events::funds_withdrawn(amount)?)
    }

    pub fn close(&mut self, reason: Option<String>) -> Result<()> {
        self.ensure_open("close")?;

        let balance = self.balance()?;
        if balance != 0 {
            return Err(AccountError::BalanceNotZero { balance }.into());
        }
        self.record_that(events::account_closed(reason)?)
    }

    fn ensure_open(&self, action: &'static str) -> Result<()> {
        match self.status()? {
            Some(AccountStatus::Open) => Ok(()),
            _ => Err(AccountError::NotOpen { action }.into()),
        }
    }
}

fn adjusted(balance: i64, amount: i64) -> Result<i64> {
    balance
        .checked_add(amount)
        .ok_or_else(|| AccountError::BalanceOverflow { balance, amount }.into())
}

fn ensure_positive(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(AccountError::InvalidAmount { amount }.into());
    }
    Ok(())
}

// Event handlers
impl Account {
    fn apply_account_opened(&mut self, event: &DomainEvent) -> Result<()> {
        let data: AccountOpened = event.payload_as()?;
        self.root.set_attribute(OWNER, data.owner);
        self.root.set_attribute_from(STATUS, &AccountStatus::Open)?;
        self.root.set_attribute_from(OPENED_AT, &data.opened_at)?;
        Ok(())
    }

    fn apply_funds_deposited(&mut self, event: &DomainEvent) -> Result<()> {
        let data: FundsDeposited = event.payload_as()?;
        let balance = adjusted(self.balance()?, data.amount)?;
        self.root.set_attribute(BALANCE, balance);
        Ok(())
    }

    fn apply_funds_withdrawn(&mut self, event: &DomainEvent) -> Result<()> {
        let data: FundsWithdrawn = event.payload_as()?;
        let balance = self.balance()?;
        let balance = balance
            .checked_sub(data.amount)
            .ok_or(AccountError::BalanceOverflow {
                balance,
                amount: data.amount,
            })?;
        self.root.set_attribute(BALANCE, balance);
        Ok(())
    }

    fn apply_account_closed(&mut self, event: &DomainEvent) -> Result<()> {
        let data: AccountClosed = event.payload_as()?;
        self.root.set_attribute_from(STATUS, &AccountStatus::Closed)?;
        self.root.set_attribute_from(CLOSED_AT, &data.closed_at)?;
        Ok(())
    }
}
