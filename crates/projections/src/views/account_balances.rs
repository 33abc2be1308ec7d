//! Account balances read model, one entry per account.

use std::collections::HashMap;
use std::sync::OnceLock;

use common::AggregateId;
use domain::AccountStatus;
use domain::account::events::{
    ACCOUNT_CLOSED, ACCOUNT_OPENED, AccountOpened, FUNDS_DEPOSITED, FUNDS_WITHDRAWN,
    FundsDeposited, FundsWithdrawn,
};
use event_bus::{DispatchError, Projector, Reactor, ReactorHandlers, Result};
use event_store::{DomainEvent, Version};
use parking_lot::RwLock;
use serde::Serialize;

use crate::read_model::ReadModel;

/// Balance summary of a single account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountBalance {
    pub account_id: AggregateId,
    pub owner: String,
    pub balance: i64,
    pub status: AccountStatus,
    /// Aggregate version of the last event folded into this entry.
    pub version: Version,
}

/// Projector maintaining the balance of every account.
///
/// Events at or below an entry's version are ignored, so delivering the same
/// event twice (live dispatch followed by a replay without reset) leaves the
/// view unchanged.
#[derive(Debug, Default)]
pub struct AccountBalances {
    accounts: RwLock<HashMap<AggregateId, AccountBalance>>,
}

impl AccountBalances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, account_id: AggregateId) -> Option<AccountBalance> {
        self.accounts.read().get(&account_id).cloned()
    }

    /// Sum of all open account balances, saturating at the `i64` bounds.
    pub fn total_open_balance(&self) -> i64 {
        self.accounts
            .read()
            .values()
            .filter(|a| a.status == AccountStatus::Open)
            .fold(0, |total, a| total.saturating_add(a.balance))
    }

    pub fn open_accounts(&self) -> Vec<AccountBalance> {
        self.accounts
            .read()
            .values()
            .filter(|a| a.status == AccountStatus::Open)
            .cloned()
            .collect()
    }

    fn apply_account_opened(&self, event: &DomainEvent) -> Result<()> {
        let account_id = account_id(event)?;
        let data: AccountOpened = event.payload_as()?;
        self.accounts
            .write()
            .entry(account_id)
            .or_insert_with(|| AccountBalance {
                account_id,
                owner: data.owner,
                balance: 0,
                status: AccountStatus::Open,
                version: event.aggregate_version(),
            });
        Ok(())
    }

    fn apply_funds_deposited(&self, event: &DomainEvent) -> Result<()> {
        let data: FundsDeposited = event.payload_as()?;
        self.update(event, |account| {
            let balance = account
                .balance
                .checked_add(data.amount)
                .ok_or_else(|| overflow(account, data.amount))?;
            account.balance = balance;
            Ok(())
        })
    }

    fn apply_funds_withdrawn(&self, event: &DomainEvent) -> Result<()> {
        let data: FundsWithdrawn = event.payload_as()?;
        self.update(event, |account| {
            let balance = account
                .balance
                .checked_sub(data.amount)
                .ok_or_else(|| overflow(account, data.amount))?;
            account.balance = balance;
            Ok(())
        })
    }

    fn apply_account_closed(&self, event: &DomainEvent) -> Result<()> {
        self.update(event, |account| {
            account.status = AccountStatus::Closed;
            Ok(())
        })
    }

    // The entry is left untouched when `change` fails.
    fn update(
        &self,
        event: &DomainEvent,
        change: impl FnOnce(&mut AccountBalance) -> Result<()>,
    ) -> Result<()> {
        let account_id = account_id(event)?;
        let mut accounts = self.accounts.write();
        let account = accounts.get_mut(&account_id).ok_or_else(|| {
            DispatchError::Listener(format!("{} for unknown account {account_id}", event.name()))
        })?;

        if event.aggregate_version() <= account.version {
            tracing::debug!(%account_id, event_name = event.name(), "event already projected");
            return Ok(());
        }
        change(account)?;
        account.version = event.aggregate_version();
        Ok(())
    }
}

fn overflow(account: &AccountBalance, amount: i64) -> DispatchError {
    DispatchError::Listener(format!(
        "balance of account {} overflows applying {amount} to {}",
        account.account_id, account.balance
    ))
}

fn account_id(event: &DomainEvent) -> Result<AggregateId> {
    event
        .aggregate_id()
        .ok_or_else(|| DispatchError::Listener(format!("{} has no aggregate id", event.name())))
}

impl Reactor for AccountBalances {
    const NAME: &'static str = "AccountBalances";

    fn handlers() -> &'static ReactorHandlers<Self> {
        static HANDLERS: OnceLock<ReactorHandlers<AccountBalances>> = OnceLock::new();
        HANDLERS.get_or_init(|| {
            ReactorHandlers::<Self>::new()
                .on(ACCOUNT_OPENED, Self::apply_account_opened)
                .on(FUNDS_DEPOSITED, Self::apply_funds_deposited)
                .on(FUNDS_WITHDRAWN, Self::apply_funds_withdrawn)
                .on(ACCOUNT_CLOSED, Self::apply_account_closed)
        })
    }
}

impl Projector for AccountBalances {}

impl ReadModel for AccountBalances {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn count(&self) -> usize {
        self.accounts.read().len()
    }

    fn reset(&self) {
        self.accounts.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::account::events;

    fn recorded(mut event: DomainEvent, id: AggregateId, version: i64) -> DomainEvent {
        event.record_for(id, "Account", Version::new(version)).unwrap();
        event
    }

    fn handle(view: &AccountBalances, event: &DomainEvent) -> Result<()> {
        Reactor::handle(view, event.name(), event)
    }

    #[test]
    fn folds_account_events() {
        let view = AccountBalances::new();
        let id = AggregateId::new();

        handle(&view, &recorded(events::account_opened("ada").unwrap(), id, 1)).unwrap();
        handle(&view, &recorded(events::funds_deposited(80).unwrap(), id, 2)).unwrap();
        handle(&view, &recorded(events::funds_withdrawn(30).unwrap(), id, 3)).unwrap();

        let account = view.get(id).unwrap();
        assert_eq!(account.owner, "ada");
        assert_eq!(account.balance, 50);
        assert_eq!(account.version, Version::new(3));
        assert_eq!(view.total_open_balance(), 50);
        assert_eq!(view.count(), 1);
    }

    #[test]
    fn overflowing_deposit_is_rejected_and_leaves_the_entry_alone() {
        let view = AccountBalances::new();
        let id = AggregateId::new();

        handle(&view, &recorded(events::account_opened("ada").unwrap(), id, 1)).unwrap();
        handle(&view, &recorded(events::funds_deposited(i64::MAX).unwrap(), id, 2)).unwrap();
        let result = handle(&view, &recorded(events::funds_deposited(1).unwrap(), id, 3));

        assert!(matches!(result, Err(DispatchError::Listener(_))));
        let account = view.get(id).unwrap();
        assert_eq!(account.balance, i64::MAX);
        assert_eq!(account.version, Version::new(2));
        assert_eq!(view.total_open_balance(), i64::MAX);
    }

    #[test]
    fn duplicate_delivery_is_ignored() {
        let view = AccountBalances::new();
        let id = AggregateId::new();
        let deposit = recorded(events::funds_deposited(10).unwrap(), id, 2);

        handle(&view, &recorded(events::account_opened("ada").unwrap(), id, 1)).unwrap();
        handle(&view, &deposit).unwrap();
        handle(&view, &deposit).unwrap();

        assert_eq!(view.get(id).unwrap().balance, 10);
    }

    #[test]
    fn closed_accounts_leave_the_open_set() {
        let view = AccountBalances::new();
        let id = AggregateId::new();

        handle(&view, &recorded(events::account_opened("ada").unwrap(), id, 1)).unwrap();
        handle(&view, &recorded(events::account_closed(None).unwrap(), id, 2)).unwrap();

        assert_eq!(view.get(id).unwrap().status, AccountStatus::Closed);
        assert!(view.open_accounts().is_empty());
    }

    #[test]
    fn deposit_for_unknown_account_fails() {
        let view = AccountBalances::new();
        let event = recorded(events::funds_deposited(10).unwrap(), AggregateId::new(), 2);

        assert!(matches!(handle(&view, &event), Err(DispatchError::Listener(_))));
    }

    #[test]
    fn reset_clears_entries() {
        let view = AccountBalances::new();
        handle(
            &view,
            &recorded(events::account_opened("ada").unwrap(), AggregateId::new(), 1),
        )
        .unwrap();

        view.reset();
        assert_eq!(view.count(), 0);
    }
}
