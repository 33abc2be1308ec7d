//! Customer notifications for account lifecycle events.

use std::sync::OnceLock;

use common::AggregateId;
use domain::account::events::{
    ACCOUNT_CLOSED, ACCOUNT_OPENED, AccountOpened, FUNDS_WITHDRAWN, FundsWithdrawn,
};
use event_bus::{DispatchError, Reactor, ReactorHandlers, Result};
use event_store::DomainEvent;
use parking_lot::Mutex;
use serde::Serialize;

/// A message queued for delivery to the account holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub account_id: AggregateId,
    pub message: String,
}

/// Reactor that queues a notification per lifecycle event.
///
/// Sending a notification is an external side effect, so the notifier is
/// registered as a plain reactor and never receives replayed events.
#[derive(Debug, Default)]
pub struct AccountNotifier {
    outbox: Mutex<Vec<Notification>>,
}

impl AccountNotifier {
    /// Event names this reactor handles.
    pub const ROUTING_KEYS: [&'static str; 3] = [ACCOUNT_OPENED, FUNDS_WITHDRAWN, ACCOUNT_CLOSED];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.outbox.lock().clone()
    }

    /// Removes and returns the queued notifications.
    pub fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.outbox.lock())
    }

    fn push(&self, event: &DomainEvent, message: String) -> Result<()> {
        let account_id = event
            .aggregate_id()
            .ok_or_else(|| DispatchError::Listener(format!("{} has no aggregate id", event.name())))?;
        tracing::debug!(%account_id, event_name = event.name(), "notification queued");
        self.outbox.lock().push(Notification {
            account_id,
            message,
        });
        Ok(())
    }

    fn apply_account_opened(&self, event: &DomainEvent) -> Result<()> {
        let data: AccountOpened = event.payload_as()?;
        self.push(event, format!("Welcome, {}! Your account is open.", data.owner))
    }

    fn apply_funds_withdrawn(&self, event: &DomainEvent) -> Result<()> {
        let data: FundsWithdrawn = event.payload_as()?;
        self.push(event, format!("Withdrawal of {} processed.", data.amount))
    }

    fn apply_account_closed(&self, event: &DomainEvent) -> Result<()> {
        self.push(event, "Your account has been closed.".to_string())
    }
}

impl Reactor for AccountNotifier {
    const NAME: &'static str = "AccountNotifier";

    fn handlers() -> &'static ReactorHandlers<Self> {
        static HANDLERS: OnceLock<ReactorHandlers<AccountNotifier>> = OnceLock::new();
        HANDLERS.get_or_init(|| {
            ReactorHandlers::<Self>::new()
                .on(ACCOUNT_OPENED, Self::apply_account_opened)
                .on(FUNDS_WITHDRAWN, Self::apply_funds_withdrawn)
                .on(ACCOUNT_CLOSED, Self::apply_account_closed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::account::events;
    use event_store::Version;

    #[test]
    fn queues_one_message_per_event() {
        let notifier = AccountNotifier::new();
        let id = AggregateId::new();

        let mut opened = events::account_opened("ada").unwrap();
        opened.record_for(id, "Account", Version::new(1)).unwrap();
        notifier.handle(opened.name(), &opened).unwrap();

        let mut withdrawn = events::funds_withdrawn(25).unwrap();
        withdrawn.record_for(id, "Account", Version::new(2)).unwrap();
        notifier.handle(withdrawn.name(), &withdrawn).unwrap();

        let sent = notifier.drain();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].account_id, id);
        assert!(sent[0].message.contains("ada"));
        assert!(sent[1].message.contains("25"));
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn deposits_are_not_handled() {
        let notifier = AccountNotifier::new();
        let deposit = events::funds_deposited(5).unwrap();

        assert!(matches!(
            notifier.handle(deposit.name(), &deposit),
            Err(DispatchError::HandlerNotFound {
                target: "AccountNotifier",
                ..
            })
        ));
    }
}
