//! Account domain events.
//!
//! Payloads are typed structs serialized into the event's payload map, so the
//! stored form stays a flat JSON object.

use chrono::{DateTime, Utc};
use event_store::DomainEvent;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const ACCOUNT_OPENED: &str = "account.opened";
pub const FUNDS_DEPOSITED: &str = "account.funds_deposited";
pub const FUNDS_WITHDRAWN: &str = "account.funds_withdrawn";
pub const ACCOUNT_CLOSED: &str = "account.closed";

/// Payload of `account.opened`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub owner: String,
    pub opened_at: DateTime<Utc>,
}

/// Payload of `account.funds_deposited`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsDeposited {
    /// Amount in minor units.
    pub amount: i64,
}

/// Payload of `account.funds_withdrawn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsWithdrawn {
    /// Amount in minor units.
    pub amount: i64,
}

/// Payload of `account.closed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountClosed {
    pub closed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn event<T: Serialize>(name: &str, payload: &T) -> Result<DomainEvent> {
    Ok(DomainEvent::builder(name).payload_from(payload)?.build()?)
}

pub fn account_opened(owner: impl Into<String>) -> Result<DomainEvent> {
    event(
        ACCOUNT_OPENED,
        &AccountOpened {
            owner: owner.into(),
            opened_at: Utc::now(),
        },
    )
}

pub fn funds_deposited(amount: i64) -> Result<DomainEvent> {
    event(FUNDS_DEPOSITED, &FundsDeposited { amount })
}

pub fn funds_withdrawn(amount: i64) -> Result<DomainEvent> {
    event(FUNDS_WITHDRAWN, &FundsWithdrawn { amount })
}

pub fn account_closed(reason: Option<String>) -> Result<DomainEvent> {
    event(
        ACCOUNT_CLOSED,
        &AccountClosed {
            closed_at: Utc::now(),
            reason,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_flattened_into_the_event() {
        let event = funds_deposited(250).unwrap();

        assert_eq!(event.name(), FUNDS_DEPOSITED);
        assert_eq!(event.payload_value("amount"), Some(&serde_json::json!(250)));
        assert_eq!(event.payload_as::<FundsDeposited>().unwrap().amount, 250);
    }

    #[test]
    fn closed_reason_is_optional() {
        let event = account_closed(None).unwrap();
        assert!(event.payload_value("reason").is_none());

        let decoded: AccountClosed = event.payload_as().unwrap();
        assert_eq!(decoded.reason, None);
    }
}
