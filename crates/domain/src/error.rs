//! Domain error types.

use event_bus::DispatchError;
use event_store::{EventStoreError, Version};
use thiserror::Error;

use crate::account::AccountError;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Delivering an event to a listener failed.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// The aggregate has no handler registered for the event.
    #[error("Handler `{handler}` not found on {aggregate_type} for event `{event_name}`")]
    HandlerNotFound {
        aggregate_type: &'static str,
        handler: String,
        event_name: String,
    },

    /// The repository has no event store attached.
    #[error("No event store configured")]
    NoEventStoreConfigured,

    /// Aggregate not found.
    #[error("Aggregate not found: {aggregate_type} with id {aggregate_id}")]
    AggregateNotFound {
        aggregate_type: &'static str,
        aggregate_id: String,
    },

    /// The stored stream belongs to a different aggregate type.
    #[error("Aggregate {aggregate_id} is a {actual}, not a {expected}")]
    AggregateTypeMismatch {
        aggregate_id: String,
        expected: &'static str,
        actual: String,
    },

    /// Events were not applied in consecutive version order.
    #[error("Version gap in {aggregate_type} history: expected {expected}, found {actual}")]
    VersionGap {
        aggregate_type: &'static str,
        expected: Version,
        actual: Version,
    },

    /// The aggregate has no identifier to stamp onto recorded events.
    #[error("{0} has no aggregate id")]
    MissingAggregateId(&'static str),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An error occurred in the account aggregate.
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// Events were committed but at least one could not be dispatched.
    ///
    /// The store is authoritative; replaying the log repairs read models.
    #[error("{failed} of {total} committed events could not be dispatched: {first_error}")]
    PartialDispatch {
        failed: usize,
        total: usize,
        first_error: DispatchError,
    },
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
