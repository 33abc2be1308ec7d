use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::{AggregateId, EventStoreError, Result, StoredEvent, Version};

/// A lazily produced sequence of stored events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StoredEvent>> + Send>>;

/// Append-only persistence for domain events.
///
/// Implementations enforce optimistic concurrency on `commit`: the batch's
/// base version (the first event's `aggregate_version - 1`) must equal the
/// aggregate's current head, otherwise the commit fails with
/// [`EventStoreError::ConcurrencyConflict`].
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends a batch of events for one aggregate, atomically.
    ///
    /// Returns the aggregate's new head version.
    async fn commit(&self, events: Vec<StoredEvent>) -> Result<Version>;

    /// Loads an aggregate's events in ascending `aggregate_version` order.
    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>>;

    /// Streams every stored event in global commit order.
    async fn load_all(&self) -> Result<EventStream>;

    /// Returns the aggregate's head version, or `None` if it has no events.
    async fn head_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>>;
}

/// Checks that a batch is non-empty, targets a single aggregate, and carries
/// consecutive, positive versions.
pub fn validate_events_for_append(events: &[StoredEvent]) -> Result<()> {
    let Some(first) = events.first() else {
        return Err(EventStoreError::InvalidAppend(
            "cannot append empty event list".to_string(),
        ));
    };

    if first.aggregate_id.as_deref().is_none_or(str::is_empty) {
        return Err(EventStoreError::InvalidAppend(format!(
            "event {} has no aggregate id",
            first.id
        )));
    }
    if first.aggregate_version() < Version::first() {
        return Err(EventStoreError::InvalidAppend(format!(
            "event {} has no aggregate version",
            first.id
        )));
    }

    for event in events.iter().skip(1) {
        if event.aggregate_id != first.aggregate_id {
            return Err(EventStoreError::InvalidAppend(
                "all events must be for the same aggregate".to_string(),
            ));
        }
        if event.aggregate_type != first.aggregate_type {
            return Err(EventStoreError::InvalidAppend(
                "all events must have the same aggregate type".to_string(),
            ));
        }
    }

    let mut expected_version = first.aggregate_version();
    for event in events.iter().skip(1) {
        expected_version = expected_version.next()?;
        if event.aggregate_version() != expected_version {
            return Err(EventStoreError::InvalidAppend(format!(
                "event versions must be sequential: expected {}, got {}",
                expected_version, event.aggregate_version
            )));
        }
    }

    Ok(())
}
