use thiserror::Error;

use crate::{EventId, Version};

/// Errors raised while building events, decoding stored records, or
/// committing to an event store.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// The event could not be constructed (for example, it has no name).
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The event already carries aggregate linkage from an earlier recording.
    #[error("Event {event_id} was already recorded at aggregate version {aggregate_version}")]
    AlreadyRecorded {
        event_id: EventId,
        aggregate_version: Version,
    },

    /// The batch's base version does not match the store's head for the aggregate.
    #[error(
        "Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_id: String,
        expected: Version,
        actual: Version,
    },

    /// An aggregate stream ran out of versions.
    #[error("Version overflow after aggregate version {0}")]
    VersionOverflow(Version),

    /// The batch handed to `commit` is malformed.
    #[error("Invalid append: {0}")]
    InvalidAppend(String),

    /// A stored record has a field that cannot be decoded.
    #[error("Invalid stored record field `{field}`: {reason}")]
    InvalidRecord { field: &'static str, reason: String },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for event store operations.
pub type Result<T> = std::result::Result<T, EventStoreError>;
