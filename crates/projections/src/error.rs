//! Projection error types.

use thiserror::Error;

/// Errors that can occur while rebuilding read models.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// An error occurred in the event store.
    #[error("Event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),

    /// An error occurred while delivering an event.
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] event_bus::DispatchError),

    /// Replay was requested with no event store attached.
    #[error("Cannot rebuild read models: no event store configured")]
    NoEventStoreConfigured,
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;
