//! Dispatch error types.

use event_store::EventStoreError;
use thiserror::Error;

/// Errors raised while routing or delivering events to listeners.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The event's topic name could not be determined.
    #[error("Event name not defined")]
    EventNameUndefined,

    /// A reactor or projector received an event it has no handler for.
    #[error("Handler `{handler}` not found on {target} for event `{event_name}`")]
    HandlerNotFound {
        target: &'static str,
        handler: String,
        event_name: String,
    },

    /// A named listener could not be turned into an instance.
    #[error("Listener `{0}` could not be resolved")]
    ListenerNotResolvable(String),

    /// A listener rejected the event.
    #[error("Listener failed: {0}")]
    Listener(String),

    /// Reading the event (for example, decoding its payload) failed.
    #[error("Event error: {0}")]
    Event(#[from] EventStoreError),
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;
