//! Shared types for the event-sourcing core.

pub mod attributes;
pub mod types;

pub use attributes::Attributes;
pub use types::AggregateId;
