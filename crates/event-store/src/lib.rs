//! Domain event envelope, its flat storage form, and the event store contract.

pub mod error;
pub mod event;
pub mod memory;
pub mod record;
pub mod store;

pub use common::{AggregateId, Attributes};
pub use error::{EventStoreError, Result};
pub use event::{DomainEvent, DomainEventBuilder, EventId, Version};
pub use memory::InMemoryEventStore;
pub use record::{StoredEvent, TIMESTAMP_FORMAT, format_timestamp, parse_timestamp};
pub use store::{EventStore, EventStream};
