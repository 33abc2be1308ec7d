//! Domain layer for the event-sourcing system.
//!
//! This crate provides:
//! - the [`AggregateRoot`] trait and its [`AggregateState`] bookkeeping
//! - the [`EventSourcedRepository`] that loads and saves aggregates
//! - the reference [`Account`] aggregate

pub mod account;
pub mod aggregate;
pub mod error;
pub mod repository;

pub use account::{Account, AccountError, AccountStatus};
pub use aggregate::{
    AggregateRoot, AggregateState, ApplyHandler, ApplyHandlers, AttributeChange, values_equivalent,
};
pub use error::{DomainError, Result};
pub use repository::EventSourcedRepository;
