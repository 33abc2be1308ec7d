//! Read models and replay for the query side.
//!
//! This crate provides:
//! - [`ReadModel`] trait for resettable query-side views
//! - [`ReplayRunner`] for rebuilding read models from the full event log
//! - [`ReplayConfig`] loaded from the environment
//! - the [`AccountBalances`] projector and [`AccountNotifier`] reactor

pub mod config;
pub mod error;
pub mod read_model;
pub mod replay;
pub mod views;

pub use config::ReplayConfig;
pub use error::{ProjectionError, Result};
pub use read_model::ReadModel;
pub use replay::{ReplayFailure, ReplayReport, ReplayRunner};
pub use views::{AccountBalance, AccountBalances, AccountNotifier, Notification};
