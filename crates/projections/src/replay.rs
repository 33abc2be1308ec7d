//! Rebuilding read models from the full event log.

use std::sync::Arc;

use event_bus::{DispatchError, EventDispatcher};
use event_store::{DomainEvent, EventStore};
use futures_util::StreamExt;

use crate::config::ReplayConfig;
use crate::read_model::ReadModel;
use crate::{ProjectionError, Result};

/// A stored event that could not be replayed.
#[derive(Debug)]
pub struct ReplayFailure {
    /// 1-based position in the global log.
    pub position: u64,
    pub event_id: String,
    pub event_name: String,
    pub error: DispatchError,
}

/// Outcome of a full replay.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Events decoded and delivered to every replay-safe listener.
    pub replayed: u64,
    pub failures: Vec<ReplayFailure>,
}

impl ReplayReport {
    pub fn processed(&self) -> u64 {
        self.replayed + self.failures.len() as u64
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Streams the whole event log through the dispatcher's replay path.
///
/// Only projectors receive replayed events. A record that fails to decode or
/// whose delivery fails is logged and counted, and replay moves on to the
/// next record. Errors reading the store itself abort the run.
pub struct ReplayRunner<S> {
    store: Option<S>,
    dispatcher: Arc<EventDispatcher>,
    read_models: Vec<Arc<dyn ReadModel>>,
    config: ReplayConfig,
}

impl<S: EventStore> ReplayRunner<S> {
    pub fn new(dispatcher: Arc<EventDispatcher>, store: S) -> Self {
        Self {
            store: Some(store),
            dispatcher,
            read_models: Vec::new(),
            config: ReplayConfig::default(),
        }
    }

    pub fn without_store(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            store: None,
            dispatcher,
            read_models: Vec::new(),
            config: ReplayConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ReplayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn set_event_store(&mut self, store: Option<S>) -> &mut Self {
        self.store = store;
        self
    }

    /// Registers a read model to reset before replay.
    pub fn register_read_model(&mut self, read_model: Arc<dyn ReadModel>) -> &mut Self {
        self.read_models.push(read_model);
        self
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    /// Resets read models (if configured) and replays every stored event in
    /// commit order.
    #[tracing::instrument(skip(self), fields(read_models = self.read_models.len()))]
    pub async fn replay_all(&self) -> Result<ReplayReport> {
        let store = self
            .store
            .as_ref()
            .ok_or(ProjectionError::NoEventStoreConfigured)?;

        if self.config.reset_read_models {
            for read_model in &self.read_models {
                read_model.reset();
                tracing::info!(read_model = read_model.name(), "read model reset");
            }
        }

        let mut stream = store.load_all().await?;
        let mut report = ReplayReport::default();
        let mut position = 0u64;

        while let Some(record) = stream.next().await {
            let record = record?;
            position += 1;

            let event_id = record.id.clone();
            let event_name = record.name.clone();
            if self.config.log_events {
                tracing::info!(
                    position,
                    %event_id,
                    %event_name,
                    aggregate_id = record.aggregate_id.as_deref().unwrap_or(""),
                    aggregate_type = record.aggregate_type.as_deref().unwrap_or(""),
                    created_at = %record.created_at,
                    "replaying event"
                );
            }

            let outcome = DomainEvent::try_from(record)
                .map_err(DispatchError::from)
                .and_then(|event| self.dispatcher.replay(&event));

            match outcome {
                Ok(_) => {
                    report.replayed += 1;
                    metrics::counter!("replay_events_processed").increment(1);
                }
                Err(error) => {
                    tracing::warn!(position, %event_id, %event_name, %error, "event replay failed");
                    metrics::counter!("replay_events_failed").increment(1);
                    report.failures.push(ReplayFailure {
                        position,
                        event_id,
                        event_name,
                        error,
                    });
                }
            }
        }

        tracing::info!(
            replayed = report.replayed,
            failed = report.failures.len(),
            "replay complete"
        );
        Ok(report)
    }
}
