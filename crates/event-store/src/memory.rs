use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tokio::sync::RwLock;

use crate::{
    AggregateId, EventStoreError, Result, StoredEvent, Version,
    store::{EventStore, EventStream, validate_events_for_append},
};

const DEFAULT_PAGE_SIZE: usize = 256;

/// In-memory event store.
///
/// Keeps the log in commit order and serves `load_all` as a paged stream, so
/// consumers see the same lazy behaviour a database-backed store gives them.
#[derive(Clone)]
pub struct InMemoryEventStore {
    events: Arc<RwLock<Vec<StoredEvent>>>,
    page_size: usize,
}

impl InMemoryEventStore {
    /// Creates a new empty in-memory event store.
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Creates a store whose `load_all` stream reads `page_size` events at a time.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            page_size: page_size.max(1),
        }
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Appends records verbatim, bypassing validation. Intended for seeding
    /// fixtures, including deliberately malformed history.
    pub async fn insert_raw(&self, records: impl IntoIterator<Item = StoredEvent>) {
        self.events.write().await.extend(records);
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

fn head_of(log: &[StoredEvent], aggregate_id: &str) -> Option<Version> {
    log.iter()
        .filter(|e| e.aggregate_id.as_deref() == Some(aggregate_id))
        .map(StoredEvent::aggregate_version)
        .max()
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn commit(&self, events: Vec<StoredEvent>) -> Result<Version> {
        validate_events_for_append(&events)?;

        let first = &events[0];
        let aggregate_id = first.aggregate_id.clone().unwrap_or_default();
        let base_version = first.aggregate_version().previous();

        let mut log = self.events.write().await;

        let current_version = head_of(&log, &aggregate_id).unwrap_or(Version::initial());
        if current_version != base_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: base_version,
                actual: current_version,
            });
        }

        let last_version = events
            .last()
            .map(StoredEvent::aggregate_version)
            .unwrap_or(current_version);
        tracing::debug!(
            %aggregate_id,
            from = %base_version,
            to = %last_version,
            "committing events"
        );
        log.extend(events);

        Ok(last_version)
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>> {
        let id = aggregate_id.to_string();
        let log = self.events.read().await;
        let mut events: Vec<_> = log
            .iter()
            .filter(|e| e.aggregate_id.as_deref() == Some(id.as_str()))
            .cloned()
            .collect();
        events.sort_by_key(StoredEvent::aggregate_version);
        Ok(events)
    }

    async fn load_all(&self) -> Result<EventStream> {
        let log = Arc::clone(&self.events);
        let page_size = self.page_size;

        let pages = stream::unfold(0usize, move |offset| {
            let log = Arc::clone(&log);
            async move {
                let page: Vec<StoredEvent> = {
                    let log = log.read().await;
                    log.iter().skip(offset).take(page_size).cloned().collect()
                };
                if page.is_empty() {
                    None
                } else {
                    let next = offset + page.len();
                    Some((stream::iter(page.into_iter().map(Ok::<_, EventStoreError>)), next))
                }
            }
        });

        Ok(Box::pin(pages.flatten()))
    }

    async fn head_version(&self, aggregate_id: AggregateId) -> Result<Option<Version>> {
        let log = self.events.read().await;
        Ok(head_of(&log, &aggregate_id.to_string()))
    }
}
