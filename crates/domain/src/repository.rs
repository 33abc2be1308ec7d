//! Loading and saving aggregates through an event store.

use std::sync::Arc;

use common::AggregateId;
use event_bus::EventDispatcher;
use event_store::{DomainEvent, EventStore, StoredEvent, Version};

use crate::aggregate::AggregateRoot;
use crate::error::{DomainError, Result};

/// Rebuilds aggregates from their stored history and persists newly
/// recorded events, dispatching them to listeners after commit.
///
/// Save is commit-then-dispatch. The store is the source of truth: once the
/// commit succeeds the aggregate is considered saved even if some listeners
/// fail, and those failures are reported as [`DomainError::PartialDispatch`].
/// Replaying the log repairs any read model that missed events.
pub struct EventSourcedRepository<S> {
    store: Option<S>,
    dispatcher: Arc<EventDispatcher>,
}

impl<S: EventStore> EventSourcedRepository<S> {
    pub fn new(dispatcher: Arc<EventDispatcher>, store: S) -> Self {
        Self {
            store: Some(store),
            dispatcher,
        }
    }

    /// Creates a repository with no event store. Loading fails until one is
    /// attached; saving only dispatches.
    pub fn without_store(dispatcher: Arc<EventDispatcher>) -> Self {
        Self {
            store: None,
            dispatcher,
        }
    }

    pub fn set_event_store(&mut self, store: Option<S>) -> &mut Self {
        self.store = store;
        self
    }

    pub fn set_dispatcher(&mut self, dispatcher: Arc<EventDispatcher>) -> &mut Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn store(&self) -> Option<&S> {
        self.store.as_ref()
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.dispatcher
    }

    /// Creates a brand-new aggregate.
    pub fn init<A: AggregateRoot>(&self, id: Option<AggregateId>) -> A {
        A::new_instance(id)
    }

    /// Alias for [`load`](Self::load).
    pub async fn find<A: AggregateRoot>(&self, id: AggregateId, version: Option<Version>) -> Result<A> {
        self.load(id, version).await
    }

    /// Reconstitutes an aggregate from its stored events, up to `version` if
    /// given.
    #[tracing::instrument(skip(self), fields(aggregate_type = A::AGGREGATE_TYPE))]
    pub async fn load<A: AggregateRoot>(&self, id: AggregateId, version: Option<Version>) -> Result<A> {
        let store = self.store.as_ref().ok_or(DomainError::NoEventStoreConfigured)?;
        let records = store.load(id).await?;

        let Some(first) = records.first() else {
            return Err(DomainError::AggregateNotFound {
                aggregate_type: A::AGGREGATE_TYPE,
                aggregate_id: id.to_string(),
            });
        };
        check_aggregate_type::<A>(id, first)?;

        let events = records
            .into_iter()
            .map(DomainEvent::try_from)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let aggregate = A::reconstitute_from_history(events, version)?;
        tracing::debug!(aggregate_id = %id, version = %aggregate.version(), "aggregate loaded");
        Ok(aggregate)
    }

    /// Commits the aggregate's recorded events, then dispatches them.
    ///
    /// On a successful commit the buffer is cleared and the aggregate's
    /// `last_version` advances, whatever the dispatch outcome. Events marked
    /// not storable are dispatched but not committed.
    #[tracing::instrument(skip(self, aggregate), fields(aggregate_type = A::AGGREGATE_TYPE, aggregate_id = tracing::field::Empty))]
    pub async fn save<A: AggregateRoot>(&self, aggregate: &mut A) -> Result<()> {
        if let Some(id) = aggregate.id() {
            tracing::Span::current().record("aggregate_id", tracing::field::display(id));
        }

        let events = aggregate.recorded_events();
        if events.is_empty() {
            return Ok(());
        }

        let records = events
            .iter()
            .filter(|e| e.is_storable())
            .map(DomainEvent::to_stored)
            .collect::<std::result::Result<Vec<StoredEvent>, _>>()?;

        match &self.store {
            Some(store) if !records.is_empty() => {
                let count = records.len();
                let head = store.commit(records).await?;
                metrics::counter!("repository_events_committed").increment(count as u64);
                tracing::info!(events = count, version = %head, "events committed");
            }
            Some(_) => {}
            None => tracing::warn!("no event store configured, dispatching without commit"),
        }

        let events = aggregate.take_recorded_events();
        aggregate.root_mut().mark_committed();

        self.dispatch_all(&events)
    }

    // Every event is attempted; the first failure is reported.
    fn dispatch_all(&self, events: &[DomainEvent]) -> Result<()> {
        let mut failed = 0;
        let mut first_error = None;

        for event in events {
            if let Err(e) = self.dispatcher.dispatch(event) {
                tracing::warn!(
                    event_name = event.name(),
                    aggregate_version = %event.aggregate_version(),
                    error = %e,
                    "dispatch after commit failed"
                );
                metrics::counter!("repository_dispatch_failures").increment(1);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(first_error) => Err(DomainError::PartialDispatch {
                failed,
                total: events.len(),
                first_error,
            }),
            None => Ok(()),
        }
    }
}

fn check_aggregate_type<A: AggregateRoot>(id: AggregateId, record: &StoredEvent) -> Result<()> {
    match record.aggregate_type.as_deref() {
        Some(actual) if actual != A::AGGREGATE_TYPE => Err(DomainError::AggregateTypeMismatch {
            aggregate_id: id.to_string(),
            expected: A::AGGREGATE_TYPE,
            actual: actual.to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Account;
    use event_bus::{DispatchError, Listener};
    use event_store::{EventStoreError, InMemoryEventStore};
    use std::sync::Mutex;

    fn repository() -> EventSourcedRepository<InMemoryEventStore> {
        EventSourcedRepository::new(Arc::new(EventDispatcher::new()), InMemoryEventStore::new())
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let repo = repository();
        let mut account: Account = repo.init(None);
        account.open("ada").unwrap();
        account.deposit(100).unwrap();
        repo.save(&mut account).await.unwrap();

        assert!(account.recorded_events().is_empty());
        assert_eq!(account.root().last_version(), Version::new(2));
        assert!(account.root().exists());

        let loaded: Account = repo.load(account.id().unwrap(), None).await.unwrap();
        assert_eq!(loaded.balance().unwrap(), 100);
        assert_eq!(loaded.version(), Version::new(2));
    }

    #[tokio::test]
    async fn saving_twice_appends_from_the_new_head() {
        let repo = repository();
        let mut account: Account = repo.init(None);
        account.open("ada").unwrap();
        repo.save(&mut account).await.unwrap();

        account.deposit(30).unwrap();
        repo.save(&mut account).await.unwrap();

        let loaded: Account = repo.find(account.id().unwrap(), None).await.unwrap();
        assert_eq!(loaded.version(), Version::new(2));
        assert_eq!(loaded.balance().unwrap(), 30);
    }

    #[tokio::test]
    async fn load_without_store_fails() {
        let repo: EventSourcedRepository<InMemoryEventStore> =
            EventSourcedRepository::without_store(Arc::new(EventDispatcher::new()));

        let result = repo.load::<Account>(AggregateId::new(), None).await;
        assert!(matches!(result, Err(DomainError::NoEventStoreConfigured)));
    }

    #[tokio::test]
    async fn load_unknown_id_is_not_found() {
        let result = repository().load::<Account>(AggregateId::new(), None).await;
        assert!(matches!(
            result,
            Err(DomainError::AggregateNotFound { aggregate_type: "Account", .. })
        ));
    }

    #[tokio::test]
    async fn stale_aggregate_is_a_concurrency_conflict() {
        let repo = repository();
        let mut account: Account = repo.init(None);
        account.open("ada").unwrap();
        repo.save(&mut account).await.unwrap();
        let id = account.id().unwrap();

        let mut first: Account = repo.load(id, None).await.unwrap();
        let mut second: Account = repo.load(id, None).await.unwrap();
        first.deposit(10).unwrap();
        second.deposit(20).unwrap();

        repo.save(&mut first).await.unwrap();
        let result = repo.save(&mut second).await;

        assert!(matches!(
            result,
            Err(DomainError::EventStore(EventStoreError::ConcurrencyConflict { .. }))
        ));
        assert_eq!(second.recorded_events().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_failure_after_commit_is_partial() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .listen(
                "account.*",
                Listener::closure(move |name, _event| {
                    if name == "account.opened" {
                        return Err(DispatchError::Listener("mailer down".to_string()));
                    }
                    sink.lock().unwrap().push(name.to_string());
                    Ok(())
                }),
            )
            .unwrap();

        let repo = EventSourcedRepository::new(Arc::new(dispatcher), InMemoryEventStore::new());
        let mut account: Account = repo.init(None);
        account.open("ada").unwrap();
        account.deposit(5).unwrap();

        let result = repo.save(&mut account).await;
        assert!(matches!(
            result,
            Err(DomainError::PartialDispatch { failed: 1, total: 2, .. })
        ));

        // Committed regardless; later listeners still ran.
        assert_eq!(*seen.lock().unwrap(), vec!["account.funds_deposited".to_string()]);
        assert_eq!(repo.store().unwrap().event_count().await, 2);
        assert!(account.recorded_events().is_empty());
    }

    #[tokio::test]
    async fn non_storable_events_are_dispatched_but_not_committed() {
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .listen(
                "*.*",
                Listener::closure(move |_, _| {
                    *counter.lock().unwrap() += 1;
                    Ok(())
                }),
            )
            .unwrap();

        let repo = EventSourcedRepository::new(Arc::new(dispatcher), InMemoryEventStore::new());
        let mut account: Account = repo.init(None);
        account.open("ada").unwrap();
        let mut deposit = crate::account::events::funds_deposited(10).unwrap();
        deposit.mark_not_storable();
        account.record_that(deposit).unwrap();

        repo.save(&mut account).await.unwrap();

        assert_eq!(*count.lock().unwrap(), 2);
        assert_eq!(repo.store().unwrap().event_count().await, 1);
    }

    #[tokio::test]
    async fn storable_events_after_a_non_storable_one_still_commit() {
        let repo = repository();
        let mut account: Account = repo.init(None);
        account.open("ada").unwrap();
        let mut audit = crate::account::events::funds_deposited(10).unwrap();
        audit.mark_not_storable();
        account.record_that(audit).unwrap();
        account.deposit(5).unwrap();

        assert_eq!(account.version(), Version::new(2));
        repo.save(&mut account).await.unwrap();
        assert_eq!(repo.store().unwrap().event_count().await, 2);

        account.deposit(1).unwrap();
        repo.save(&mut account).await.unwrap();

        let loaded: Account = repo.load(account.id().unwrap(), None).await.unwrap();
        assert_eq!(loaded.version(), Version::new(3));
        assert_eq!(loaded.balance().unwrap(), 6);
    }
}
