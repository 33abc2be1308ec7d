//! Event-sourced aggregate roots.
//!
//! An aggregate keeps its business state in an ordered attribute bag
//! ([`AggregateState`]) and changes it only by applying [`DomainEvent`]s.
//! Handlers are registered explicitly per aggregate type in an
//! [`ApplyHandlers`] registry, which is the single dispatch point for both
//! live recording and replay.

use std::collections::HashMap;
use std::mem;

use common::{AggregateId, Attributes};
use event_bus::{HandlerRegistry, handler_name};
use event_store::{DomainEvent, Version};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::error::{DomainError, Result};

/// Handler signature for applying an event to an aggregate.
pub type ApplyHandler<A> = fn(&mut A, &DomainEvent) -> Result<()>;

/// Handler registry of an aggregate type.
pub type ApplyHandlers<A> = HandlerRegistry<ApplyHandler<A>>;

/// Before/after pair of a changed attribute. Absent values are `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange {
    pub old: Value,
    pub new: Value,
}

/// Whether replacing `old` with `new` is a no-op for change tracking.
///
/// Identical values are equivalent. A `null` new value is never equivalent to
/// a different old value. Numbers and numeric strings are equivalent when
/// their string forms are equal, so `5` and `"5"` are the same.
pub fn values_equivalent(old: &Value, new: &Value) -> bool {
    if old == new {
        return true;
    }
    if new.is_null() {
        return false;
    }
    match (numeric_text(old), numeric_text(new)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn numeric_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if s.trim().parse::<f64>().is_ok_and(f64::is_finite) => Some(s.clone()),
        _ => None,
    }
}

/// Bookkeeping shared by every aggregate: identity, versions, attributes,
/// dirty tracking and the buffer of unsaved events.
#[derive(Debug, Clone, Default)]
pub struct AggregateState {
    id: Option<AggregateId>,
    version: Version,
    last_version: Version,
    attributes: Attributes,
    dirty: HashMap<String, AttributeChange>,
    recorded_events: Vec<DomainEvent>,
    aggregate_exists: bool,
    is_reconstituted: bool,
}

// Restored when a handler fails mid-record.
struct Checkpoint {
    version: Version,
    attributes: Attributes,
    dirty: HashMap<String, AttributeChange>,
}

impl AggregateState {
    fn with_defaults(id: Option<AggregateId>, defaults: Attributes) -> Self {
        Self {
            id,
            attributes: defaults,
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<AggregateId> {
        self.id
    }

    /// Version of the last applied event.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Version as of the last load from, or commit to, the store.
    pub fn last_version(&self) -> Version {
        self.last_version
    }

    pub fn exists(&self) -> bool {
        self.aggregate_exists
    }

    pub fn is_reconstituted(&self) -> bool {
        self.is_reconstituted
    }

    pub fn recorded_events(&self) -> &[DomainEvent] {
        &self.recorded_events
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    /// Attributes restricted to `keys`, in attribute order. An empty filter
    /// returns everything.
    pub fn attributes_filtered(&self, keys: &[&str]) -> Attributes {
        self.attributes
            .iter()
            .filter(|(key, _)| keys.is_empty() || keys.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn get_attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Deserializes an attribute. Absent attributes yield `None`.
    pub fn get_attribute_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.attributes
            .get(key)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(DomainError::from)
    }

    pub fn has_attribute(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Sets an attribute, recording the change once the aggregate exists.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        self.track_change(&key, &value);
        self.attributes.insert(key, value);
    }

    /// Sets an attribute from any serializable value.
    pub fn set_attribute_from<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_attribute(key, value);
        Ok(())
    }

    pub fn fill(&mut self, attributes: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in attributes {
            self.set_attribute(key, value);
        }
    }

    pub fn has_changed(&self, key: &str) -> bool {
        self.dirty.contains_key(key)
    }

    pub fn dirty(&self) -> &HashMap<String, AttributeChange> {
        &self.dirty
    }

    /// Whether setting `key` to `value` would leave it unchanged.
    pub fn is_attribute_equivalent(&self, key: &str, value: &Value) -> bool {
        values_equivalent(self.attributes.get(key).unwrap_or(&Value::Null), value)
    }

    fn track_change(&mut self, key: &str, new: &Value) {
        if !self.aggregate_exists {
            return;
        }
        let old = self.attributes.get(key).cloned().unwrap_or(Value::Null);
        if !values_equivalent(&old, new) {
            self.dirty.insert(
                key.to_string(),
                AttributeChange {
                    old,
                    new: new.clone(),
                },
            );
        }
    }

    /// Attributes plus `version` and `id` as one JSON object.
    pub fn to_array(&self) -> Value {
        let mut map = self.attributes.clone().into_map();
        map.insert("version".to_string(), Value::from(self.version.as_i64()));
        map.insert(
            "id".to_string(),
            self.id.map_or(Value::Null, |id| Value::String(id.to_string())),
        );
        Value::Object(map)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            version: self.version,
            attributes: self.attributes.clone(),
            dirty: self.dirty.clone(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.version = checkpoint.version;
        self.attributes = checkpoint.attributes;
        self.dirty = checkpoint.dirty;
    }

    /// Marks the buffered events as persisted.
    pub(crate) fn mark_committed(&mut self) {
        self.last_version = self.version;
        self.aggregate_exists = true;
    }
}

impl Serialize for AggregateState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_array().serialize(serializer)
    }
}

/// An entity whose state is derived from its event history.
///
/// Implementors own an [`AggregateState`] and register one handler per event
/// name. State must live in the attribute bag for [`record_that`] to roll it
/// back when a handler fails.
///
/// [`record_that`]: AggregateRoot::record_that
pub trait AggregateRoot: Sized + Send + Sync + 'static {
    /// Type name stamped onto recorded events and checked on load.
    const AGGREGATE_TYPE: &'static str;

    fn instantiate(root: AggregateState) -> Self;

    fn root(&self) -> &AggregateState;

    fn root_mut(&mut self) -> &mut AggregateState;

    fn handlers() -> &'static ApplyHandlers<Self>;

    /// Initial attributes of every instance. Not tracked as changes.
    fn defaults() -> Attributes {
        Attributes::new()
    }

    /// Called once on brand-new instances.
    fn on_creating(&mut self) {}

    /// Creates a brand-new aggregate, generating an id if none is given.
    fn new_instance(id: Option<AggregateId>) -> Self {
        let id = id.unwrap_or_default();
        let mut aggregate = Self::instantiate(AggregateState::with_defaults(Some(id), Self::defaults()));
        aggregate.on_creating();
        aggregate
    }

    /// Rebuilds an aggregate from its history, optionally stopping after
    /// `version`.
    fn reconstitute_from_history<I>(events: I, version: Option<Version>) -> Result<Self>
    where
        I: IntoIterator<Item = DomainEvent>,
    {
        let mut aggregate = Self::instantiate(AggregateState::with_defaults(None, Self::defaults()));
        aggregate.apply_recorded_events(events, version)?;

        let root = aggregate.root_mut();
        root.aggregate_exists = true;
        root.is_reconstituted = true;
        Ok(aggregate)
    }

    /// Applies historical events in order.
    ///
    /// The first event supplies the id if the aggregate has none. Events
    /// beyond `version` are not applied. Versions must be consecutive.
    fn apply_recorded_events<I>(&mut self, events: I, version: Option<Version>) -> Result<()>
    where
        I: IntoIterator<Item = DomainEvent>,
    {
        for event in events {
            if self.root().id.is_none() {
                self.root_mut().id = event.aggregate_id();
            }
            if version.is_some_and(|target| event.aggregate_version() > target) {
                break;
            }

            let expected = self.root().version.next()?;
            if event.aggregate_version() != expected {
                return Err(DomainError::VersionGap {
                    aggregate_type: Self::AGGREGATE_TYPE,
                    expected,
                    actual: event.aggregate_version(),
                });
            }

            self.root_mut().version = expected;
            self.apply(&event)?;
        }

        let root = self.root_mut();
        root.last_version = root.version;
        Ok(())
    }

    /// Stamps, applies and buffers a new event.
    ///
    /// Storable events take the next stream version. Non-storable events are
    /// stamped with the current version and leave it unchanged, so the stored
    /// stream stays consecutive. If the handler fails the aggregate is left
    /// as it was and the event is dropped.
    fn record_that(&mut self, mut event: DomainEvent) -> Result<()> {
        let id = self
            .root()
            .id
            .ok_or(DomainError::MissingAggregateId(Self::AGGREGATE_TYPE))?;
        let version = if event.is_storable() {
            self.root().version.next()?
        } else {
            self.root().version
        };
        event.record_for(id, Self::AGGREGATE_TYPE, version)?;

        let checkpoint = self.root().checkpoint();
        self.root_mut().version = version;
        if let Err(e) = self.apply(&event) {
            self.root_mut().restore(checkpoint);
            return Err(e);
        }

        self.root_mut().recorded_events.push(event);
        Ok(())
    }

    /// Runs the handler registered for the event's name.
    fn apply(&mut self, event: &DomainEvent) -> Result<()> {
        let handler =
            Self::handlers()
                .get(event.name())
                .ok_or_else(|| DomainError::HandlerNotFound {
                    aggregate_type: Self::AGGREGATE_TYPE,
                    handler: handler_name(event.name()),
                    event_name: event.name().to_string(),
                })?;

        tracing::debug!(
            aggregate_type = Self::AGGREGATE_TYPE,
            event_name = event.name(),
            aggregate_version = %event.aggregate_version(),
            "applying event"
        );
        handler(self, event)
    }

    /// Removes and returns the buffered events.
    fn take_recorded_events(&mut self) -> Vec<DomainEvent> {
        mem::take(&mut self.root_mut().recorded_events)
    }

    fn id(&self) -> Option<AggregateId> {
        self.root().id()
    }

    fn version(&self) -> Version {
        self.root().version()
    }

    fn recorded_events(&self) -> &[DomainEvent] {
        self.root().recorded_events()
    }

    fn to_array(&self) -> Value {
        self.root().to_array()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::OnceLock;

    #[derive(Debug)]
    struct Counter {
        root: AggregateState,
    }

    impl Counter {
        fn apply_counter_incremented(&mut self, event: &DomainEvent) -> Result<()> {
            let by = event
                .payload_value("by")
                .and_then(Value::as_i64)
                .unwrap_or(1);
            let count = self.root.get_attribute_as::<i64>("count")?.unwrap_or(0);
            self.root.set_attribute("count", count + by);
            Ok(())
        }

        fn apply_counter_labelled(&mut self, event: &DomainEvent) -> Result<()> {
            self.root
                .set_attribute("label", event.payload_value("label").cloned().unwrap_or_default());
            Ok(())
        }

        // Mutates, then fails.
        fn apply_counter_broken(&mut self, _event: &DomainEvent) -> Result<()> {
            self.root.set_attribute("count", 999);
            Err(DomainError::MissingAggregateId("broken on purpose"))
        }
    }

    impl AggregateRoot for Counter {
        const AGGREGATE_TYPE: &'static str = "Counter";

        fn instantiate(root: AggregateState) -> Self {
            Self { root }
        }

        fn root(&self) -> &AggregateState {
            &self.root
        }

        fn root_mut(&mut self) -> &mut AggregateState {
            &mut self.root
        }

        fn handlers() -> &'static ApplyHandlers<Self> {
            static HANDLERS: OnceLock<ApplyHandlers<Counter>> = OnceLock::new();
            HANDLERS.get_or_init(|| {
                ApplyHandlers::<Self>::new()
                    .on("counter.incremented", Self::apply_counter_incremented)
                    .on("counter.labelled", Self::apply_counter_labelled)
                    .on("counter.broken", Self::apply_counter_broken)
            })
        }

        fn defaults() -> Attributes {
            [("count", 0)].into_iter().collect()
        }
    }

    fn incremented(by: i64) -> DomainEvent {
        DomainEvent::builder("counter.incremented")
            .with("by", by)
            .build()
            .unwrap()
    }

    fn history(n: i64) -> Vec<DomainEvent> {
        let mut counter = Counter::new_instance(None);
        for by in 1..=n {
            counter.record_that(incremented(by)).unwrap();
        }
        counter.take_recorded_events()
    }

    #[test]
    fn new_instance_uses_defaults_and_given_id() {
        let id = AggregateId::new();
        let counter = Counter::new_instance(Some(id));

        assert_eq!(counter.id(), Some(id));
        assert_eq!(counter.version(), Version::initial());
        assert_eq!(counter.root().get_attribute("count"), Some(&json!(0)));
        assert!(!counter.root().exists());
        assert!(counter.root().dirty().is_empty());
    }

    #[test]
    fn record_that_stamps_applies_and_buffers() {
        let mut counter = Counter::new_instance(None);
        for by in [1, 2, 3] {
            counter.record_that(incremented(by)).unwrap();
        }

        assert_eq!(counter.version(), Version::new(3));
        assert_eq!(counter.root().get_attribute("count"), Some(&json!(6)));

        let recorded = counter.recorded_events();
        assert_eq!(recorded.len(), 3);
        for (i, event) in recorded.iter().enumerate() {
            assert_eq!(event.aggregate_version(), Version::new(i as i64 + 1));
            assert_eq!(event.aggregate_id(), counter.id());
            assert_eq!(event.aggregate_type(), Some("Counter"));
        }
    }

    #[test]
    fn record_that_rolls_back_when_the_handler_fails() {
        let mut counter = Counter::new_instance(None);
        counter.record_that(incremented(5)).unwrap();

        let result = counter.record_that(DomainEvent::new("counter.broken").unwrap());

        assert!(result.is_err());
        assert_eq!(counter.version(), Version::new(1));
        assert_eq!(counter.root().get_attribute("count"), Some(&json!(5)));
        assert_eq!(counter.recorded_events().len(), 1);
    }

    #[test]
    fn unknown_event_is_handler_not_found() {
        let mut counter = Counter::new_instance(None);
        let err = counter
            .record_that(DomainEvent::new("counter.reset").unwrap())
            .unwrap_err();

        match err {
            DomainError::HandlerNotFound {
                aggregate_type,
                handler,
                event_name,
            } => {
                assert_eq!(aggregate_type, "Counter");
                assert_eq!(handler, "apply_counter_reset");
                assert_eq!(event_name, "counter.reset");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(counter.recorded_events().is_empty());
        assert_eq!(counter.version(), Version::initial());
    }

    #[test]
    fn reconstitution_matches_live_state() {
        let mut live = Counter::new_instance(None);
        for by in 1..=4 {
            live.record_that(incremented(by)).unwrap();
        }
        let events = live.recorded_events().to_vec();

        let rebuilt = Counter::reconstitute_from_history(events, None).unwrap();

        assert_eq!(rebuilt.root().attributes(), live.root().attributes());
        assert_eq!(rebuilt.version(), live.version());
        assert_eq!(rebuilt.root().last_version(), Version::new(4));
        assert_eq!(rebuilt.id(), live.id());
        assert!(rebuilt.root().exists());
        assert!(rebuilt.root().is_reconstituted());
        assert!(rebuilt.recorded_events().is_empty());
    }

    #[test]
    fn point_in_time_reconstitution_is_inclusive() {
        let rebuilt = Counter::reconstitute_from_history(history(5), Some(Version::new(3))).unwrap();

        assert_eq!(rebuilt.version(), Version::new(3));
        assert_eq!(rebuilt.root().last_version(), Version::new(3));
        assert_eq!(rebuilt.root().get_attribute("count"), Some(&json!(6)));
    }

    #[test]
    fn version_gaps_are_rejected() {
        let mut events = history(3);
        events.remove(1);

        let err = Counter::reconstitute_from_history(events, None).unwrap_err();
        assert!(matches!(
            err,
            DomainError::VersionGap { expected, actual, .. }
                if expected == Version::new(2) && actual == Version::new(3)
        ));
    }

    #[test]
    fn changes_are_tracked_only_once_the_aggregate_exists() {
        let mut fresh = Counter::new_instance(None);
        fresh.root_mut().set_attribute("count", 10);
        assert!(fresh.root().dirty().is_empty());

        let mut loaded = Counter::reconstitute_from_history(history(2), None).unwrap();
        assert!(loaded.root().dirty().is_empty());

        loaded.root_mut().set_attribute("count", 3);
        loaded.root_mut().set_attribute("count", "3");
        assert!(!loaded.root().has_changed("count"));

        // The equivalent write still replaces the stored value.
        loaded.root_mut().set_attribute("count", 4);
        assert_eq!(
            loaded.root().dirty().get("count"),
            Some(&AttributeChange {
                old: json!("3"),
                new: json!(4),
            })
        );

        loaded.root_mut().set_attribute("label", Value::Null);
        assert!(!loaded.root().has_changed("label"));
    }

    #[test]
    fn equivalence_rules() {
        assert!(values_equivalent(&json!(5), &json!(5)));
        assert!(values_equivalent(&json!(5), &json!("5")));
        assert!(values_equivalent(&json!("1.5"), &json!(1.5)));
        assert!(values_equivalent(&Value::Null, &Value::Null));
        assert!(!values_equivalent(&json!(5), &Value::Null));
        assert!(!values_equivalent(&json!("abc"), &json!("abd")));
        assert!(!values_equivalent(&json!(5), &json!("5.0")));
        assert!(!values_equivalent(&json!("x"), &json!(0)));
    }

    #[test]
    fn attribute_helpers() {
        let mut counter = Counter::new_instance(None);
        counter.root_mut().fill([
            ("label".to_string(), json!("clicks")),
            ("owner".to_string(), json!("ada")),
        ]);
        counter
            .root_mut()
            .set_attribute_from("tags", &vec!["a", "b"])
            .unwrap();

        assert!(counter.root().has_attribute("owner"));
        assert!(counter.root().is_attribute_equivalent("count", &json!("0")));
        assert_eq!(
            counter.root().get_attribute_as::<Vec<String>>("tags").unwrap(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(counter.root().get_attribute_as::<i64>("missing").unwrap(), None);

        let filtered = counter.root().attributes_filtered(&["owner", "count"]);
        assert_eq!(filtered.keys().collect::<Vec<_>>(), vec!["count", "owner"]);
        assert_eq!(counter.root().attributes_filtered(&[]).len(), 4);
    }

    #[test]
    fn to_array_includes_version_and_id() {
        let mut counter = Counter::new_instance(None);
        counter.record_that(incremented(2)).unwrap();

        let array = counter.to_array();
        assert_eq!(array["count"], json!(2));
        assert_eq!(array["version"], json!(1));
        assert_eq!(array["id"], json!(counter.id().unwrap().to_string()));
        assert_eq!(serde_json::to_value(counter.root()).unwrap(), array);
    }
}
