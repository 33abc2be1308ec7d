use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use common::Attributes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use crate::record::format_timestamp;
use crate::{AggregateId, EventStoreError, Result};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Position of an event within its aggregate's stream.
///
/// Versions start at 1 for the first event and increment by 1 for each
/// subsequent event. Version 0 means "nothing applied yet".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a new version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the initial version (0) for a new aggregate.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the first version (1) for the first event.
    pub fn first() -> Self {
        Self(1)
    }

    /// Returns the next version.
    pub fn next(&self) -> Result<Self> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or(EventStoreError::VersionOverflow(*self))
    }

    /// Returns the version preceding this one, saturating at 0.
    pub fn previous(&self) -> Self {
        Self((self.0 - 1).max(0))
    }

    /// Returns the raw version value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Version {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

/// An immutable fact about a change to an aggregate.
///
/// The name is a dot-delimited topic such as `account.opened`; it is fixed
/// at construction. Aggregate linkage (`aggregate_id`, `aggregate_type`,
/// `aggregate_version`) is stamped once, when the owning aggregate records
/// the event.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainEvent {
    id: EventId,
    name: String,
    version: u32,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    aggregate_version: Version,
    payload: Attributes,
    metadata: Attributes,
    created_at: DateTime<Utc>,
    storable: bool,
}

impl DomainEvent {
    /// Creates an event with an empty payload.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        Self::builder(name).build()
    }

    /// Starts building an event with the given name.
    pub fn builder(name: impl Into<String>) -> DomainEventBuilder {
        DomainEventBuilder::new(name)
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schema version of the payload shape.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn aggregate_id(&self) -> Option<AggregateId> {
        self.aggregate_id
    }

    pub fn aggregate_type(&self) -> Option<&str> {
        self.aggregate_type.as_deref()
    }

    /// Position in the aggregate's stream, or 0 if not yet recorded.
    pub fn aggregate_version(&self) -> Version {
        self.aggregate_version
    }

    pub fn payload(&self) -> &Attributes {
        &self.payload
    }

    pub fn metadata(&self) -> &Attributes {
        &self.metadata
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the event is persisted when its aggregate is saved.
    pub fn is_storable(&self) -> bool {
        self.storable
    }

    /// Whether aggregate linkage has been stamped.
    pub fn is_recorded(&self) -> bool {
        self.aggregate_id.is_some() || self.aggregate_version > Version::initial()
    }

    /// Returns a single payload value.
    pub fn payload_value(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Deserializes the whole payload into a typed structure.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.to_value())?)
    }

    /// Merges entries into the payload.
    pub fn set_payload(&mut self, payload: Attributes) -> &mut Self {
        self.payload.merge(payload);
        self
    }

    /// Merges entries into the metadata.
    pub fn set_metadata(&mut self, metadata: Attributes) -> &mut Self {
        self.metadata.merge(metadata);
        self
    }

    /// Excludes the event from store commits. It is still applied and dispatched.
    pub fn mark_not_storable(&mut self) -> &mut Self {
        self.storable = false;
        self
    }

    /// Stamps aggregate linkage onto the event.
    ///
    /// Fails with [`EventStoreError::AlreadyRecorded`] if the event already
    /// belongs to a stream position, and with
    /// [`EventStoreError::InvalidEvent`] if `aggregate_version` is not positive.
    pub fn record_for(
        &mut self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        aggregate_version: Version,
    ) -> Result<()> {
        if self.is_recorded() {
            return Err(EventStoreError::AlreadyRecorded {
                event_id: self.id,
                aggregate_version: self.aggregate_version,
            });
        }
        // Non-storable events follow the last stored version, which is 0 on a
        // fresh aggregate.
        if self.storable && aggregate_version <= Version::initial() {
            return Err(EventStoreError::InvalidEvent(format!(
                "aggregate version must be positive, got {aggregate_version}"
            )));
        }
        self.aggregate_id = Some(aggregate_id);
        self.aggregate_type = Some(aggregate_type.into());
        self.aggregate_version = aggregate_version;
        Ok(())
    }

    /// The event as a JSON object, with payload and metadata nested.
    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "id": self.id.to_string(),
            "name": self.name,
            "version": self.version,
            "aggregate_id": self.aggregate_id.map(|id| id.to_string()),
            "aggregate_type": self.aggregate_type,
            "aggregate_version": self.aggregate_version.as_i64(),
            "payload": self.payload.to_value(),
            "metadata": self.metadata.to_value(),
            "created_at": format_timestamp(&self.created_at),
        })
    }
}

impl std::fmt::Display for DomainEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// Builder for [`DomainEvent`].
#[derive(Debug)]
pub struct DomainEventBuilder {
    id: Option<EventId>,
    name: String,
    version: u32,
    aggregate_id: Option<AggregateId>,
    aggregate_type: Option<String>,
    aggregate_version: Version,
    payload: Attributes,
    metadata: Attributes,
    created_at: Option<DateTime<Utc>>,
    storable: bool,
}

impl DomainEventBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            version: 1,
            aggregate_id: None,
            aggregate_type: None,
            aggregate_version: Version::initial(),
            payload: Attributes::new(),
            metadata: Attributes::new(),
            created_at: None,
            storable: true,
        }
    }

    /// Sets the event ID. If not set, a new ID will be generated.
    pub fn id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the payload schema version. Zero is normalized to 1.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version.max(1);
        self
    }

    /// Pre-sets aggregate linkage, as when decoding a stored record.
    pub fn aggregate(
        mut self,
        aggregate_id: Option<AggregateId>,
        aggregate_type: Option<String>,
        aggregate_version: Version,
    ) -> Self {
        self.aggregate_id = aggregate_id;
        self.aggregate_type = aggregate_type;
        self.aggregate_version = aggregate_version;
        self
    }

    /// Merges entries into the payload.
    pub fn payload(mut self, payload: Attributes) -> Self {
        self.payload.merge(payload);
        self
    }

    /// Sets one payload entry.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key, value);
        self
    }

    /// Sets the payload from any serializable object.
    pub fn payload_from<T: Serialize>(mut self, payload: &T) -> Result<Self> {
        let value = serde_json::to_value(payload)?;
        let attrs = Attributes::from_value(value).ok_or_else(|| {
            EventStoreError::InvalidEvent("payload must serialize to an object".to_string())
        })?;
        self.payload.merge(attrs);
        Ok(self)
    }

    /// Merges entries into the metadata.
    pub fn metadata(mut self, metadata: Attributes) -> Self {
        self.metadata.merge(metadata);
        self
    }

    /// Sets one metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key, value);
        self
    }

    /// Sets the creation time. If not set, the current time will be used.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Builds an event that is applied and dispatched but never committed.
    pub fn not_storable(mut self) -> Self {
        self.storable = false;
        self
    }

    /// Builds the event, failing if it has no name.
    pub fn build(self) -> Result<DomainEvent> {
        if self.name.trim().is_empty() {
            return Err(EventStoreError::InvalidEvent(
                "event name not defined".to_string(),
            ));
        }

        // Storage keeps microseconds; truncate so decoded events compare equal.
        let created_at = self.created_at.unwrap_or_else(Utc::now).trunc_subsecs(6);

        Ok(DomainEvent {
            id: self.id.unwrap_or_default(),
            name: self.name,
            version: self.version,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            aggregate_version: self.aggregate_version,
            payload: self.payload,
            metadata: self.metadata,
            created_at,
            storable: self.storable,
        })
    }
}
