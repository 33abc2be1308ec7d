//! Flat, storable form of a [`DomainEvent`].
//!
//! Every field is a primitive: ids are hyphenated strings, payload and
//! metadata are JSON text, and `created_at` uses [`TIMESTAMP_FORMAT`] so that
//! lexical order equals chronological order.

use chrono::{DateTime, NaiveDateTime, Utc};
use common::Attributes;
use serde::{Deserialize, Serialize};

use crate::{AggregateId, DomainEvent, EventId, EventStoreError, Result, Version};

/// Canonical timestamp layout for stored events (microsecond precision).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Formats a timestamp in the canonical storage layout.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a stored timestamp.
///
/// Accepts the canonical layout, a bare unix-seconds integer, or RFC 3339.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT) {
        return Ok(naive.and_utc());
    }
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| invalid("created_at", format!("timestamp out of range: {value}")));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| invalid("created_at", format!("{e}: {value}")))
}

fn invalid(field: &'static str, reason: impl Into<String>) -> EventStoreError {
    EventStoreError::InvalidRecord {
        field,
        reason: reason.into(),
    }
}

/// An event as it crosses the storage boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub name: String,
    pub version: u32,
    pub aggregate_id: Option<String>,
    pub aggregate_type: Option<String>,
    pub aggregate_version: i64,
    /// JSON object text.
    pub payload: String,
    /// JSON object text.
    pub metadata: String,
    pub created_at: String,
}

impl StoredEvent {
    pub fn aggregate_version(&self) -> Version {
        Version::new(self.aggregate_version)
    }
}

impl DomainEvent {
    /// Serializes the event into its flat storable form.
    pub fn to_stored(&self) -> Result<StoredEvent> {
        Ok(StoredEvent {
            id: self.id().to_string(),
            name: self.name().to_string(),
            version: self.version(),
            aggregate_id: self.aggregate_id().map(|id| id.to_string()),
            aggregate_type: self.aggregate_type().map(str::to_string),
            aggregate_version: self.aggregate_version().as_i64(),
            payload: serde_json::to_string(self.payload())?,
            metadata: serde_json::to_string(self.metadata())?,
            created_at: format_timestamp(&self.created_at()),
        })
    }
}

fn decode_map(field: &'static str, text: &str) -> Result<Attributes> {
    if text.trim().is_empty() {
        return Ok(Attributes::new());
    }
    let value: serde_json::Value = serde_json::from_str(text)?;
    Attributes::from_value(value).ok_or_else(|| invalid(field, "expected a JSON object"))
}

impl TryFrom<StoredEvent> for DomainEvent {
    type Error = EventStoreError;

    fn try_from(record: StoredEvent) -> Result<Self> {
        let aggregate_id = record
            .aggregate_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(|id| {
                id.parse::<AggregateId>()
                    .map_err(|e| invalid("aggregate_id", e.to_string()))
            })
            .transpose()?;
        let aggregate_version = record.aggregate_version();

        let mut builder = DomainEvent::builder(record.name)
            .version(record.version)
            .aggregate(
                aggregate_id,
                record.aggregate_type.filter(|t| !t.is_empty()),
                aggregate_version,
            )
            .payload(decode_map("payload", &record.payload)?)
            .metadata(decode_map("metadata", &record.metadata)?);

        if !record.id.is_empty() {
            let id = record
                .id
                .parse::<EventId>()
                .map_err(|e| invalid("id", e.to_string()))?;
            builder = builder.id(id);
        }
        if !record.created_at.is_empty() {
            builder = builder.created_at(parse_timestamp(&record.created_at)?);
        }

        builder.build()
    }
}
