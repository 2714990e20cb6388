//! Core data types for the windowed field counter
//!
//! All timestamps are Unix epoch milliseconds.

use super::error::EventError;
use serde::{Deserialize, Serialize};

/// A single observation: `field` was seen for `resource` at `observed_at`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    resource: String,
    field: String,
    observed_at: i64,
}

impl Event {
    /// Build an event, rejecting an empty resource or field
    pub fn new(
        resource: impl Into<String>,
        field: impl Into<String>,
        observed_at: i64,
    ) -> Result<Self, EventError> {
        let resource = resource.into();
        let field = field.into();

        if resource.is_empty() {
            return Err(EventError::EmptyResource);
        }
        if field.is_empty() {
            return Err(EventError::EmptyField);
        }

        Ok(Self {
            resource,
            field,
            observed_at,
        })
    }

    /// Decode a JSON wire payload
    ///
    /// `fallback_ts` is used when the payload carries no `observed_at`
    /// (normally the transport's arrival timestamp).
    pub fn from_json(data: &[u8], fallback_ts: i64) -> Result<Self, EventError> {
        let payload: EventPayload = serde_json::from_slice(data)?;
        Self::new(
            payload.resource,
            payload.field,
            payload.observed_at.unwrap_or(fallback_ts),
        )
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn observed_at(&self) -> i64 {
        self.observed_at
    }

    pub(crate) fn into_entry(self) -> (String, WindowEntry) {
        (
            self.resource,
            WindowEntry {
                field: self.field,
                observed_at: self.observed_at,
            },
        )
    }
}

/// JSON shape of an event on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub resource: String,
    #[serde(alias = "referrer")]
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<i64>,
}

/// One raw observation retained inside a window buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    pub field: String,
    pub observed_at: i64,
}

/// Number of occurrences of a field value within the window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCount {
    pub field: String,
    pub count: u64,
}

impl FieldCount {
    pub fn new(field: impl Into<String>, count: u64) -> Self {
        Self {
            field: field.into(),
            count,
        }
    }
}

/// Ranked field counts for one resource at one flush instant
///
/// `(resource, timestamp)` is the natural storage key. `field_counts` is
/// ordered by count descending, so top N is the first N entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub resource: String,
    pub timestamp: i64,
    pub host: String,
    pub field_counts: Vec<FieldCount>,
}

impl Snapshot {
    /// The `n` most frequent fields
    pub fn top(&self, n: usize) -> &[FieldCount] {
        &self.field_counts[..n.min(self.field_counts.len())]
    }

    /// Sum of all counts in the snapshot
    pub fn total(&self) -> u64 {
        self.field_counts.iter().map(|fc| fc.count).sum()
    }
}

/// A record as delivered by a partition transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Monotonic position within the partition, used for checkpointing
    pub position: u64,
    pub data: Vec<u8>,
    /// Arrival timestamp assigned by the transport
    pub arrived_at: i64,
}

/// Current wall clock in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_rejects_empty_resource() {
        assert!(matches!(
            Event::new("", "google", 0),
            Err(EventError::EmptyResource)
        ));
        assert!(matches!(
            Event::new("/index.html", "", 0),
            Err(EventError::EmptyField)
        ));
    }

    #[test]
    fn test_event_from_json_with_timestamp() {
        let data = br#"{"resource":"/index.html","field":"google","observed_at":1500}"#;
        let event = Event::from_json(data, 9999).unwrap();

        assert_eq!(event.resource(), "/index.html");
        assert_eq!(event.field(), "google");
        assert_eq!(event.observed_at(), 1500);
    }

    #[test]
    fn test_event_from_json_falls_back_to_arrival() {
        // referrer alias, extra keys ignored, no observed_at
        let data = br#"{"resource":"/a","referrer":"http://www.bing.com","agent":"x"}"#;
        let event = Event::from_json(data, 4200).unwrap();

        assert_eq!(event.field(), "http://www.bing.com");
        assert_eq!(event.observed_at(), 4200);
    }

    #[test]
    fn test_event_from_json_malformed() {
        assert!(matches!(
            Event::from_json(b"not json", 0),
            Err(EventError::Malformed(_))
        ));
        assert!(matches!(
            Event::from_json(br#"{"resource":"","field":"x"}"#, 0),
            Err(EventError::EmptyResource)
        ));
    }

    #[test]
    fn test_snapshot_top_and_total() {
        let snapshot = Snapshot {
            resource: "/index.html".to_string(),
            timestamp: 3000,
            host: "h".to_string(),
            field_counts: vec![FieldCount::new("google", 2), FieldCount::new("amazon", 1)],
        };

        assert_eq!(snapshot.top(1), &[FieldCount::new("google", 2)]);
        assert_eq!(snapshot.top(10).len(), 2);
        assert_eq!(snapshot.total(), 3);
    }
}
