//! Calendar event model.

use std::fmt;

use chrono::{DateTime, Utc};

/// A single calendar occurrence, tagged with the provider it came from.
///
/// `id` is unique per source, not globally - two providers may report the
/// same meeting under different ids, which is what the aggregator's
/// deduplication handles.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Attendee emails/names. Order is irrelevant for comparison but
    /// preserved for display.
    pub attendees: Vec<String>,
    /// Provider name ("yandex", "google").
    pub source: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Opaque provider payload, kept for debugging.
    pub raw_data: serde_json::Value,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.start.format("%H:%M"), self.title)
    }
}
