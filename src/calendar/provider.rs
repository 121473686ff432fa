//! Calendar provider capability.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::calendar::event::Event;

/// Errors from calendar providers and the aggregator.
#[derive(Debug)]
pub enum CalendarError {
    /// Transport failure (connection, TLS, timeout).
    Http(String),
    /// The backend answered with an unexpected status.
    Api(String),
    /// The backend answered, but the payload could not be understood.
    Parse(String),
    /// Caller passed a window with `start > end`.
    InvalidWindow(String),
}

impl fmt::Display for CalendarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalendarError::Http(e) => write!(f, "HTTP error: {e}"),
            CalendarError::Api(e) => write!(f, "API error: {e}"),
            CalendarError::Parse(e) => write!(f, "Parse error: {e}"),
            CalendarError::InvalidWindow(e) => write!(f, "Invalid window: {e}"),
        }
    }
}

impl std::error::Error for CalendarError {}

/// A source of calendar events.
///
/// Implementations fetch fresh data on every call - there is no caching
/// at this layer. An empty result list is a valid answer meaning "no
/// events in window", never a hidden failure.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Fetch events overlapping the requested window.
    async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError>;
}
