//! Google Calendar provider backed by a published ICS feed.
//!
//! Fetches the raw ICS document on every call (no caching) and parses
//! `BEGIN:VEVENT`/`END:VEVENT` blocks line by line. Only events whose
//! *start* falls inside the requested window are kept; an event that
//! started before the window and overlaps into it is dropped. That
//! boundary policy is intentional and matched by the tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use tracing::{debug, info};

use crate::calendar::event::Event;
use crate::calendar::provider::{CalendarError, CalendarProvider};

/// ICS-feed calendar provider.
pub struct IcsProvider {
    ics_url: String,
    http: reqwest::Client,
}

impl IcsProvider {
    pub fn new(ics_url: String) -> Self {
        info!("Google Calendar provider initialized");
        Self {
            ics_url,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CalendarProvider for IcsProvider {
    async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        info!("Fetching Google Calendar events from {} to {}", start, end);

        let response = self
            .http
            .get(&self.ics_url)
            .send()
            .await
            .map_err(|e| CalendarError::Http(format!("failed to fetch ICS: {e}")))?;

        if !response.status().is_success() {
            return Err(CalendarError::Api(format!(
                "failed to fetch ICS: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CalendarError::Http(format!("failed to read ICS body: {e}")))?;

        let events = parse_ics(&body, start, end);
        info!("Found {} Google Calendar events", events.len());
        Ok(events)
    }
}

/// Parse an ICS document, keeping only events whose start lies in
/// `[start, end]` inclusive.
fn parse_ics(data: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<Event> {
    let mut events = Vec::new();

    for props in scan_vevents(data) {
        let Some(event) = event_from_props(&props) else {
            debug!("Skipping unparsable VEVENT");
            continue;
        };
        if event.start >= start && event.start <= end {
            events.push(event);
        }
    }

    events
}

/// Collect the raw properties of every VEVENT block in an iCalendar
/// document. Repeated keys (ATTENDEE) keep their multiplicity. Folded
/// continuation lines are not unfolded.
pub(crate) fn scan_vevents(data: &str) -> Vec<Vec<(String, String)>> {
    let mut blocks = Vec::new();
    let mut current: Option<Vec<(String, String)>> = None;

    for raw in data.lines() {
        if raw.starts_with(' ') || raw.starts_with('\t') {
            continue;
        }
        let line = raw.trim();

        if line == "BEGIN:VEVENT" {
            current = Some(Vec::new());
        } else if line == "END:VEVENT" {
            if let Some(props) = current.take() {
                blocks.push(props);
            }
        } else if let Some(ref mut props) = current {
            if let Some((key, value)) = line.split_once(':') {
                props.push((key.to_string(), value.to_string()));
            }
        }
    }

    blocks
}

fn event_from_props(props: &[(String, String)]) -> Option<Event> {
    let start = parse_ics_datetime(prop(props, "DTSTART")?)?;
    let end = prop(props, "DTEND")
        .and_then(parse_ics_datetime)
        .unwrap_or(start + Duration::hours(1));

    let attendees: Vec<String> = props
        .iter()
        .filter(|(key, _)| property_name(key) == "ATTENDEE")
        .map(|(_, value)| strip_mailto(value).to_string())
        .collect();

    Some(Event {
        id: prop(props, "UID").unwrap_or_default().to_string(),
        title: prop(props, "SUMMARY").unwrap_or("Untitled Event").to_string(),
        start,
        end,
        attendees,
        source: "google".to_string(),
        description: prop(props, "DESCRIPTION").map(str::to_string),
        location: prop(props, "LOCATION").map(str::to_string),
        raw_data: raw_props_json(props),
    })
}

/// Look up a property by its name, ignoring parameters
/// (`DTSTART;TZID=...` matches `DTSTART`). First occurrence wins.
fn prop<'a>(props: &'a [(String, String)], name: &str) -> Option<&'a str> {
    props
        .iter()
        .find(|(key, _)| property_name(key) == name)
        .map(|(_, value)| value.as_str())
}

/// The property name before any `;param=value` parameters.
pub(crate) fn property_name(key: &str) -> &str {
    key.split(';').next().unwrap_or(key)
}

pub(crate) fn strip_mailto(value: &str) -> &str {
    value.strip_prefix("mailto:").unwrap_or(value)
}

/// Parse an ICS datetime: `20240101T120000[Z]` or date-only `20240101`.
/// A stray `VALUE=DATE:` prefix is tolerated; values are treated as UTC.
pub(crate) fn parse_ics_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let mut value = raw.trim();
    if let Some((_, rest)) = value.split_once("VALUE=DATE:") {
        value = rest;
    }
    let value = value.trim_end_matches('Z');

    if value.contains('T') {
        let head = value.get(..15)?;
        NaiveDateTime::parse_from_str(head, "%Y%m%dT%H%M%S")
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    } else {
        let head = value.get(..8)?;
        NaiveDate::parse_from_str(head, "%Y%m%d")
            .ok()
            .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
    }
}

fn raw_props_json(props: &[(String, String)]) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in props {
        match map.get_mut(key) {
            Some(serde_json::Value::Array(list)) => {
                list.push(serde_json::Value::String(value.clone()));
            }
            Some(existing) => {
                let first = existing.take();
                *existing =
                    serde_json::Value::Array(vec![first, serde_json::Value::String(value.clone())]);
            }
            None => {
                map.insert(key.clone(), serde_json::Value::String(value.clone()));
            }
        }
    }
    serde_json::Value::Object(map)
}
