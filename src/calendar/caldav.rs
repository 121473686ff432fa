//! Yandex Calendar provider speaking CalDAV.
//!
//! Connects lazily: the first `get_events` call discovers the user's
//! first calendar collection with a PROPFIND and caches its URL. Events
//! are then fetched with a REPORT calendar-query carrying a time-range
//! filter, so window filtering happens server-side.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::calendar::event::Event;
use crate::calendar::ics::{parse_ics_datetime, property_name, scan_vevents, strip_mailto};
use crate::calendar::provider::{CalendarError, CalendarProvider};

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop><d:resourcetype/></d:prop>
</d:propfind>"#;

/// CalDAV calendar provider.
pub struct CaldavProvider {
    login: String,
    password: String,
    base_url: String,
    http: reqwest::Client,
    /// Discovered calendar collection URL, filled on first use.
    collection: Mutex<Option<String>>,
}

impl CaldavProvider {
    pub fn new(login: String, password: String, caldav_url: String) -> Self {
        Self {
            login,
            password,
            base_url: caldav_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            collection: Mutex::new(None),
        }
    }

    /// Return the cached calendar collection URL, discovering it first
    /// if this is the initial call.
    async fn collection_url(&self) -> Result<String, CalendarError> {
        let mut cached = self.collection.lock().await;
        if let Some(ref url) = *cached {
            return Ok(url.clone());
        }

        info!("Connecting to CalDAV server: {}", self.base_url);
        let home_path = format!("/calendars/{}/", self.login);
        let home_url = format!("{}{}", self.base_url, home_path);

        let method = Method::from_bytes(b"PROPFIND")
            .map_err(|e| CalendarError::Http(format!("invalid method: {e}")))?;
        let response = self
            .http
            .request(method, &home_url)
            .basic_auth(&self.login, Some(&self.password))
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await
            .map_err(|e| CalendarError::Http(format!("PROPFIND failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CalendarError::Api(format!(
                "PROPFIND returned {status} for {home_url}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CalendarError::Http(format!("failed to read PROPFIND body: {e}")))?;

        // The multistatus lists the home itself plus one href per
        // calendar collection. Take the first child collection; servers
        // may echo the home path percent-encoded.
        let encoded_home = format!("/calendars/{}/", urlencoding::encode(&self.login));
        let href = extract_tag_values(&body, "href")
            .into_iter()
            .find(|h| {
                let h = h.trim_end_matches('/');
                h != home_path.trim_end_matches('/') && h != encoded_home.trim_end_matches('/')
            })
            .ok_or_else(|| CalendarError::Parse("no calendar collections found".to_string()))?;

        let url = if href.starts_with("http") {
            href
        } else {
            format!("{}{}", self.base_url, href)
        };

        info!("Connected to CalDAV calendar: {}", url);
        *cached = Some(url.clone());
        Ok(url)
    }

    fn report_body(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><d:getetag/><c:calendar-data/></d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT">
        <c:time-range start="{}" end="{}"/>
      </c:comp-filter>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#,
            start.format("%Y%m%dT%H%M%SZ"),
            end.format("%Y%m%dT%H%M%SZ")
        )
    }

    /// Translate one iCalendar document into an [`Event`]. Returns the
    /// first VEVENT; `None` when the document has none or it cannot be
    /// parsed.
    fn parse_calendar_object(&self, ical: &str) -> Option<Event> {
        let props = scan_vevents(ical).into_iter().next()?;

        let mut id = String::new();
        let mut title = "No Title".to_string();
        let mut start = None;
        let mut end = None;
        let mut description = None;
        let mut location = None;
        let mut attendees = Vec::new();

        for (key, value) in &props {
            match property_name(key) {
                "UID" => id = value.clone(),
                "SUMMARY" => title = value.clone(),
                "DTSTART" => start = parse_ics_datetime(value),
                "DTEND" => end = parse_ics_datetime(value),
                "DESCRIPTION" => description = Some(value.clone()),
                "LOCATION" => location = Some(value.clone()),
                "ATTENDEE" => attendees.push(strip_mailto(value).to_string()),
                _ => {}
            }
        }

        let start = start?;
        Some(Event {
            id,
            title,
            start,
            end: end.unwrap_or(start + Duration::hours(1)),
            attendees,
            source: "yandex".to_string(),
            description,
            location,
            raw_data: serde_json::json!({ "icalendar": ical }),
        })
    }
}

#[async_trait]
impl CalendarProvider for CaldavProvider {
    async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        let collection = self.collection_url().await?;
        info!("Fetching CalDAV events from {} to {}", start, end);

        let method = Method::from_bytes(b"REPORT")
            .map_err(|e| CalendarError::Http(format!("invalid method: {e}")))?;
        let response = self
            .http
            .request(method, &collection)
            .basic_auth(&self.login, Some(&self.password))
            .header("Depth", "1")
            .header(CONTENT_TYPE, "application/xml; charset=utf-8")
            .body(Self::report_body(start, end))
            .send()
            .await
            .map_err(|e| CalendarError::Http(format!("REPORT failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CalendarError::Api(format!(
                "REPORT returned {status} for {collection}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CalendarError::Http(format!("failed to read REPORT body: {e}")))?;

        let mut events = Vec::new();
        for ical in extract_tag_values(&body, "calendar-data") {
            match self.parse_calendar_object(&ical) {
                Some(event) => events.push(event),
                None => warn!("Failed to parse CalDAV calendar object, skipping"),
            }
        }

        info!("Found {} CalDAV events", events.len());
        Ok(events)
    }
}

/// Pull the text content of every `<ns:tag>` element out of a WebDAV
/// multistatus body. Namespace prefixes vary per server, so matching
/// goes by local tag name.
fn extract_tag_values(xml: &str, tag: &str) -> Vec<String> {
    let mut values = Vec::new();
    for segment in xml.split('<') {
        let Some((name, content)) = segment.split_once('>') else {
            continue;
        };
        if name.starts_with('/') || name.ends_with('/') {
            continue;
        }
        let local = name.split(':').next_back().unwrap_or(name);
        let local = local.split_whitespace().next().unwrap_or(local);
        if local.eq_ignore_ascii_case(tag) && !content.trim().is_empty() {
            values.push(xml_unescape(content.trim()));
        }
    }
    values
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#13;", "\r")
        .replace("&#10;", "\n")
        .replace("&amp;", "&")
}
