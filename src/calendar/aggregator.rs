//! Aggregation of events across calendar providers.
//!
//! Merges events from every registered provider, collapses near-identical
//! entries with a fuzzy signature, and serves derived time-window queries.
//! Cross-provider mirroring (the same meeting synced between Yandex and
//! Google) produces entries that differ only in id/source; exact-id dedup
//! would never merge them and title-only dedup would wrongly merge
//! distinct recurring meetings. The composite signature below balances
//! both.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, info, warn};

use crate::calendar::event::Event;
use crate::calendar::provider::{CalendarError, CalendarProvider};

/// Rounding interval for fuzzy start-time matching.
const DEDUP_ROUND_MINUTES: u32 = 5;

/// Aggregates events from multiple calendar providers with deduplication.
pub struct CalendarAggregator {
    /// Providers in registration order. Re-registering a name replaces
    /// the provider in place, keeping its original slot.
    providers: Vec<(String, Arc<dyn CalendarProvider>)>,
    /// Timezone used for "today"/"tomorrow" day boundaries.
    tz: Tz,
}

impl CalendarAggregator {
    pub fn new(tz: Tz) -> Self {
        Self {
            providers: Vec::new(),
            tz,
        }
    }

    /// Register a provider under `name`, replacing any existing one.
    pub fn add_provider(&mut self, name: impl Into<String>, provider: Arc<dyn CalendarProvider>) {
        let name = name.into();
        match self.providers.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = provider,
            None => self.providers.push((name.clone(), provider)),
        }
        info!("Added calendar provider: {}", name);
    }

    /// Remove a provider; no-op when the name is unknown.
    pub fn remove_provider(&mut self, name: &str) {
        let before = self.providers.len();
        self.providers.retain(|(n, _)| n != name);
        if self.providers.len() != before {
            info!("Removed calendar provider: {}", name);
        }
    }

    /// Get aggregated events from all providers, sorted by start time.
    ///
    /// Providers are queried sequentially in registration order. When
    /// `skip_errors` is false, the first provider failure aborts the
    /// whole call with that error and no partial result; when true,
    /// failing providers are logged and omitted. Deduplication keeps
    /// the first occurrence of each signature, so the earliest-registered
    /// provider's copy of a mirrored event wins.
    pub async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        deduplicate: bool,
        skip_errors: bool,
    ) -> Result<Vec<Event>, CalendarError> {
        if start > end {
            return Err(CalendarError::InvalidWindow(format!(
                "start {start} is after end {end}"
            )));
        }

        info!("Aggregating events from {} providers", self.providers.len());
        let mut all_events = Vec::new();

        for (name, provider) in &self.providers {
            debug!("Fetching events from {}", name);
            match provider.get_events(start, end).await {
                Ok(events) => {
                    debug!("Got {} events from {}", events.len(), name);
                    all_events.extend(events);
                }
                Err(e) => {
                    warn!("Failed to get events from {}: {}", name, e);
                    if !skip_errors {
                        return Err(e);
                    }
                }
            }
        }

        info!("Collected {} total events", all_events.len());

        if deduplicate && !all_events.is_empty() {
            all_events = deduplicate_events(all_events);
            info!("After deduplication: {} events", all_events.len());
        }

        all_events.sort_by_key(|e| e.start);
        Ok(all_events)
    }

    /// Events for today, midnight to midnight in the configured timezone.
    pub async fn get_today_events(&self) -> Result<Vec<Event>, CalendarError> {
        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let start = self.day_start(today);
        let end = self.day_start(today + Duration::days(1));
        self.get_events(start, end, true, false).await
    }

    /// Events for tomorrow.
    pub async fn get_tomorrow_events(&self) -> Result<Vec<Event>, CalendarError> {
        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let start = self.day_start(today + Duration::days(1));
        let end = self.day_start(today + Duration::days(2));
        self.get_events(start, end, true, false).await
    }

    /// Events in the next `hours` hours.
    pub async fn get_upcoming_events(&self, hours: i64) -> Result<Vec<Event>, CalendarError> {
        let now = Utc::now();
        self.get_events(now, now + Duration::hours(hours), true, false)
            .await
    }

    /// Meetings where `person` appears (case-insensitive substring) in
    /// the title or in any attendee, looking `days_ahead` days forward.
    pub async fn find_meetings_with_person(
        &self,
        person: &str,
        days_ahead: i64,
    ) -> Result<Vec<Event>, CalendarError> {
        let now = Utc::now();
        let all_events = self
            .get_events(now, now + Duration::days(days_ahead), true, false)
            .await?;

        let person_lower = person.to_lowercase();
        let matching: Vec<Event> = all_events
            .into_iter()
            .filter(|event| {
                event.title.to_lowercase().contains(&person_lower)
                    || event
                        .attendees
                        .iter()
                        .any(|a| a.to_lowercase().contains(&person_lower))
            })
            .collect();

        info!("Found {} meetings with {}", matching.len(), person);
        Ok(matching)
    }

    fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        match self.tz.from_local_datetime(&midnight) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
            // DST gap at midnight; fall back to the UTC reading
            LocalResult::None => Utc.from_utc_datetime(&midnight),
        }
    }
}

/// Keep the first occurrence of each signature, in input order.
fn deduplicate_events(events: Vec<Event>) -> Vec<Event> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(events.len());

    for event in events {
        if seen.insert(event_signature(&event)) {
            unique.push(event);
        } else {
            debug!("Duplicate event detected: {} at {}", event.title, event.start);
        }
    }

    unique
}

/// Fuzzy signature for an event: normalized title, start rounded to the
/// nearest 5 minutes, sorted normalized attendees, normalized location.
/// All four fields must match for two events to be duplicates.
fn event_signature(event: &Event) -> String {
    let title = event.title.trim().to_lowercase();
    let start = round_to_minutes(event.start, DEDUP_ROUND_MINUTES);

    let mut attendees: Vec<String> = event
        .attendees
        .iter()
        .map(|a| a.trim().to_lowercase())
        .collect();
    attendees.sort();

    let location = event
        .location
        .as_deref()
        .map(|l| l.trim().to_lowercase())
        .unwrap_or_default();

    format!(
        "{}|{}|{}|{}",
        title,
        start.to_rfc3339(),
        attendees.join(","),
        location
    )
}

/// Round to the nearest N minutes. The discarded remainder (minutes mod
/// N, seconds, sub-seconds) is subtracted; when it reaches half the
/// interval the result is bumped up by a full interval instead.
fn round_to_minutes(dt: DateTime<Utc>, minutes: u32) -> DateTime<Utc> {
    let interval = Duration::minutes(minutes as i64);
    let discard = Duration::minutes((dt.minute() % minutes) as i64)
        + Duration::seconds(dt.second() as i64)
        + Duration::nanoseconds(dt.timestamp_subsec_nanos() as i64);

    let mut rounded = dt - discard;
    if discard >= interval / 2 {
        rounded += interval;
    }
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn event(id: &str, title: &str, start: DateTime<Utc>, source: &str) -> Event {
        Event {
            id: id.to_string(),
            title: title.to_string(),
            start,
            end: start + Duration::hours(1),
            attendees: vec![],
            source: source.to_string(),
            description: None,
            location: None,
            raw_data: serde_json::Value::Null,
        }
    }

    /// Provider returning a fixed set of events.
    struct FixedProvider {
        events: Vec<Event>,
    }

    #[async_trait]
    impl CalendarProvider for FixedProvider {
        async fn get_events(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Event>, CalendarError> {
            Ok(self.events.clone())
        }
    }

    /// Provider that always fails.
    struct FailingProvider;

    #[async_trait]
    impl CalendarProvider for FailingProvider {
        async fn get_events(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Event>, CalendarError> {
            Err(CalendarError::Http("connection refused".to_string()))
        }
    }

    fn aggregator() -> CalendarAggregator {
        CalendarAggregator::new(chrono_tz::UTC)
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap(),
        )
    }

    fn t(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, hour, min, 0).unwrap()
    }

    #[tokio::test]
    async fn test_aggregate_single_provider() {
        let mut agg = aggregator();
        agg.add_provider(
            "yandex",
            Arc::new(FixedProvider {
                events: vec![
                    event("y1", "Team Meeting", t(10, 0), "yandex"),
                    event("y2", "Lunch", t(12, 0), "yandex"),
                ],
            }),
        );

        let (start, end) = window();
        let events = agg.get_events(start, end, true, false).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Team Meeting");
        assert_eq!(events[1].title, "Lunch");
    }

    #[tokio::test]
    async fn test_aggregate_multiple_providers_sorted() {
        let mut agg = aggregator();
        agg.add_provider(
            "yandex",
            Arc::new(FixedProvider {
                events: vec![event("y1", "Late", t(15, 0), "yandex")],
            }),
        );
        agg.add_provider(
            "google",
            Arc::new(FixedProvider {
                events: vec![event("g1", "Early", t(9, 0), "google")],
            }),
        );

        let (start, end) = window();
        let events = agg.get_events(start, end, true, false).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].title, "Early");
        assert_eq!(events[1].title, "Late");
        for pair in events.windows(2) {
            assert!(pair[0].start <= pair[1].start);
        }
    }

    #[tokio::test]
    async fn test_empty_aggregator_returns_empty() {
        let agg = aggregator();
        let (start, end) = window();
        let events = agg.get_events(start, end, true, false).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_add_provider_twice_replaces() {
        let mut agg = aggregator();
        agg.add_provider(
            "yandex",
            Arc::new(FixedProvider {
                events: vec![event("old", "Old", t(10, 0), "yandex")],
            }),
        );
        agg.add_provider(
            "yandex",
            Arc::new(FixedProvider {
                events: vec![event("new", "New", t(11, 0), "yandex")],
            }),
        );

        let (start, end) = window();
        let events = agg.get_events(start, end, true, false).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "new");
    }

    #[tokio::test]
    async fn test_replaced_provider_keeps_registration_slot() {
        let mut agg = aggregator();
        agg.add_provider(
            "first",
            Arc::new(FixedProvider {
                events: vec![event("f1", "Mirrored", t(10, 0), "first")],
            }),
        );
        agg.add_provider(
            "second",
            Arc::new(FixedProvider {
                events: vec![event("s1", "Mirrored", t(10, 0), "second")],
            }),
        );
        // Re-register "first": still visited before "second", so its
        // copy of the duplicated event must win.
        agg.add_provider(
            "first",
            Arc::new(FixedProvider {
                events: vec![event("f2", "Mirrored", t(10, 0), "first")],
            }),
        );

        let (start, end) = window();
        let events = agg.get_events(start, end, true, false).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "f2");
    }

    #[tokio::test]
    async fn test_remove_provider() {
        let mut agg = aggregator();
        agg.add_provider(
            "yandex",
            Arc::new(FixedProvider {
                events: vec![event("y1", "Meeting", t(10, 0), "yandex")],
            }),
        );
        agg.remove_provider("yandex");
        agg.remove_provider("missing"); // no-op

        let (start, end) = window();
        let events = agg.get_events(start, end, true, false).await.unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_fail_fast_yields_no_partial_result() {
        let mut agg = aggregator();
        agg.add_provider(
            "good",
            Arc::new(FixedProvider {
                events: vec![event("g1", "Meeting", t(10, 0), "good")],
            }),
        );
        agg.add_provider("bad", Arc::new(FailingProvider));

        let (start, end) = window();
        let result = agg.get_events(start, end, true, false).await;
        assert!(matches!(result, Err(CalendarError::Http(_))));
    }

    #[tokio::test]
    async fn test_skip_errors_returns_surviving_events() {
        let mut agg = aggregator();
        agg.add_provider("bad", Arc::new(FailingProvider));
        agg.add_provider(
            "good",
            Arc::new(FixedProvider {
                events: vec![event("g1", "Meeting", t(10, 0), "good")],
            }),
        );

        let (start, end) = window();
        let events = agg.get_events(start, end, true, true).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].source, "good");
    }

    #[tokio::test]
    async fn test_inverted_window_is_rejected() {
        let agg = aggregator();
        let (start, end) = window();
        let result = agg.get_events(end, start, true, false).await;
        assert!(matches!(result, Err(CalendarError::InvalidWindow(_))));
    }

    #[tokio::test]
    async fn test_dedup_merges_small_clock_skew() {
        let mut agg = aggregator();
        let mut a = event("y1", "Important Meeting", t(11, 0), "yandex");
        a.attendees = vec!["alice@example.com".to_string(), "bob@example.com".to_string()];
        a.location = Some("Room 1".to_string());
        let mut b = event("g1", "Important Meeting", t(11, 2), "google");
        b.attendees = vec!["bob@example.com".to_string(), "alice@example.com".to_string()];
        b.location = Some("Room 1".to_string());

        agg.add_provider("yandex", Arc::new(FixedProvider { events: vec![a] }));
        agg.add_provider("google", Arc::new(FixedProvider { events: vec![b] }));

        let (start, end) = window();
        let events = agg.get_events(start, end, true, false).await.unwrap();
        assert_eq!(events.len(), 1);
        // First-registered provider's copy survives
        assert_eq!(events[0].id, "y1");
        assert_eq!(events[0].source, "yandex");
    }

    #[tokio::test]
    async fn test_dedup_keeps_events_ten_minutes_apart() {
        let mut agg = aggregator();
        agg.add_provider(
            "yandex",
            Arc::new(FixedProvider {
                events: vec![event("y1", "Daily Standup", t(10, 0), "yandex")],
            }),
        );
        agg.add_provider(
            "google",
            Arc::new(FixedProvider {
                events: vec![event("g1", "Daily Standup", t(10, 10), "google")],
            }),
        );

        let (start, end) = window();
        let events = agg.get_events(start, end, true, false).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_dedup_respects_attendee_difference() {
        let mut agg = aggregator();
        let mut a = event("y1", "Sync", t(10, 0), "yandex");
        a.attendees = vec!["alice@example.com".to_string()];
        let mut b = event("g1", "Sync", t(10, 0), "google");
        b.attendees = vec!["alice@example.com".to_string(), "bob@example.com".to_string()];

        agg.add_provider("yandex", Arc::new(FixedProvider { events: vec![a] }));
        agg.add_provider("google", Arc::new(FixedProvider { events: vec![b] }));

        let (start, end) = window();
        let events = agg.get_events(start, end, true, false).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_dedup_can_be_disabled() {
        let mut agg = aggregator();
        agg.add_provider(
            "yandex",
            Arc::new(FixedProvider {
                events: vec![event("y1", "Mirrored", t(10, 0), "yandex")],
            }),
        );
        agg.add_provider(
            "google",
            Arc::new(FixedProvider {
                events: vec![event("g1", "Mirrored", t(10, 0), "google")],
            }),
        );

        let (start, end) = window();
        let events = agg.get_events(start, end, false, false).await.unwrap();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_find_person_case_insensitive() {
        let mut agg = aggregator();
        // find_meetings_with_person windows from "now", so pin events
        // relative to the current time.
        let now = Utc::now();
        let mut with_attendee = event("y1", "Planning", now + Duration::hours(1), "yandex");
        with_attendee.attendees = vec!["Ivan@Example.com".to_string()];
        let in_title = event("y2", "Встреча с Иваном", now + Duration::hours(3), "yandex");
        let unrelated = event("y3", "Lunch", now + Duration::hours(5), "yandex");

        agg.add_provider(
            "yandex",
            Arc::new(FixedProvider {
                events: vec![with_attendee, in_title, unrelated],
            }),
        );

        let matches = agg.find_meetings_with_person("иван", 7).await.unwrap();
        assert_eq!(matches.len(), 2);

        let matches = agg.find_meetings_with_person("ivan", 7).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "y1");
    }

    #[test]
    fn test_round_down_below_half_interval() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 10, 10, 2, 29).unwrap();
        assert_eq!(
            round_to_minutes(dt, 5),
            Utc.with_ymd_and_hms(2024, 6, 10, 10, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_round_up_at_exactly_half_interval() {
        // 2 minutes 30 seconds discarded == half of 5 minutes: rounds up
        let dt = Utc.with_ymd_and_hms(2024, 6, 10, 10, 2, 30).unwrap();
        assert_eq!(
            round_to_minutes(dt, 5),
            Utc.with_ymd_and_hms(2024, 6, 10, 10, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_round_on_boundary_is_identity() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 10, 10, 15, 0).unwrap();
        assert_eq!(round_to_minutes(dt, 5), dt);
    }

    #[test]
    fn test_signature_ignores_attendee_order_and_case() {
        let mut a = event("a", "Sync", Utc.with_ymd_and_hms(2024, 6, 10, 10, 0, 0).unwrap(), "x");
        a.attendees = vec!["Alice@example.com".to_string(), "bob@example.com".to_string()];
        let mut b = event("b", " SYNC ", Utc.with_ymd_and_hms(2024, 6, 10, 10, 1, 0).unwrap(), "y");
        b.attendees = vec!["bob@example.com".to_string(), "alice@example.com".to_string()];

        assert_eq!(event_signature(&a), event_signature(&b));
    }
}
