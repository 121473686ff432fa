//! End-to-end aggregator scenarios over the public crate API, with
//! in-test providers standing in for the network backends.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use voicecal::calendar::{CalendarAggregator, CalendarError, CalendarProvider, Event};

struct StubProvider {
    events: Vec<Event>,
}

#[async_trait]
impl CalendarProvider for StubProvider {
    async fn get_events(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Event>, CalendarError> {
        Ok(self.events.clone())
    }
}

fn make_event(
    id: &str,
    title: &str,
    start: DateTime<Utc>,
    attendees: &[&str],
    location: Option<&str>,
    source: &str,
) -> Event {
    Event {
        id: id.to_string(),
        title: title.to_string(),
        start,
        end: start + Duration::hours(1),
        attendees: attendees.iter().map(|a| a.to_string()).collect(),
        source: source.to_string(),
        description: None,
        location: location.map(|l| l.to_string()),
        raw_data: serde_json::Value::Null,
    }
}

/// Two providers both carry a "Daily Standup", but at 10:00 and 14:00.
/// Sharing a title is not enough to merge: both must come back, sorted.
#[tokio::test]
async fn same_title_different_times_are_distinct_events() {
    let now = Utc::now();
    let morning = now + Duration::hours(1);
    let afternoon = now + Duration::hours(5);

    let mut aggregator = CalendarAggregator::new(chrono_tz::UTC);
    aggregator.add_provider(
        "yandex",
        Arc::new(StubProvider {
            events: vec![make_event("a1", "Daily Standup", morning, &[], None, "yandex")],
        }),
    );
    aggregator.add_provider(
        "google",
        Arc::new(StubProvider {
            events: vec![make_event("b1", "Daily Standup", afternoon, &[], None, "google")],
        }),
    );

    let events = aggregator.get_today_events().await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].start, morning);
    assert_eq!(events[1].start, afternoon);
}

/// The same meeting mirrored across providers with a 2-minute skew
/// collapses to one event, and the first-registered provider's copy
/// survives with its id, source and raw_data intact.
#[tokio::test]
async fn mirrored_event_collapses_to_first_provider_copy() {
    let base = Utc::now() + Duration::hours(1);

    let mut a = make_event(
        "yandex-123",
        "Important Meeting",
        base,
        &["alice@example.com", "bob@example.com"],
        Some("Room 1"),
        "yandex",
    );
    a.raw_data = serde_json::json!({"origin": "caldav"});
    let b = make_event(
        "google-456",
        "Important Meeting",
        base + Duration::minutes(2),
        &["bob@example.com", "alice@example.com"],
        Some("Room 1"),
        "google",
    );

    let mut aggregator = CalendarAggregator::new(chrono_tz::UTC);
    aggregator.add_provider("yandex", Arc::new(StubProvider { events: vec![a] }));
    aggregator.add_provider("google", Arc::new(StubProvider { events: vec![b] }));

    let start = Utc::now();
    let events = aggregator
        .get_events(start, start + Duration::days(1), true, false)
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, "yandex-123");
    assert_eq!(events[0].source, "yandex");
    assert_eq!(events[0].raw_data["origin"], "caldav");
}

/// Person search is a case-insensitive substring match over both the
/// title and the attendee list.
#[tokio::test]
async fn person_search_matches_title_and_attendees() {
    let now = Utc::now();

    let mut aggregator = CalendarAggregator::new(chrono_tz::UTC);
    aggregator.add_provider(
        "yandex",
        Arc::new(StubProvider {
            events: vec![
                make_event(
                    "m1",
                    "1:1 sync",
                    now + Duration::hours(2),
                    &["Ivan@Example.com"],
                    None,
                    "yandex",
                ),
                make_event(
                    "m2",
                    "Обсуждение с Иваном",
                    now + Duration::days(2),
                    &[],
                    None,
                    "yandex",
                ),
                make_event(
                    "m3",
                    "Review",
                    now + Duration::days(3),
                    &["ivan.petrov@example.com"],
                    None,
                    "yandex",
                ),
                make_event("m4", "Retro", now + Duration::days(4), &[], None, "yandex"),
            ],
        }),
    );

    let matches = aggregator.find_meetings_with_person("иван", 7).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].id, "m2");

    // Matches both the attendee "Ivan@Example.com" and
    // "ivan.petrov@example.com", in start-time order
    let matches = aggregator.find_meetings_with_person("ivan", 7).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].id, "m1");
    assert_eq!(matches[1].id, "m3");
}

/// With one broken provider, fail-fast and best-effort behave
/// differently and the best-effort path loses nothing else.
#[tokio::test]
async fn skip_errors_keeps_healthy_providers() {
    struct BrokenProvider;

    #[async_trait]
    impl CalendarProvider for BrokenProvider {
        async fn get_events(
            &self,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<Event>, CalendarError> {
            Err(CalendarError::Api("401 Unauthorized".to_string()))
        }
    }

    let now = Utc::now();
    let mut aggregator = CalendarAggregator::new(chrono_tz::UTC);
    aggregator.add_provider("yandex", Arc::new(BrokenProvider));
    aggregator.add_provider(
        "google",
        Arc::new(StubProvider {
            events: vec![make_event(
                "g1",
                "Planning",
                now + Duration::hours(1),
                &[],
                None,
                "google",
            )],
        }),
    );

    let failed = aggregator
        .get_events(now, now + Duration::days(1), true, false)
        .await;
    assert!(failed.is_err());

    let survived = aggregator
        .get_events(now, now + Duration::days(1), true, true)
        .await
        .unwrap();
    assert_eq!(survived.len(), 1);
    assert_eq!(survived[0].source, "google");
}
