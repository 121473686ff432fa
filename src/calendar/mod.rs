//! Calendar aggregation: event model, provider capability, the Yandex
//! CalDAV and Google ICS backends, and the deduplicating aggregator.

pub mod aggregator;
pub mod caldav;
pub mod event;
pub mod ics;
pub mod provider;

pub use aggregator::CalendarAggregator;
pub use caldav::CaldavProvider;
pub use event::Event;
pub use ics::IcsProvider;
pub use provider::{CalendarError, CalendarProvider};
