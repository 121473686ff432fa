//! Yandex Tracker integration: REST client and the automated test agent.

pub mod agent;
pub mod client;

pub use agent::TestAgent;
pub use client::{TrackerClient, TrackerError, TrackerTask};
