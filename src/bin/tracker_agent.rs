//! Standalone test agent for the Yandex Tracker queue.
//!
//! Usage: cargo run --bin tracker_agent [voicecal.json]
//!
//! Polls the queue for in-progress tasks, runs their mapped tests and
//! transitions statuses. Requires yandex_tracker_token and
//! yandex_tracker_org_id in the config.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use voicecal::config::Config;
use voicecal::tracker::{TestAgent, TrackerClient};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "voicecal.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let (Some(token), Some(org_id)) = (
        config.yandex_tracker_token.clone(),
        config.yandex_tracker_org_id.clone(),
    ) else {
        eprintln!("yandex_tracker_token and yandex_tracker_org_id must be configured");
        std::process::exit(1);
    };

    let tracker = TrackerClient::new(token, org_id, config.yandex_tracker_queue.clone());
    let agent = TestAgent::new(
        tracker,
        PathBuf::from("."),
        Duration::from_secs(config.test_agent_poll_interval_secs),
    );

    tokio::select! {
        _ = agent.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Test agent stopping...");
        }
    }
}
