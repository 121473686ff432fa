//! Automated test agent for Tracker tasks.
//!
//! Polls the queue for in-progress tasks, runs the test target mapped
//! from the task summary, comments the outcome and transitions the task
//! status. Errors in one cycle are logged and never kill the loop.

use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tracing::{error, info, warn};

use crate::tracker::client::{TrackerClient, TrackerTask};

/// How much captured test output goes into a failure comment.
const MAX_OUTPUT_CHARS: usize = 3000;

/// Keyword → cargo test filter mapping, checked in order against the
/// lowercased task summary.
const TEST_TARGETS: &[(&str, &str)] = &[
    ("aggregator", "calendar::aggregator"),
    ("yandex calendar", "calendar::caldav"),
    ("google calendar", "calendar::ics"),
    ("calendar", "calendar"),
    ("nlp", "nlp"),
    ("command parser", "nlp"),
    ("stt", "stt"),
    ("tts", "tts"),
    ("voice", "stt"),
    ("config", "config"),
    ("bot", "bot"),
    ("tracker", "tracker"),
];

struct TestOutcome {
    success: bool,
    output: String,
}

/// Agent that automatically tests tasks from the Tracker queue.
pub struct TestAgent {
    tracker: TrackerClient,
    project_root: PathBuf,
    poll_interval: Duration,
}

impl TestAgent {
    pub fn new(tracker: TrackerClient, project_root: PathBuf, poll_interval: Duration) -> Self {
        info!(
            "Test agent initialized (poll interval: {}s)",
            poll_interval.as_secs()
        );
        Self {
            tracker,
            project_root,
            poll_interval,
        }
    }

    /// Run the polling loop forever.
    pub async fn run(&self) {
        info!("🤖 Test agent starting...");
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            interval.tick().await;
            if let Err(e) = self.process_cycle().await {
                error!("Error in test agent cycle: {}", e);
            }
        }
    }

    async fn process_cycle(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        info!("🔍 Checking for tasks in progress...");
        let tasks = self.tracker.get_tasks_by_status("inProgress").await?;

        let testable: Vec<TrackerTask> = tasks
            .into_iter()
            .filter(|t| test_filter_for(&t.summary).is_some())
            .collect();

        if testable.is_empty() {
            info!("No tasks found for testing");
            return Ok(());
        }

        info!("Found {} task(s) to test", testable.len());
        for task in testable {
            if let Err(e) = self.test_task(&task).await {
                error!("Failed to process task {}: {}", task.key, e);
            }
        }

        Ok(())
    }

    async fn test_task(
        &self,
        task: &TrackerTask,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // Presence was checked by the caller's filter
        let Some(filter) = test_filter_for(&task.summary) else {
            return Ok(());
        };

        info!("🧪 Testing task: {} - {}", task.key, task.summary);
        let outcome = self.run_tests(filter).await;

        if outcome.success {
            info!("Tests passed for {}", task.key);
            let comment = format!(
                "✅ **Тесты успешно пройдены**\n\nЦель: `cargo test {filter}`\n\nЗадача закрыта автоматически."
            );
            self.tracker.add_comment(&task.key, &comment).await?;
            self.tracker.update_task_status(&task.key, "closed").await?;
        } else {
            warn!("Tests failed for {}", task.key);
            let comment = format!(
                "❌ **Тесты не прошли**\n\nЦель: `cargo test {filter}`\n\n```\n{}\n```\n\nЗадача возвращена в работу.",
                outcome.output
            );
            self.tracker.add_comment(&task.key, &comment).await?;
            self.tracker
                .update_task_status(&task.key, "stop_progress")
                .await?;
        }

        Ok(())
    }

    async fn run_tests(&self, filter: &str) -> TestOutcome {
        let result = Command::new("cargo")
            .arg("test")
            .arg(filter)
            .current_dir(&self.project_root)
            .output()
            .await;

        match result {
            Ok(output) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                TestOutcome {
                    success: output.status.success(),
                    output: tail(&combined, MAX_OUTPUT_CHARS),
                }
            }
            Err(e) => TestOutcome {
                success: false,
                output: format!("failed to run cargo test: {e}"),
            },
        }
    }
}

/// Map a task summary to a cargo test filter, or `None` when the task
/// has nothing to test.
fn test_filter_for(summary: &str) -> Option<&'static str> {
    let summary_lower = summary.to_lowercase();
    TEST_TARGETS
        .iter()
        .find(|(keyword, _)| summary_lower.contains(keyword))
        .map(|(_, filter)| *filter)
}

fn tail(s: &str, max_chars: usize) -> String {
    let count = s.chars().count();
    if count <= max_chars {
        s.to_string()
    } else {
        s.chars().skip(count - max_chars).collect()
    }
}
