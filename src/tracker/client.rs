//! Yandex Tracker API client.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::info;

const BASE_URL: &str = "https://api.tracker.yandex.net/v2";

/// A task in the Tracker queue.
#[derive(Debug, Clone)]
pub struct TrackerTask {
    pub key: String,
    pub id: String,
    pub summary: String,
    pub status: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub priority: Option<String>,
}

#[derive(Debug)]
pub enum TrackerError {
    Http(String),
    /// The API answered with an unexpected status code.
    Api { status: u16, body: String },
    Parse(String),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Http(e) => write!(f, "HTTP error: {e}"),
            TrackerError::Api { status, body } => write!(f, "API error {status}: {body}"),
            TrackerError::Parse(e) => write!(f, "Parse error: {e}"),
        }
    }
}

impl std::error::Error for TrackerError {}

#[derive(Serialize)]
struct CreateIssueRequest<'a> {
    queue: &'a str,
    summary: &'a str,
    description: &'a str,
    priority: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    assignee: Option<&'a str>,
}

#[derive(Serialize)]
struct UpdateStatusRequest<'a> {
    status: &'a str,
}

#[derive(Serialize)]
struct CommentRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct IssueResponse {
    key: String,
    id: String,
    summary: String,
    status: KeyField,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    assignee: Option<NamedField>,
    #[serde(default)]
    priority: Option<KeyField>,
}

#[derive(Deserialize)]
struct KeyField {
    key: String,
}

#[derive(Deserialize)]
struct NamedField {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display: Option<String>,
}

impl From<IssueResponse> for TrackerTask {
    fn from(issue: IssueResponse) -> Self {
        TrackerTask {
            key: issue.key,
            id: issue.id,
            summary: issue.summary,
            status: issue.status.key,
            description: issue.description,
            assignee: issue.assignee.and_then(|a| a.display.or(a.id)),
            priority: issue.priority.map(|p| p.key),
        }
    }
}

/// Client for the Tracker REST API.
pub struct TrackerClient {
    token: String,
    org_id: String,
    queue: String,
    http: reqwest::Client,
}

impl TrackerClient {
    pub fn new(token: String, org_id: String, queue: String) -> Self {
        Self {
            token,
            org_id,
            queue,
            http: reqwest::Client::new(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Authorization", format!("OAuth {}", self.token))
            .header("X-Cloud-Org-Id", &self.org_id)
    }

    /// Create a new task in the queue. Expects HTTP 201.
    pub async fn create_task(
        &self,
        summary: &str,
        description: &str,
        priority: &str,
        assignee: Option<&str>,
    ) -> Result<TrackerTask, TrackerError> {
        let payload = CreateIssueRequest {
            queue: &self.queue,
            summary,
            description,
            priority,
            assignee,
        };

        let response = self
            .request(reqwest::Method::POST, format!("{BASE_URL}/issues"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| TrackerError::Http(e.to_string()))?;

        if response.status().as_u16() != 201 {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api { status, body });
        }

        let issue: IssueResponse = response
            .json()
            .await
            .map_err(|e| TrackerError::Parse(e.to_string()))?;

        let task = TrackerTask::from(issue);
        info!("Created task {}: {}", task.key, task.summary);
        Ok(task)
    }

    /// Update a task's status. Expects HTTP 200.
    pub async fn update_task_status(&self, task_key: &str, status: &str) -> Result<(), TrackerError> {
        let response = self
            .request(reqwest::Method::PATCH, format!("{BASE_URL}/issues/{task_key}"))
            .json(&UpdateStatusRequest { status })
            .send()
            .await
            .map_err(|e| TrackerError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api {
                status: status_code,
                body,
            });
        }

        info!("Task {} status updated to {}", task_key, status);
        Ok(())
    }

    /// Add a comment to a task. Expects HTTP 201.
    pub async fn add_comment(&self, task_key: &str, comment: &str) -> Result<(), TrackerError> {
        let response = self
            .request(
                reqwest::Method::POST,
                format!("{BASE_URL}/issues/{task_key}/comments"),
            )
            .json(&CommentRequest { text: comment })
            .send()
            .await
            .map_err(|e| TrackerError::Http(e.to_string()))?;

        if response.status().as_u16() != 201 {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api { status, body });
        }

        info!("Comment added to task {}", task_key);
        Ok(())
    }

    /// Fetch all queue tasks in the given status.
    pub async fn get_tasks_by_status(&self, status: &str) -> Result<Vec<TrackerTask>, TrackerError> {
        let filter = status_filter(&self.queue, status);
        let url = format!("{BASE_URL}/issues?filter={}", urlencoding::encode(&filter));

        let response = self
            .request(reqwest::Method::GET, url)
            .send()
            .await
            .map_err(|e| TrackerError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status_code = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::Api {
                status: status_code,
                body,
            });
        }

        let issues: Vec<IssueResponse> = response
            .json()
            .await
            .map_err(|e| TrackerError::Parse(e.to_string()))?;

        let tasks: Vec<TrackerTask> = issues.into_iter().map(TrackerTask::from).collect();
        info!("Found {} tasks with status {}", tasks.len(), status);
        Ok(tasks)
    }

    /// Attach a commit reference to a task as a comment.
    pub async fn link_commit(
        &self,
        task_key: &str,
        commit_hash: &str,
        commit_message: &str,
    ) -> Result<(), TrackerError> {
        let comment = format!("Commit: `{commit_hash}`\n\n{commit_message}");
        self.add_comment(task_key, &comment).await
    }
}

fn status_filter(queue: &str, status: &str) -> String {
    format!("Queue: {queue} AND Status: {status}")
}
