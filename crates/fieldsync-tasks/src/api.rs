//! Remote task endpoints.
//!
//! [`TaskApi`] is the seam between the [`TaskStore`](crate::TaskStore) and
//! the backend. [`HttpTaskApi`] implements it on top of the shared
//! [`ApiClient`], so every call carries the current bearer token and a 401
//! forces the session out before the error reaches the store.

use async_trait::async_trait;
use fieldsync::{ApiClient, Result};
use serde::Deserialize;

use crate::types::{Task, TaskDraft};

/// Task endpoints consumed by the store.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// `GET /New/GetTask/:userId` - tasks owned by `owner_id`.
    async fn fetch_owned(&self, owner_id: &str) -> Result<Vec<Task>>;

    /// `GET /New/GetTask` - every task visible to the caller.
    async fn fetch_all(&self) -> Result<Vec<Task>>;

    /// `POST /New/CreateTask`.
    async fn create(&self, draft: &TaskDraft) -> Result<()>;

    /// `PUT /New/UpdateTask/:id` with the full merged record.
    async fn update(&self, task: &Task) -> Result<()>;

    /// `DELETE /New/DeleteTask/:id`.
    async fn delete(&self, task_id: &str) -> Result<()>;
}

#[derive(Deserialize)]
struct TaskList {
    #[serde(default)]
    data: Vec<Task>,
}

/// [`TaskApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    api: ApiClient,
}

impl HttpTaskApi {
    /// Wrap the shared API client.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

/// Reject a 2xx reply that still carries an `error` field.
fn check_reply(reply: &serde_json::Value) -> Result<()> {
    match reply.get("error").and_then(|e| e.as_str()) {
        Some(message) => Err(fieldsync::Error::server(200, message)),
        None => Ok(()),
    }
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn fetch_owned(&self, owner_id: &str) -> Result<Vec<Task>> {
        let list: TaskList = self
            .api
            .get_json(&format!("/New/GetTask/{owner_id}"))
            .await?;
        Ok(list.data)
    }

    async fn fetch_all(&self) -> Result<Vec<Task>> {
        let list: TaskList = self.api.get_json("/New/GetTask").await?;
        Ok(list.data)
    }

    async fn create(&self, draft: &TaskDraft) -> Result<()> {
        let body = draft
            .to_request_body()
            .map_err(|e| fieldsync::Error::config(format!("failed to encode task draft: {e}")))?;
        let reply: serde_json::Value = self.api.post_json("/New/CreateTask", &body).await?;
        check_reply(&reply)
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let body = task
            .to_request_body()
            .map_err(|e| fieldsync::Error::config(format!("failed to encode task: {e}")))?;
        let reply: serde_json::Value = self
            .api
            .put_json(&format!("/New/UpdateTask/{}", task.id), &body)
            .await?;
        check_reply(&reply)
    }

    async fn delete(&self, task_id: &str) -> Result<()> {
        self.api.delete(&format!("/New/DeleteTask/{task_id}")).await
    }
}
