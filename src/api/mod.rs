//! Remote API surface.
//!
//! The stores only ever talk to these traits, so tests swap in an in-memory
//! implementation while the CLI uses [`HttpApi`].

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use taskflow_common::{Column, StatusId, Task, TaskId};

use crate::errors::ApiError;

pub use http::HttpApi;

/// Freeform task attributes as sent in create and update bodies.
pub type TaskFields = Map<String, Value>;

/// Body of `PATCH /tasks/{id}/move`.
///
/// Both neighbour ranks travel with the request so the server can recompute
/// the rank itself if it disagrees with ours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveTaskRequest {
    pub status_id: StatusId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_task_rank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_task_rank: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
}

/// Board and task endpoints.
#[async_trait]
pub trait BoardApi: Send + Sync {
    /// `GET /projects/{id}/board`. A `null` body is an empty board.
    async fn fetch_board(&self, project_id: i64) -> Result<Vec<Column>, ApiError>;

    /// `POST /projects/{id}/tasks`
    async fn create_task(&self, project_id: i64, fields: &TaskFields) -> Result<Task, ApiError>;

    /// `PUT /tasks/{id}`
    async fn update_task(&self, task_id: TaskId, fields: &TaskFields) -> Result<Task, ApiError>;

    /// `DELETE /tasks/{id}`
    async fn delete_task(&self, task_id: TaskId) -> Result<(), ApiError>;

    /// `PATCH /tasks/{id}/move`
    async fn move_task(&self, task_id: TaskId, request: &MoveTaskRequest) -> Result<Task, ApiError>;

    /// `GET /tasks/{id}`, used to hydrate a neighbour whose rank the board
    /// payload left out.
    async fn fetch_task(&self, task_id: TaskId) -> Result<Task, ApiError>;
}

/// Status and membership lookups. Records come back raw because their
/// shape varies between endpoints and is normalized by the caches.
#[async_trait]
pub trait ReferenceApi: Send + Sync {
    /// `GET /projects/{id}/status`
    async fn fetch_statuses(&self, project_id: i64) -> Result<Vec<Value>, ApiError>;

    /// `GET /projects/{id}/users`
    async fn fetch_project_users(&self, project_id: i64) -> Result<Vec<Value>, ApiError>;
}

/// Sprint endpoints.
#[async_trait]
pub trait SprintApi: Send + Sync {
    /// `GET /projects/{id}/sprints`
    async fn fetch_sprints(&self, project_id: i64) -> Result<Vec<Value>, ApiError>;

    /// `POST /projects/{id}/sprints`
    async fn create_sprint(&self, project_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError>;

    /// `PUT /sprints/{id}`
    async fn update_sprint(&self, sprint_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError>;

    /// `DELETE /sprints/{id}`
    async fn delete_sprint(&self, sprint_id: i64) -> Result<(), ApiError>;
}

/// Project endpoints.
#[async_trait]
pub trait ProjectApi: Send + Sync {
    /// `GET /projects`
    async fn fetch_projects(&self) -> Result<Vec<Value>, ApiError>;

    /// `GET /projects/{id}`. A `null` body means no such project.
    async fn fetch_project(&self, project_id: i64) -> Result<Value, ApiError>;

    /// `POST /projects`
    async fn create_project(&self, fields: &Map<String, Value>) -> Result<Value, ApiError>;

    /// `PUT /projects/{id}`
    async fn update_project(&self, project_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError>;

    /// `DELETE /projects/{id}`
    async fn delete_project(&self, project_id: i64) -> Result<(), ApiError>;
}

/// Wiki endpoints.
#[async_trait]
pub trait WikiApi: Send + Sync {
    /// `GET /projects/{id}/wiki`
    async fn fetch_wiki_pages(&self, project_id: i64) -> Result<Vec<Value>, ApiError>;

    /// `GET /wiki/{id}`
    async fn fetch_wiki_page(&self, page_id: i64) -> Result<Value, ApiError>;

    /// `POST /projects/{id}/wiki`
    async fn create_wiki_page(&self, project_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError>;

    /// `PUT /wiki/{id}`
    async fn update_wiki_page(&self, page_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError>;

    /// `DELETE /wiki/{id}`
    async fn delete_wiki_page(&self, page_id: i64) -> Result<(), ApiError>;
}
