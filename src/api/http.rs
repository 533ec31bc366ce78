//! reqwest-backed implementation of the API traits.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use taskflow_common::{Column, Task, TaskId};
use tracing::{debug, warn};

use super::{BoardApi, MoveTaskRequest, ProjectApi, ReferenceApi, SprintApi, TaskFields, WikiApi};
use crate::errors::ApiError;
use crate::session::Session;

/// Paths a misconfigured backend only serves relative to the base URL's
/// own path. A 404 on one of these is retried once without the leading
/// slash.
static SLASHLESS_FALLBACK_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"^/projects/[^/]+/board$").expect("valid board path pattern"),
        Regex::new(r"^/projects/[^/]+/status/[^/]+/rank$").expect("valid rank path pattern"),
    ]
});

const AUTHORIZATION_PHRASES: &[&str] = &[
    "authorization header is required",
    "missing authorization",
    "unauthorized",
];

/// Transport settings, resolved from configuration.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub base_url: String,
    pub timeout: Duration,
    pub fallback_without_leading_slash: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            base_url: crate::config::DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            fallback_without_leading_slash: true,
        }
    }
}

pub struct HttpApi {
    client: reqwest::Client,
    base_url: Url,
    session: Session,
    fallback_without_leading_slash: bool,
}

impl HttpApi {
    pub fn new(options: &HttpOptions, session: Session) -> Result<Self, ApiError> {
        let base_url = Url::parse(&options.base_url).map_err(|e| invalid_url(&options.base_url, e))?;
        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("taskflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ApiError::Transport)?;
        Ok(Self {
            client,
            base_url,
            session,
            fallback_without_leading_slash: options.fallback_without_leading_slash,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.send(Method::GET, path, None).await?;
        decode(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &impl serde::Serialize,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(ApiError::Encode)?;
        let response = self.send(method, path, Some(&body)).await?;
        decode(response).await
    }

    async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.send(Method::DELETE, path, None).await.map(drop)
    }

    /// One logical request: primary attempt, the slash-less fallback where
    /// it applies, then unauthorized handling.
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let path = normalize_path(path);
        let url = self.resolve(&path)?;

        let mut result = self.send_once(method.clone(), url, body).await;
        let retry = matches!(&result, Err(err) if err.is_not_found())
            && self.fallback_without_leading_slash
            && needs_slashless_fallback(&path);
        if retry {
            debug!(path = %path, "404 on leading-slash path, retrying relative to base");
            let url = self.resolve_relative(&path)?;
            result = self.send_once(method, url, body).await;
        }

        result.map_err(|err| {
            if err.is_unauthorized() {
                self.session.invalidate(err.message());
            } else {
                warn!(path = %path, status = ?err.status(), error = %err, "API request failed");
            }
            err
        })
    }

    async fn send_once(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, ApiError> {
        debug!(%method, %url, "sending request");
        let mut request = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ApiError::Transport)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &text))
    }

    /// Join the normalized path onto the base URL, keeping the base's own
    /// path prefix.
    fn resolve(&self, path: &str) -> Result<Url, ApiError> {
        if is_absolute(path) {
            return Url::parse(path).map_err(|e| invalid_url(path, e));
        }
        let mut joined = self.base_url.as_str().trim_end_matches('/').to_string();
        joined.push_str(path);
        Url::parse(&joined).map_err(|e| invalid_url(path, e))
    }

    /// Resolve the path without its leading slash as a relative reference
    /// against the base URL.
    fn resolve_relative(&self, path: &str) -> Result<Url, ApiError> {
        let relative = path.trim_start_matches('/');
        self.base_url.join(relative).map_err(|e| invalid_url(relative, e))
    }
}

fn invalid_url(path: &str, err: impl std::fmt::Display) -> ApiError {
    ApiError::InvalidUrl {
        path: path.to_string(),
        message: err.to_string(),
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

/// Absolute URLs pass through; everything else gets a leading slash.
pub fn normalize_path(path: &str) -> String {
    if is_absolute(path) || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

pub fn needs_slashless_fallback(path: &str) -> bool {
    SLASHLESS_FALLBACK_PATTERNS.iter().any(|re| re.is_match(path))
}

/// Pull a readable message out of an error body: `message`, then `error`,
/// then the HTTP reason phrase.
pub fn extract_error_message(status: StatusCode, body: &str) -> String {
    ["message", "error"]
        .iter()
        .find_map(|key| body_field(body, key))
        .or_else(|| status.canonical_reason().map(str::to_string))
        .unwrap_or_else(|| "Request failed".to_string())
}

/// A non-blank string field of a JSON failure body.
fn body_field(body: &str, key: &str) -> Option<String> {
    let json = serde_json::from_str::<Value>(body).ok()?;
    json.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn is_authorization_failure(status: StatusCode, message: &str) -> bool {
    if status == StatusCode::UNAUTHORIZED {
        return true;
    }
    let message = message.to_lowercase();
    AUTHORIZATION_PHRASES.iter().any(|phrase| message.contains(phrase))
}

fn classify_failure(status: StatusCode, body: &str) -> ApiError {
    let message = extract_error_message(status, body);
    if is_authorization_failure(status, &message) {
        ApiError::Unauthorized { message }
    } else {
        ApiError::Status {
            status: status.as_u16(),
            message,
            error: body_field(body, "error"),
        }
    }
}

/// Decode a JSON body; an empty body decodes as `null`.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let bytes = response.bytes().await.map_err(ApiError::Transport)?;
    let bytes: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &bytes
    };
    serde_json::from_slice(bytes).map_err(ApiError::Decode)
}

/// Endpoints that return a list but may answer `null` or a non-array.
fn into_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

#[async_trait]
impl BoardApi for HttpApi {
    async fn fetch_board(&self, project_id: i64) -> Result<Vec<Column>, ApiError> {
        let columns: Option<Vec<Column>> = self.get(&format!("/projects/{project_id}/board")).await?;
        Ok(columns.unwrap_or_default())
    }

    async fn create_task(&self, project_id: i64, fields: &TaskFields) -> Result<Task, ApiError> {
        self.send_json(Method::POST, &format!("/projects/{project_id}/tasks"), fields)
            .await
    }

    async fn update_task(&self, task_id: TaskId, fields: &TaskFields) -> Result<Task, ApiError> {
        self.send_json(Method::PUT, &format!("/tasks/{task_id}"), fields)
            .await
    }

    async fn delete_task(&self, task_id: TaskId) -> Result<(), ApiError> {
        self.delete(&format!("/tasks/{task_id}")).await
    }

    async fn move_task(&self, task_id: TaskId, request: &MoveTaskRequest) -> Result<Task, ApiError> {
        self.send_json(Method::PATCH, &format!("/tasks/{task_id}/move"), request)
            .await
    }

    async fn fetch_task(&self, task_id: TaskId) -> Result<Task, ApiError> {
        self.get(&format!("/tasks/{task_id}")).await
    }
}

#[async_trait]
impl ReferenceApi for HttpApi {
    async fn fetch_statuses(&self, project_id: i64) -> Result<Vec<Value>, ApiError> {
        self.get(&format!("/projects/{project_id}/status"))
            .await
            .map(into_list)
    }

    async fn fetch_project_users(&self, project_id: i64) -> Result<Vec<Value>, ApiError> {
        self.get(&format!("/projects/{project_id}/users"))
            .await
            .map(into_list)
    }
}

#[async_trait]
impl SprintApi for HttpApi {
    async fn fetch_sprints(&self, project_id: i64) -> Result<Vec<Value>, ApiError> {
        self.get(&format!("/projects/{project_id}/sprints"))
            .await
            .map(into_list)
    }

    async fn create_sprint(&self, project_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError> {
        self.send_json(Method::POST, &format!("/projects/{project_id}/sprints"), fields)
            .await
    }

    async fn update_sprint(&self, sprint_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError> {
        self.send_json(Method::PUT, &format!("/sprints/{sprint_id}"), fields)
            .await
    }

    async fn delete_sprint(&self, sprint_id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/sprints/{sprint_id}")).await
    }
}

#[async_trait]
impl ProjectApi for HttpApi {
    async fn fetch_projects(&self) -> Result<Vec<Value>, ApiError> {
        self.get("/projects").await.map(into_list)
    }

    async fn fetch_project(&self, project_id: i64) -> Result<Value, ApiError> {
        self.get(&format!("/projects/{project_id}")).await
    }

    async fn create_project(&self, fields: &Map<String, Value>) -> Result<Value, ApiError> {
        self.send_json(Method::POST, "/projects", fields).await
    }

    async fn update_project(&self, project_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError> {
        self.send_json(Method::PUT, &format!("/projects/{project_id}"), fields)
            .await
    }

    async fn delete_project(&self, project_id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/projects/{project_id}")).await
    }
}

#[async_trait]
impl WikiApi for HttpApi {
    async fn fetch_wiki_pages(&self, project_id: i64) -> Result<Vec<Value>, ApiError> {
        self.get(&format!("/projects/{project_id}/wiki"))
            .await
            .map(into_list)
    }

    async fn fetch_wiki_page(&self, page_id: i64) -> Result<Value, ApiError> {
        self.get(&format!("/wiki/{page_id}")).await
    }

    async fn create_wiki_page(&self, project_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError> {
        self.send_json(Method::POST, &format!("/projects/{project_id}/wiki"), fields)
            .await
    }

    async fn update_wiki_page(&self, page_id: i64, fields: &Map<String, Value>) -> Result<Value, ApiError> {
        self.send_json(Method::PUT, &format!("/wiki/{page_id}"), fields)
            .await
    }

    async fn delete_wiki_page(&self, page_id: i64) -> Result<(), ApiError> {
        self.delete(&format!("/wiki/{page_id}")).await
    }
}
