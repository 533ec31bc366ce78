//! Sprint list for the current project.

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat};
use serde::Serialize;
use serde_json::{Map, Value};
use taskflow_common::{SelectOption, parse_id};
use tracing::{debug, info, warn};

use super::lock;
use crate::api::SprintApi;
use crate::errors::{ApiError, BoardError, MessageOrder, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SprintStatus {
    #[default]
    Planned,
    Active,
    Closed,
}

impl SprintStatus {
    /// Map the API's status text, including legacy aliases. Anything
    /// unrecognized is `Planned`.
    pub fn from_alias(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "active" | "started" => SprintStatus::Active,
            "closed" | "completed" => SprintStatus::Closed,
            _ => SprintStatus::Planned,
        }
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SprintStatus::Planned => write!(f, "planned"),
            SprintStatus::Active => write!(f, "active"),
            SprintStatus::Closed => write!(f, "closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sprint {
    pub id: i64,
    pub project_id: i64,
    pub number: i64,
    pub description: String,
    pub status: SprintStatus,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Remaining fields, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Sprint {
    pub fn label(&self) -> String {
        let suffix = match self.status {
            SprintStatus::Active => " (Active)",
            SprintStatus::Closed => " (Completed)",
            SprintStatus::Planned => "",
        };
        format!("Sprint #{}{}", self.number, suffix)
    }
}

const KNOWN_FIELDS: &[&str] = &[
    "id",
    "projectId",
    "number",
    "description",
    "status",
    "startDate",
    "endDate",
    "createdAt",
    "updatedAt",
];

fn number_or_zero(value: Option<&Value>) -> i64 {
    value.and_then(parse_id).unwrap_or(0)
}

/// Text dates pass through; epoch milliseconds are rendered as RFC 3339.
fn normalize_date(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => n
            .as_i64()
            .filter(|ms| *ms != 0)
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
        _ => None,
    }
}

pub fn normalize_sprint(record: &Value) -> Sprint {
    let field = |key: &str| record.get(key);
    let extra = record
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(key, _)| !KNOWN_FIELDS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        })
        .unwrap_or_default();

    Sprint {
        id: number_or_zero(field("id")),
        project_id: number_or_zero(field("projectId")),
        number: number_or_zero(field("number")),
        description: field("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        status: field("status")
            .and_then(Value::as_str)
            .map(SprintStatus::from_alias)
            .unwrap_or_default(),
        start_date: normalize_date(field("startDate")),
        end_date: normalize_date(field("endDate")),
        created_at: normalize_date(field("createdAt")),
        updated_at: normalize_date(field("updatedAt")),
        extra,
    }
}

/// Newest first: `number` descending, then `id` descending.
pub fn sprint_order(a: &Sprint, b: &Sprint) -> Ordering {
    b.number.cmp(&a.number).then(b.id.cmp(&a.id))
}

#[derive(Debug, Default)]
struct SprintState {
    project_id: Option<i64>,
    sprints: Vec<Sprint>,
    is_loading: bool,
    is_saving: bool,
    error: Option<String>,
}

pub struct SprintStore {
    api: Arc<dyn SprintApi>,
    state: Mutex<SprintState>,
}

impl SprintStore {
    pub fn new(api: Arc<dyn SprintApi>) -> Self {
        Self {
            api,
            state: Mutex::new(SprintState::default()),
        }
    }

    /// Load the project's sprints. A non-positive project id empties the
    /// list without a request.
    pub async fn fetch(&self, project_id: i64, force: bool) -> Result<Vec<Sprint>> {
        {
            let mut state = lock(&self.state);
            if project_id <= 0 {
                state.sprints.clear();
                state.project_id = None;
                return Ok(Vec::new());
            }
            if !force && state.project_id == Some(project_id) && !state.sprints.is_empty() {
                debug!(project_id, "sprint cache hit");
                return Ok(state.sprints.clone());
            }
            state.is_loading = true;
            state.error = None;
        }

        let result = self.api.fetch_sprints(project_id).await;
        let mut state = lock(&self.state);
        state.is_loading = false;
        match result {
            Ok(records) => {
                let mut sprints: Vec<Sprint> = records.iter().map(normalize_sprint).collect();
                sprints.sort_by(sprint_order);
                info!(project_id, count = sprints.len(), "loaded sprints");
                state.sprints = sprints.clone();
                state.project_id = Some(project_id);
                Ok(sprints)
            }
            Err(source) => {
                let err = BoardError::fetch_with(MessageOrder::ErrorFirst, "Failed to load sprints", source);
                warn!(project_id, error = %err, "sprint fetch failed");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub async fn create(&self, project_id: i64, fields: &Map<String, Value>) -> Result<Value> {
        self.begin_save();
        let result = self.api.create_sprint(project_id, fields).await;
        let outcome = self.after_commit(project_id, result, "Failed to create sprint").await;
        self.end_save();
        outcome
    }

    pub async fn update(&self, project_id: i64, sprint_id: i64, fields: &Map<String, Value>) -> Result<()> {
        self.begin_save();
        let result = self.api.update_sprint(sprint_id, fields).await;
        let outcome = self
            .after_commit(project_id, result, "Failed to update sprint")
            .await
            .map(drop);
        self.end_save();
        outcome
    }

    pub async fn delete(&self, project_id: i64, sprint_id: i64) -> Result<()> {
        self.begin_save();
        let result = self.api.delete_sprint(sprint_id).await;
        let outcome = self
            .after_commit(project_id, result, "Failed to delete sprint")
            .await
            .map(drop);
        self.end_save();
        outcome
    }

    /// A successful write is followed by a forced refetch so the list
    /// reflects server-side renumbering.
    async fn after_commit<T>(
        &self,
        project_id: i64,
        result: std::result::Result<T, ApiError>,
        fallback: &str,
    ) -> Result<T> {
        let value = match result {
            Ok(value) => value,
            Err(source) => {
                let err = BoardError::commit_with(MessageOrder::ErrorFirst, fallback, source);
                warn!(project_id, error = %err, "sprint write failed");
                lock(&self.state).error = Some(err.to_string());
                return Err(err);
            }
        };
        self.fetch(project_id, true).await?;
        Ok(value)
    }

    fn begin_save(&self) {
        let mut state = lock(&self.state);
        state.is_saving = true;
        state.error = None;
    }

    fn end_save(&self) {
        lock(&self.state).is_saving = false;
    }

    pub fn clear(&self) {
        let mut state = lock(&self.state);
        state.sprints.clear();
        state.project_id = None;
        state.error = None;
    }

    pub fn sprints(&self) -> Vec<Sprint> {
        lock(&self.state).sprints.clone()
    }

    pub fn active_sprint(&self) -> Option<Sprint> {
        lock(&self.state)
            .sprints
            .iter()
            .find(|s| s.status == SprintStatus::Active)
            .cloned()
    }

    pub fn options(&self) -> Vec<SelectOption> {
        lock(&self.state)
            .sprints
            .iter()
            .map(|s| SelectOption::new(s.label(), s.id))
            .collect()
    }

    pub fn project_id(&self) -> Option<i64> {
        lock(&self.state).project_id
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).is_loading
    }

    pub fn is_saving(&self) -> bool {
        lock(&self.state).is_saving
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.state).error.clone()
    }
}
