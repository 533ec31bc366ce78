//! The project list and the project currently opened.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{FieldCandidates, lock, merge_record};
use crate::api::ProjectApi;
use crate::errors::{ApiError, BoardError, Result};

const PROJECT_ID: FieldCandidates = FieldCandidates::new("id", &[&["id"], &["projectId"]]);
const TITLE: FieldCandidates = FieldCandidates::new("title", &[&["title"], &["name"]]);
const CODE: FieldCandidates = FieldCandidates::new("code", &[&["code"]]);
const DESCRIPTION: FieldCandidates = FieldCandidates::new("description", &[&["description"]]);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: i64,
    pub title: String,
    pub code: String,
    pub description: String,
    /// The project record as received, with later edits merged in.
    #[serde(skip)]
    pub raw: Value,
}

impl Project {
    /// `CODE Title`, or just the title when the project has no code.
    pub fn label(&self) -> String {
        if self.code.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.code, self.title)
        }
    }

    fn merged(&self, patch: &Map<String, Value>) -> Project {
        let mut merged = normalize_project(&merge_record(&self.raw, patch)).unwrap_or_else(|| self.clone());
        merged.id = self.id;
        merged
    }
}

/// Normalize one project record. Records without an id are dropped.
pub fn normalize_project(record: &Value) -> Option<Project> {
    let id = PROJECT_ID.resolve_id(record)?;
    Some(Project {
        id,
        title: TITLE.resolve_str(record).unwrap_or_default(),
        code: CODE.resolve_str(record).unwrap_or_default(),
        description: DESCRIPTION.resolve_str(record).unwrap_or_default(),
        raw: record.clone(),
    })
}

#[derive(Debug, Default)]
struct ProjectState {
    projects: Vec<Project>,
    current: Option<Project>,
    is_loading: bool,
    is_saving: bool,
    error: Option<String>,
}

pub struct ProjectStore {
    api: Arc<dyn ProjectApi>,
    state: Mutex<ProjectState>,
}

impl ProjectStore {
    pub fn new(api: Arc<dyn ProjectApi>) -> Self {
        Self {
            api,
            state: Mutex::new(ProjectState::default()),
        }
    }

    /// Fetch every project the session can see. Always goes to the server.
    pub async fn list(&self) -> Result<Vec<Project>> {
        self.begin_load();
        let result = self.api.fetch_projects().await;
        let mut state = lock(&self.state);
        state.is_loading = false;
        match result {
            Ok(records) => {
                let projects: Vec<Project> = records.iter().filter_map(normalize_project).collect();
                if projects.len() < records.len() {
                    warn!(
                        dropped = records.len() - projects.len(),
                        "ignoring project records without an id"
                    );
                }
                info!(count = projects.len(), "loaded projects");
                state.projects = projects.clone();
                Ok(projects)
            }
            Err(source) => {
                let err = BoardError::fetch("Failed to load projects", source);
                warn!(error = %err, "project list fetch failed");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Open one project. `Ok(None)` when the server has no such project.
    pub async fn open(&self, project_id: i64) -> Result<Option<Project>> {
        if project_id <= 0 {
            return Err(self.reject("a project id is required"));
        }
        self.begin_load();
        let result = self.api.fetch_project(project_id).await;
        let mut state = lock(&self.state);
        state.is_loading = false;
        match result {
            Ok(record) => {
                let project = normalize_project(&record);
                debug!(project_id, found = project.is_some(), "opened project");
                state.current = project.clone();
                Ok(project)
            }
            Err(source) => {
                let err = BoardError::fetch("Failed to load project", source);
                warn!(project_id, error = %err, "project fetch failed");
                state.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Create a project and append the server's copy to the list.
    pub async fn create(&self, fields: &Map<String, Value>) -> Result<Option<Project>> {
        let titled = TITLE.resolve_str(&Value::Object(fields.clone()));
        if titled.is_none_or(|title| title.trim().is_empty()) {
            return Err(self.reject("a project title is required"));
        }
        self.begin_save();
        let result = self.api.create_project(fields).await;
        let record = self.after_commit(result, "Failed to create project")?;

        let created = normalize_project(&record);
        let mut state = lock(&self.state);
        if let Some(project) = &created {
            info!(project_id = project.id, "project created");
            state.projects.retain(|p| p.id != project.id);
            state.projects.push(project.clone());
        }
        Ok(created)
    }

    /// Update a project and merge the change into the cached copies.
    pub async fn update(&self, project_id: i64, fields: &Map<String, Value>) -> Result<()> {
        self.begin_save();
        let result = self.api.update_project(project_id, fields).await;
        let reply = self.after_commit(result, "Failed to update project")?;

        let mut patch = fields.clone();
        if let Value::Object(server) = reply {
            patch.extend(server);
        }
        let mut state = lock(&self.state);
        for project in state.projects.iter_mut().filter(|p| p.id == project_id) {
            *project = project.merged(&patch);
        }
        if let Some(current) = state.current.as_mut().filter(|p| p.id == project_id) {
            *current = current.merged(&patch);
        }
        debug!(project_id, "project updated");
        Ok(())
    }

    pub async fn delete(&self, project_id: i64) -> Result<()> {
        self.begin_save();
        let result = self.api.delete_project(project_id).await;
        self.after_commit(result, "Failed to delete project")?;

        let mut state = lock(&self.state);
        state.projects.retain(|p| p.id != project_id);
        if state.current.as_ref().is_some_and(|p| p.id == project_id) {
            state.current = None;
        }
        info!(project_id, "project deleted");
        Ok(())
    }

    fn after_commit<T>(&self, result: std::result::Result<T, ApiError>, fallback: &str) -> Result<T> {
        let mut state = lock(&self.state);
        state.is_saving = false;
        result.map_err(|source| {
            let err = BoardError::commit(fallback, source);
            warn!(error = %err, "project write failed");
            state.error = Some(err.to_string());
            err
        })
    }

    fn reject(&self, reason: &str) -> BoardError {
        let err = BoardError::Validation(reason.to_string());
        lock(&self.state).error = Some(err.to_string());
        err
    }

    fn begin_load(&self) {
        let mut state = lock(&self.state);
        state.is_loading = true;
        state.error = None;
    }

    fn begin_save(&self) {
        let mut state = lock(&self.state);
        state.is_saving = true;
        state.error = None;
    }

    pub fn clear(&self) {
        *lock(&self.state) = ProjectState::default();
    }

    pub fn projects(&self) -> Vec<Project> {
        lock(&self.state).projects.clone()
    }

    pub fn current(&self) -> Option<Project> {
        lock(&self.state).current.clone()
    }

    pub fn get(&self, project_id: i64) -> Option<Project> {
        lock(&self.state)
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .cloned()
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
