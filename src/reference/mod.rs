//! Per-project reference data: statuses, project members, sprints and wiki
//! pages, plus the project list they hang off.
//!
//! Each per-project store caches one project's worth of records and only
//! refetches when asked for a different project, when forced, or when its
//! cache is empty.

pub mod fields;
pub mod projects;
pub mod sprints;
pub mod status;
pub mod users;
pub mod wiki;

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

pub use fields::FieldCandidates;
pub use projects::{Project, ProjectStore};
pub use sprints::{Sprint, SprintStatus, SprintStore};
pub use status::StatusStore;
pub use users::{NO_ASSIGNEE_LABEL, ProjectUser, UserStore};
pub use wiki::{WikiPage, WikiStore};

/// Cached records for the project they were fetched for.
#[derive(Debug)]
pub(crate) struct ProjectCache<T> {
    pub project_id: Option<i64>,
    pub items: Vec<T>,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl<T> Default for ProjectCache<T> {
    fn default() -> Self {
        Self {
            project_id: None,
            items: Vec::new(),
            is_loading: false,
            error: None,
        }
    }
}

impl<T: Clone> ProjectCache<T> {
    /// The cached records when they can be reused for `project_id`.
    pub fn reusable(&self, project_id: i64, force: bool) -> Option<Vec<T>> {
        (!force && self.project_id == Some(project_id) && !self.items.is_empty())
            .then(|| self.items.clone())
    }

    pub fn begin(&mut self) {
        self.is_loading = true;
        self.error = None;
    }

    pub fn finish(&mut self, project_id: i64, items: Vec<T>) {
        self.is_loading = false;
        self.project_id = Some(project_id);
        self.items = items;
    }

    /// A failed load forgets the records so stale data is never shown for
    /// the wrong project.
    pub fn fail(&mut self, message: String) {
        self.is_loading = false;
        self.items.clear();
        self.error = Some(message);
    }

    pub fn clear(&mut self) {
        self.project_id = None;
        self.items.clear();
        self.error = None;
    }
}

/// Shallow-merge `patch` over a record. A non-object record is replaced.
pub(crate) fn merge_record(record: &Value, patch: &Map<String, Value>) -> Value {
    let mut merged = match record {
        Value::Object(fields) => fields.clone(),
        _ => Map::new(),
    };
    merged.extend(patch.iter().map(|(key, value)| (key.clone(), value.clone())));
    Value::Object(merged)
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
