use std::sync::{Arc, Mutex};

use serde_json::Value;
use taskflow_common::{SelectOption, Status, StatusId};
use tracing::{debug, info, warn};

use super::{FieldCandidates, ProjectCache, lock};
use crate::api::ReferenceApi;
use crate::errors::{BoardError, Result};

const STATUS_ID: FieldCandidates = FieldCandidates::new("id", &[&["id"], &["statusId"]]);
const STATUS_TITLE: FieldCandidates =
    FieldCandidates::new("title", &[&["title"], &["name"], &["statusTitle"]]);

/// Normalize one status record. Records without a usable id are dropped.
pub fn normalize_status(record: &Value) -> Option<Status> {
    let id = STATUS_ID.resolve_id(record)?;
    Some(Status {
        id,
        title: STATUS_TITLE.resolve_str(record).unwrap_or_default(),
    })
}

/// Status lookup table for the current project.
pub struct StatusStore {
    api: Arc<dyn ReferenceApi>,
    cache: Mutex<ProjectCache<Status>>,
}

impl StatusStore {
    pub fn new(api: Arc<dyn ReferenceApi>) -> Self {
        Self {
            api,
            cache: Mutex::new(ProjectCache::default()),
        }
    }

    pub async fn load(&self, project_id: i64, force: bool) -> Result<Vec<Status>> {
        if project_id <= 0 {
            debug!(project_id, "no project selected, clearing statuses");
            self.clear();
            return Ok(Vec::new());
        }
        {
            let mut cache = lock(&self.cache);
            if let Some(statuses) = cache.reusable(project_id, force) {
                debug!(project_id, "status cache hit");
                return Ok(statuses);
            }
            cache.begin();
        }

        let result = self.api.fetch_statuses(project_id).await;
        let mut cache = lock(&self.cache);
        match result {
            Ok(records) => {
                let statuses: Vec<Status> = records.iter().filter_map(normalize_status).collect();
                if statuses.len() < records.len() {
                    warn!(
                        project_id,
                        dropped = records.len() - statuses.len(),
                        "ignoring status records without an id"
                    );
                }
                info!(project_id, count = statuses.len(), "loaded statuses");
                cache.finish(project_id, statuses.clone());
                Ok(statuses)
            }
            Err(source) => {
                let err = BoardError::fetch("Failed to fetch statuses", source);
                warn!(project_id, error = %err, "status fetch failed");
                cache.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// Seed the cache from a loaded board so the picker needs no second
    /// round trip.
    pub fn set_from_board(&self, project_id: i64, statuses: Vec<Status>) {
        let mut cache = lock(&self.cache);
        cache.error = None;
        cache.finish(project_id, statuses);
    }

    /// Refetch the current project. `Ok(None)` when no project is set.
    pub async fn refresh(&self) -> Result<Option<Vec<Status>>> {
        let Some(project_id) = self.project_id() else {
            warn!("no project set, cannot refresh statuses");
            return Ok(None);
        };
        self.load(project_id, true).await.map(Some)
    }

    pub fn clear(&self) {
        lock(&self.cache).clear();
    }

    pub fn statuses(&self) -> Vec<Status> {
        lock(&self.cache).items.clone()
    }

    pub fn get(&self, status_id: StatusId) -> Option<Status> {
        lock(&self.cache)
            .items
            .iter()
            .find(|s| s.id == status_id)
            .cloned()
    }

    pub fn options(&self) -> Vec<SelectOption> {
        lock(&self.cache)
            .items
            .iter()
            .map(|s| SelectOption::new(s.title.clone(), s.id))
            .collect()
    }

    pub fn project_id(&self) -> Option<i64> {
        lock(&self.cache).project_id
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.cache).is_loading
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.cache).error.clone()
    }
}
