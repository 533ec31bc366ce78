use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use taskflow_common::SelectOption;
use tracing::{debug, info, warn};

use super::{FieldCandidates, ProjectCache, lock};
use crate::api::ReferenceApi;
use crate::errors::{BoardError, Result};

/// Label of the picker entry that clears the assignee.
pub const NO_ASSIGNEE_LABEL: &str = "No Assignee";

const DEFAULT_ROLE: &str = "member";

const USER_ID: FieldCandidates = FieldCandidates::new(
    "userId",
    &[&["user", "userId"], &["userId"], &["user", "id"], &["id"]],
);
const NAME: FieldCandidates = FieldCandidates::new("name", &[&["user", "name"], &["name"]]);
const EMAIL: FieldCandidates = FieldCandidates::new("email", &[&["user", "email"], &["email"]]);
const AVATAR: FieldCandidates = FieldCandidates::new("avatar", &[&["user", "avatar"], &["avatar"]]);
const ROLE: FieldCandidates = FieldCandidates::new("role", &[&["role"]]);

/// A project member, flattened from whichever shape the API returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUser {
    pub user_id: i64,
    pub name: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub role: String,
    /// The member record as received.
    #[serde(skip)]
    pub raw: Value,
}

impl ProjectUser {
    /// Up to two upper-cased initials, `"?"` for a blank name.
    pub fn initials(&self) -> String {
        let initials: String = self
            .name
            .split_whitespace()
            .filter_map(|word| word.chars().next())
            .flat_map(char::to_uppercase)
            .take(2)
            .collect();
        if initials.is_empty() {
            "?".to_string()
        } else {
            initials
        }
    }
}

/// Normalize one member record. Records without any user id are dropped.
pub fn normalize_user(record: &Value) -> Option<ProjectUser> {
    let user_id = USER_ID.resolve_id(record)?;
    Some(ProjectUser {
        user_id,
        name: NAME
            .resolve_str(record)
            .unwrap_or_else(|| format!("User {user_id}")),
        email: EMAIL.resolve_str(record),
        avatar: AVATAR.resolve_str(record),
        role: ROLE
            .resolve_str(record)
            .unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        raw: record.clone(),
    })
}

/// Member lookup table for the current project.
pub struct UserStore {
    api: Arc<dyn ReferenceApi>,
    cache: Mutex<ProjectCache<ProjectUser>>,
}

impl UserStore {
    pub fn new(api: Arc<dyn ReferenceApi>) -> Self {
        Self {
            api,
            cache: Mutex::new(ProjectCache::default()),
        }
    }

    pub async fn load(&self, project_id: i64, force: bool) -> Result<Vec<ProjectUser>> {
        if project_id <= 0 {
            debug!(project_id, "no project selected, clearing users");
            self.clear();
            return Ok(Vec::new());
        }
        {
            let mut cache = lock(&self.cache);
            if let Some(users) = cache.reusable(project_id, force) {
                debug!(project_id, "user cache hit");
                return Ok(users);
            }
            cache.begin();
        }

        let result = self.api.fetch_project_users(project_id).await;
        let mut cache = lock(&self.cache);
        match result {
            Ok(records) => {
                let users: Vec<ProjectUser> = records.iter().filter_map(normalize_user).collect();
                if users.len() < records.len() {
                    warn!(
                        project_id,
                        dropped = records.len() - users.len(),
                        "ignoring member records without a user id"
                    );
                }
                info!(project_id, count = users.len(), "loaded project users");
                cache.finish(project_id, users.clone());
                Ok(users)
            }
            Err(source) => {
                let err = BoardError::fetch("Failed to fetch project users", source);
                warn!(project_id, error = %err, "project user fetch failed");
                cache.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// Refetch the current project. `Ok(None)` when no project is set.
    pub async fn refresh(&self) -> Result<Option<Vec<ProjectUser>>> {
        let Some(project_id) = self.project_id() else {
            warn!("no project set, cannot refresh users");
            return Ok(None);
        };
        self.load(project_id, true).await.map(Some)
    }

    pub fn clear(&self) {
        lock(&self.cache).clear();
    }

    pub fn users(&self) -> Vec<ProjectUser> {
        lock(&self.cache).items.clone()
    }

    pub fn get(&self, user_id: i64) -> Option<ProjectUser> {
        lock(&self.cache)
            .items
            .iter()
            .find(|u| u.user_id == user_id)
            .cloned()
    }

    /// Assignee picker entries, optionally headed by the "No Assignee"
    /// sentinel.
    pub fn options(&self, include_no_assignee: bool) -> Vec<SelectOption> {
        let cache = lock(&self.cache);
        include_no_assignee
            .then(|| SelectOption::none(NO_ASSIGNEE_LABEL))
            .into_iter()
            .chain(
                cache
                    .items
                    .iter()
                    .map(|u| SelectOption::new(u.name.clone(), u.user_id)),
            )
            .collect()
    }

    pub fn initials(&self, user_id: i64) -> String {
        self.get(user_id)
            .map(|u| u.initials())
            .unwrap_or_else(|| "?".to_string())
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
