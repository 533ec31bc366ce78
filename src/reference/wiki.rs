//! A project's wiki pages.
//!
//! Failures always surface the operation's own message ("Failed to load wiki
//! pages"); the server's text stays on the source error for logging.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::{FieldCandidates, ProjectCache, lock, merge_record};
use crate::api::WikiApi;
use crate::errors::{ApiError, BoardError, MessageOrder, Result};

const PAGE_ID: FieldCandidates = FieldCandidates::new("id", &[&["id"], &["pageId"]]);
const PROJECT_ID: FieldCandidates =
    FieldCandidates::new("projectId", &[&["projectId"], &["project", "id"]]);
const TITLE: FieldCandidates = FieldCandidates::new("title", &[&["title"]]);
const CONTENT: FieldCandidates = FieldCandidates::new("content", &[&["content"], &["body"]]);
const UPDATED_AT: FieldCandidates = FieldCandidates::new("updatedAt", &[&["updatedAt"]]);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WikiPage {
    pub id: i64,
    pub project_id: Option<i64>,
    pub title: String,
    pub content: String,
    pub updated_at: Option<String>,
    #[serde(skip)]
    pub raw: Value,
}

/// Normalize one page record. Records without an id are dropped.
pub fn normalize_page(record: &Value) -> Option<WikiPage> {
    let id = PAGE_ID.resolve_id(record)?;
    Some(WikiPage {
        id,
        project_id: PROJECT_ID.resolve_id(record),
        title: TITLE.resolve_str(record).unwrap_or_default(),
        content: CONTENT.resolve_str(record).unwrap_or_default(),
        updated_at: UPDATED_AT.resolve_str(record),
        raw: record.clone(),
    })
}

pub struct WikiStore {
    api: Arc<dyn WikiApi>,
    cache: Mutex<ProjectCache<WikiPage>>,
}

impl WikiStore {
    pub fn new(api: Arc<dyn WikiApi>) -> Self {
        Self {
            api,
            cache: Mutex::new(ProjectCache::default()),
        }
    }

    /// Load the project's pages. A non-positive project id empties the list
    /// without a request.
    pub async fn load(&self, project_id: i64, force: bool) -> Result<Vec<WikiPage>> {
        if project_id <= 0 {
            debug!(project_id, "no project selected, clearing wiki pages");
            self.clear();
            return Ok(Vec::new());
        }
        {
            let mut cache = lock(&self.cache);
            if let Some(pages) = cache.reusable(project_id, force) {
                debug!(project_id, "wiki cache hit");
                return Ok(pages);
            }
            cache.begin();
        }

        let result = self.api.fetch_wiki_pages(project_id).await;
        let mut cache = lock(&self.cache);
        match result {
            Ok(records) => {
                let pages: Vec<WikiPage> = records.iter().filter_map(normalize_page).collect();
                info!(project_id, count = pages.len(), "loaded wiki pages");
                cache.finish(project_id, pages.clone());
                Ok(pages)
            }
            Err(source) => {
                let err = BoardError::fetch_with(MessageOrder::FallbackOnly, "Failed to load wiki pages", source);
                warn!(project_id, error = ?err.api_error(), "wiki page list fetch failed");
                cache.fail(err.to_string());
                Err(err)
            }
        }
    }

    /// Fetch one page and refresh its cached copy. `Ok(None)` when the
    /// server returned nothing usable.
    pub async fn page(&self, page_id: i64) -> Result<Option<WikiPage>> {
        lock(&self.cache).begin();
        let result = self.api.fetch_wiki_page(page_id).await;
        let mut cache = lock(&self.cache);
        cache.is_loading = false;
        match result {
            Ok(record) => {
                let page = normalize_page(&record);
                if let Some(page) = &page
                    && let Some(cached) = cache.items.iter_mut().find(|p| p.id == page.id)
                {
                    *cached = page.clone();
                }
                Ok(page)
            }
            Err(source) => {
                let err = BoardError::fetch_with(MessageOrder::FallbackOnly, "Failed to load wiki page", source);
                warn!(page_id, error = ?err.api_error(), "wiki page fetch failed");
                cache.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Create a page. It joins the cached list when that list belongs to
    /// the same project.
    pub async fn create(&self, project_id: i64, fields: &Map<String, Value>) -> Result<Option<WikiPage>> {
        lock(&self.cache).begin();
        let result = self.api.create_wiki_page(project_id, fields).await;
        let record = self.after_write(result, "Failed to create wiki page")?;

        let created = normalize_page(&record);
        let mut cache = lock(&self.cache);
        if let Some(page) = &created
            && cache.project_id == Some(project_id)
        {
            cache.items.retain(|p| p.id != page.id);
            cache.items.push(page.clone());
        }
        Ok(created)
    }

    pub async fn update(&self, page_id: i64, fields: &Map<String, Value>) -> Result<()> {
        lock(&self.cache).begin();
        let result = self.api.update_wiki_page(page_id, fields).await;
        let reply = self.after_write(result, "Failed to update wiki page")?;

        let mut patch = fields.clone();
        if let Value::Object(server) = reply {
            patch.extend(server);
        }
        let mut cache = lock(&self.cache);
        if let Some(cached) = cache.items.iter_mut().find(|p| p.id == page_id)
            && let Some(mut merged) = normalize_page(&merge_record(&cached.raw, &patch))
        {
            merged.id = page_id;
            *cached = merged;
        }
        Ok(())
    }

    pub async fn delete(&self, page_id: i64) -> Result<()> {
        lock(&self.cache).begin();
        let result = self.api.delete_wiki_page(page_id).await;
        self.after_write(result, "Failed to delete wiki page")?;
        lock(&self.cache).items.retain(|p| p.id != page_id);
        debug!(page_id, "wiki page deleted");
        Ok(())
    }

    /// Write failures keep the cached list.
    fn after_write<T>(&self, result: std::result::Result<T, ApiError>, fallback: &str) -> Result<T> {
        let mut cache = lock(&self.cache);
        cache.is_loading = false;
        result.map_err(|source| {
            let err = BoardError::commit_with(MessageOrder::FallbackOnly, fallback, source);
            warn!(error = ?err.api_error(), "{}", fallback);
            cache.error = Some(err.to_string());
            err
        })
    }

    pub fn clear(&self) {
        lock(&self.cache).clear();
    }

    pub fn pages(&self) -> Vec<WikiPage> {
        lock(&self.cache).items.clone()
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

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeWiki {
        pages: Mutex<Vec<Value>>,
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    impl FakeWiki {
        fn seeded() -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(vec![
                    json!({"id": 1, "projectId": 4, "title": "Onboarding", "content": "Welcome"}),
                    json!({"pageId": "2", "project": {"id": 4}, "title": "Runbook", "body": "Restart"}),
                    json!({"title": "draft without id"}),
                ]),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn check(&self) -> std::result::Result<(), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(ApiError::Status {
                    status: 500,
                    message: "wiki backend down".into(),
                    error: None,
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl WikiApi for FakeWiki {
        async fn fetch_wiki_pages(&self, _project_id: i64) -> std::result::Result<Vec<Value>, ApiError> {
            self.check()?;
            Ok(self.pages.lock().unwrap().clone())
        }

        async fn fetch_wiki_page(&self, page_id: i64) -> std::result::Result<Value, ApiError> {
            self.check()?;
            Ok(json!({"id": page_id, "projectId": 4, "title": "Fresh", "content": "from server"}))
        }

        async fn create_wiki_page(
            &self,
            project_id: i64,
            fields: &Map<String, Value>,
        ) -> std::result::Result<Value, ApiError> {
            self.check()?;
            let mut record = fields.clone();
            record.insert("id".into(), json!(50));
            record.insert("projectId".into(), json!(project_id));
            Ok(Value::Object(record))
        }

        async fn update_wiki_page(
            &self,
            _page_id: i64,
            _fields: &Map<String, Value>,
        ) -> std::result::Result<Value, ApiError> {
            self.check()?;
            Ok(Value::Null)
        }

        async fn delete_wiki_page(&self, _page_id: i64) -> std::result::Result<(), ApiError> {
            self.check()
        }
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_page_shapes() {
        let pages: Vec<_> = FakeWiki::seeded()
            .pages
            .lock()
            .unwrap()
            .iter()
            .filter_map(normalize_page)
            .collect();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].id, 2);
        assert_eq!(pages[1].project_id, Some(4));
        assert_eq!(pages[1].content, "Restart");
    }

    #[tokio::test]
    async fn test_load_caches_per_project() {
        let api = FakeWiki::seeded();
        let store = WikiStore::new(api.clone());

        assert_eq!(store.load(4, false).await.unwrap().len(), 2);
        store.load(4, false).await.unwrap();
        assert_eq!(api.calls(), 1);
        store.load(4, true).await.unwrap();
        assert_eq!(api.calls(), 2);
        assert_eq!(store.project_id(), Some(4));
    }

    #[tokio::test]
    async fn test_load_without_project_clears_without_fetch() {
        let api = FakeWiki::seeded();
        let store = WikiStore::new(api.clone());
        store.load(4, false).await.unwrap();

        assert!(store.load(0, false).await.unwrap().is_empty());
        assert_eq!(api.calls(), 1);
        assert!(store.pages().is_empty());
        assert!(store.project_id().is_none());
    }

    #[tokio::test]
    async fn test_load_failure_uses_fixed_message() {
        let api = FakeWiki::seeded();
        api.fail.store(true, Ordering::SeqCst);
        let store = WikiStore::new(api.clone());

        let err = store.load(4, false).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to load wiki pages");
        assert_eq!(err.api_error().map(ApiError::message).as_deref(), Some("wiki backend down"));
        assert_eq!(store.error().as_deref(), Some("Failed to load wiki pages"));
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_page_refreshes_cached_copy() {
        let api = FakeWiki::seeded();
        let store = WikiStore::new(api.clone());
        store.load(4, false).await.unwrap();

        let page = store.page(1).await.unwrap().unwrap();
        assert_eq!(page.title, "Fresh");
        assert_eq!(store.pages()[0].content, "from server");
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_create_joins_list_of_same_project_only() {
        let api = FakeWiki::seeded();
        let store = WikiStore::new(api.clone());
        store.load(4, false).await.unwrap();

        let created = store.create(4, &fields(json!({"title": "FAQ"}))).await.unwrap().unwrap();
        assert_eq!(created.id, 50);
        assert_eq!(store.pages().len(), 3);

        store.create(9, &fields(json!({"title": "Other"}))).await.unwrap();
        assert_eq!(store.pages().len(), 3);
    }

    #[tokio::test]
    async fn test_update_merges_and_delete_filters() {
        let api = FakeWiki::seeded();
        let store = WikiStore::new(api.clone());
        store.load(4, false).await.unwrap();

        store
            .update(2, &fields(json!({"content": "Restart twice"})))
            .await
            .unwrap();
        let page = store.pages().into_iter().find(|p| p.id == 2).unwrap();
        assert_eq!(page.content, "Restart twice");
        assert_eq!(page.title, "Runbook");

        store.delete(1).await.unwrap();
        let ids: Vec<_> = store.pages().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_pages() {
        let api = FakeWiki::seeded();
        let store = WikiStore::new(api.clone());
        store.load(4, false).await.unwrap();
        api.fail.store(true, Ordering::SeqCst);

        let err = store.delete(1).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to delete wiki page");
        assert!(matches!(err, BoardError::CommitFailed { .. }));
        assert_eq!(store.pages().len(), 2);
        assert_eq!(store.error().as_deref(), Some("Failed to delete wiki page"));
        assert!(!store.is_loading());
    }
}
