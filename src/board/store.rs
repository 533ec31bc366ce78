//! Board sync coordinator.
//!
//! Owns the board cache for one project and mediates every change to it:
//! reads go through snapshots, writes commit remotely and then reconcile the
//! cache, and moves are applied optimistically and rolled back when the
//! server refuses them.
//!
//! The state mutex is never held across an `.await`. Overlapping operations
//! interleave at their await points and the last writer wins, unless
//! `serialize_mutations` is set, in which case mutations queue on an async
//! gate in issue order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::json;
use taskflow_common::{
    BoardCache, Column, RankError, StatusId, Task, TaskId, adjusted_index, key_between,
};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use super::events::{BoardEvent, EVENT_CAPACITY, publish};
use super::modal::ModalState;
use crate::api::{BoardApi, MoveTaskRequest, TaskFields};
use crate::errors::{ApiError, BoardError, Result};
use crate::reference::StatusStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardOptions {
    pub serialize_mutations: bool,
    pub hydrate_missing_ranks: bool,
}

impl Default for BoardOptions {
    fn default() -> Self {
        Self {
            serialize_mutations: false,
            hydrate_missing_ranks: true,
        }
    }
}

/// What a call to [`BoardStore::move_task`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    /// A column or the task is not on the board.
    Skipped,
    /// The task already sits at the requested slot.
    Unchanged,
    /// Committed; the task as cached afterwards.
    Moved(Task),
}

#[derive(Debug, Default)]
struct BoardState {
    project_id: Option<i64>,
    cache: BoardCache,
    is_loading: bool,
    is_saving: bool,
    error: Option<String>,
    modal: ModalState,
}

/// A neighbour of a dropped task: its id and rank as cached.
type Neighbour = Option<(TaskId, Option<String>)>;

pub struct BoardStore {
    api: Arc<dyn BoardApi>,
    statuses: Option<Arc<StatusStore>>,
    state: Mutex<BoardState>,
    events: broadcast::Sender<BoardEvent>,
    mutation_gate: Option<tokio::sync::Mutex<()>>,
    hydrate_missing_ranks: bool,
}

impl BoardStore {
    pub fn new(api: Arc<dyn BoardApi>) -> Self {
        Self::with_options(api, BoardOptions::default())
    }

    pub fn with_options(api: Arc<dyn BoardApi>, options: BoardOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            statuses: None,
            state: Mutex::new(BoardState::default()),
            events,
            mutation_gate: options
                .serialize_mutations
                .then(|| tokio::sync::Mutex::new(())),
            hydrate_missing_ranks: options.hydrate_missing_ranks,
        }
    }

    /// Keep `statuses` in step with every successful board load.
    pub fn with_status_store(mut self, statuses: Arc<StatusStore>) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn gate(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        match &self.mutation_gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        }
    }

    // ── read accessors ───────────────────────────────────────────────

    pub fn columns(&self) -> Vec<Column> {
        self.state().cache.columns().to_vec()
    }

    pub fn snapshot(&self) -> BoardCache {
        self.state().cache.clone()
    }

    pub fn column(&self, status_id: StatusId) -> Option<Column> {
        self.state().cache.find_column(status_id).cloned()
    }

    pub fn task(&self, task_id: TaskId) -> Option<Task> {
        self.state().cache.task(task_id).cloned()
    }

    pub fn project_id(&self) -> Option<i64> {
        self.state().project_id
    }

    pub fn is_loading(&self) -> bool {
        self.state().is_loading
    }

    pub fn is_saving(&self) -> bool {
        self.state().is_saving
    }

    pub fn error(&self) -> Option<String> {
        self.state().error.clone()
    }

    pub fn modal(&self) -> ModalState {
        self.state().modal.clone()
    }

    // ── modal state ──────────────────────────────────────────────────

    pub fn open_create_modal(&self, status_id: StatusId) {
        self.state().modal.open_create(status_id);
        publish(&self.events, BoardEvent::ModalChanged);
    }

    pub fn open_detail_modal(&self, task: Task) {
        self.state().modal.open_detail(task);
        publish(&self.events, BoardEvent::ModalChanged);
    }

    pub fn open_update_modal(&self, task: Task) {
        self.state().modal.open_update(task);
        publish(&self.events, BoardEvent::ModalChanged);
    }

    pub fn close_modals(&self) {
        self.state().modal.close_all();
        publish(&self.events, BoardEvent::ModalChanged);
    }

    // ── loading ──────────────────────────────────────────────────────

    /// Fetch the board and replace the cache wholesale.
    ///
    /// A non-positive project id is treated as "no project": the board is
    /// emptied and no request is made. On failure the cached board is left
    /// as it was.
    #[instrument(skip(self))]
    pub async fn load_board(&self, project_id: i64) -> Result<()> {
        if project_id <= 0 {
            debug!("no project id, showing an empty board");
            self.reset();
            return Ok(());
        }

        {
            let mut state = self.state();
            state.is_loading = true;
            state.error = None;
        }
        publish(&self.events, BoardEvent::Loading { project_id });

        let result = self.api.fetch_board(project_id).await;

        let mut state = self.state();
        state.is_loading = false;
        match result {
            Ok(columns) => {
                state.cache.replace(columns);
                state.project_id = Some(project_id);
                let statuses = state.cache.statuses();
                let (columns, tasks) = (state.cache.columns().len(), state.cache.task_count());
                drop(state);

                if let Some(store) = &self.statuses {
                    store.set_from_board(project_id, statuses);
                }
                info!(project_id, columns, tasks, "board loaded");
                publish(
                    &self.events,
                    BoardEvent::Loaded {
                        project_id,
                        columns,
                        tasks,
                    },
                );
                Ok(())
            }
            Err(source) => {
                let err = BoardError::fetch("Failed to load board data", source);
                state.error = Some(err.to_string());
                drop(state);

                warn!(project_id, error = %err, "board load failed");
                publish(
                    &self.events,
                    BoardEvent::LoadFailed {
                        project_id,
                        message: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Reload the current project. No-op when none is loaded.
    pub async fn refresh(&self) -> Result<()> {
        match self.project_id() {
            Some(project_id) => self.load_board(project_id).await,
            None => {
                warn!("no project loaded, cannot refresh board");
                Ok(())
            }
        }
    }

    /// Forget the board, e.g. when navigating away from the project.
    pub fn reset(&self) {
        {
            let mut state = self.state();
            state.cache.clear();
            state.project_id = None;
            state.error = None;
            state.modal.close_all();
        }
        publish(&self.events, BoardEvent::Cleared);
    }

    // ── mutations ────────────────────────────────────────────────────

    fn begin_commit(&self) {
        let mut state = self.state();
        state.error = None;
        state.is_saving = true;
    }

    fn fail_commit(&self, fallback: &str, source: ApiError) -> BoardError {
        let err = BoardError::commit(fallback, source);
        {
            let mut state = self.state();
            state.is_saving = false;
            state.error = Some(err.to_string());
        }
        warn!(error = %err, "{}", fallback);
        publish(
            &self.events,
            BoardEvent::CommitFailed {
                message: err.to_string(),
            },
        );
        err
    }

    /// Reject a mutation before any request goes out.
    fn reject(&self, reason: &str) -> BoardError {
        let err = BoardError::Validation(reason.to_string());
        self.state().error = Some(err.to_string());
        warn!(error = %err, "mutation rejected");
        err
    }

    /// Create a task remotely, then splice the server's copy into its column
    /// at the position its rank dictates.
    #[instrument(skip(self, fields))]
    pub async fn create_task(
        &self,
        project_id: i64,
        status_id: StatusId,
        fields: TaskFields,
    ) -> Result<Task> {
        if project_id <= 0 {
            return Err(self.reject("a project is required to create a task"));
        }
        let _gate = self.gate().await;
        self.begin_commit();

        let mut payload = fields;
        payload.insert("statusId".to_string(), json!(status_id));

        let created = match self.api.create_task(project_id, &payload).await {
            Ok(task) => task,
            Err(source) => return Err(self.fail_commit("Failed to create task", source)),
        };

        let destination = if created.status_id != 0 {
            created.status_id
        } else {
            status_id
        };
        let mut state = self.state();
        state.is_saving = false;
        // An overlapping load may already have brought the task in.
        state.cache.remove_anywhere(created.id);
        let mut task = created.clone();
        task.status_id = destination;
        match state.cache.insert_ranked(destination, task) {
            Some(index) => debug!(task_id = created.id, destination, index, "task created"),
            None => debug!(task_id = created.id, destination, "destination column not on board"),
        }
        drop(state);

        publish(
            &self.events,
            BoardEvent::TaskCreated {
                task_id: created.id,
                status_id: destination,
            },
        );
        Ok(created)
    }

    /// Update a task remotely, then merge the change into the cached copy,
    /// moving it across columns when its status changed.
    #[instrument(skip(self, updates))]
    pub async fn update_task(&self, task_id: TaskId, updates: TaskFields) -> Result<Task> {
        if updates.is_empty() {
            return Err(self.reject("no fields to update"));
        }
        let _gate = self.gate().await;
        self.begin_commit();

        let updated = match self.api.update_task(task_id, &updates).await {
            Ok(task) => task,
            Err(source) => return Err(self.fail_commit("Failed to update task", source)),
        };

        let mut state = self.state();
        state.is_saving = false;
        let landed = reconcile_update(&mut state.cache, task_id, &updates, updated.clone());
        drop(state);

        publish(
            &self.events,
            BoardEvent::TaskUpdated {
                task_id,
                status_id: landed,
            },
        );
        Ok(updated)
    }

    /// Delete a task remotely, then drop it from every column.
    #[instrument(skip(self))]
    pub async fn delete_task(&self, task_id: TaskId) -> Result<()> {
        let _gate = self.gate().await;
        self.begin_commit();

        if let Err(source) = self.api.delete_task(task_id).await {
            return Err(self.fail_commit("Failed to delete task", source));
        }

        let mut state = self.state();
        state.is_saving = false;
        while state.cache.remove_anywhere(task_id).is_some() {}
        drop(state);

        publish(&self.events, BoardEvent::TaskDeleted { task_id });
        Ok(())
    }

    /// Same-column reorder with no remote call.
    pub fn reorder_task_locally(
        &self,
        status_id: StatusId,
        task_id: TaskId,
        to_index: Option<usize>,
    ) -> bool {
        let moved = self.state().cache.reorder_within(status_id, task_id, to_index);
        if moved {
            publish(&self.events, BoardEvent::Reordered { task_id, status_id });
        }
        moved
    }

    /// Move a task to `to_index` of column `to_status_id` (append when
    /// `None`).
    ///
    /// For a same-column move `to_index` is a drop position in the list as it
    /// was before the task was lifted out. The move is applied to the cache
    /// immediately, a rank between the new neighbours is computed, and the
    /// change is committed. If the commit (or fetching a neighbour's missing
    /// rank) fails, the affected columns are restored exactly.
    #[instrument(skip(self))]
    pub async fn move_task(
        &self,
        task_id: TaskId,
        from_status_id: StatusId,
        to_status_id: StatusId,
        to_index: Option<usize>,
    ) -> Result<MoveOutcome> {
        let _gate = self.gate().await;

        let snapshot = {
            let mut state = self.state();
            let cache = &mut state.cache;

            let (Some(source), Some(destination)) = (
                cache.find_column(from_status_id),
                cache.find_column(to_status_id),
            ) else {
                debug!("source or destination column not on board");
                return Ok(MoveOutcome::Skipped);
            };
            let Some(original) = source.position_of(task_id) else {
                debug!("task not in source column");
                return Ok(MoveOutcome::Skipped);
            };

            let target = if from_status_id == to_status_id {
                let last = source.tasks.len() - 1;
                let target = adjusted_index(original, to_index).map_or(last, |i| i.min(last));
                if target == original {
                    debug!(index = original, "task already in place");
                    return Ok(MoveOutcome::Unchanged);
                }
                target
            } else {
                to_index.map_or(destination.tasks.len(), |i| i.min(destination.tasks.len()))
            };

            let snapshot = cache.snapshot_columns(&[from_status_id, to_status_id]);
            let Some((task, _)) = cache.remove_task(from_status_id, task_id) else {
                return Ok(MoveOutcome::Skipped);
            };
            cache.insert_task(to_status_id, task, Some(target));

            state.error = None;
            state.is_saving = true;
            snapshot
        };
        publish(
            &self.events,
            BoardEvent::MoveApplied {
                task_id,
                from_status_id,
                to_status_id,
                index: self.index_of(task_id).unwrap_or_default(),
            },
        );

        let committed = self.commit_move(task_id, to_status_id).await;

        let mut state = self.state();
        state.is_saving = false;
        match committed {
            Ok(server) => {
                let moved = state.cache.task_mut(task_id).map(|task| {
                    task.absorb(server);
                    task.status_id = to_status_id;
                    task.clone()
                });
                // The server may have re-ranked the task.
                state.cache.settle(to_status_id, task_id);
                drop(state);

                let Some(moved) = moved else {
                    // A reload replaced the board while the commit was in flight.
                    debug!("moved task no longer cached");
                    return Ok(MoveOutcome::Skipped);
                };
                info!(rank = ?moved.rank, "move committed");
                publish(
                    &self.events,
                    BoardEvent::MoveCommitted {
                        task_id,
                        status_id: to_status_id,
                        rank: moved.rank.clone(),
                    },
                );
                Ok(MoveOutcome::Moved(moved))
            }
            Err(err) => {
                state.cache.restore_columns(snapshot);
                state.error = Some(err.to_string());
                drop(state);

                warn!(error = %err, "move rejected, rolled back");
                publish(
                    &self.events,
                    BoardEvent::MoveRolledBack {
                        task_id,
                        message: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    fn index_of(&self, task_id: TaskId) -> Option<usize> {
        self.state().cache.locate_task(task_id).map(|(_, idx)| idx)
    }

    /// Rank the moved task between its neighbours and send the move.
    async fn commit_move(&self, task_id: TaskId, to_status_id: StatusId) -> Result<Task> {
        let (left, right) = self.neighbours(task_id, to_status_id);

        let hydrated = tokio::try_join!(self.neighbour_rank(left), self.neighbour_rank(right));
        let (left_rank, right_rank) =
            hydrated.map_err(|source| BoardError::commit("Failed to move task", source))?;

        let rank = self.stamp_rank(task_id, to_status_id);

        let request = MoveTaskRequest {
            status_id: to_status_id,
            left_task_rank: left_rank,
            right_task_rank: right_rank,
            rank,
        };
        self.api
            .move_task(task_id, &request)
            .await
            .map_err(|source| BoardError::commit("Failed to move task", source))
    }

    /// Rank the moved task against the column as it stands after hydration
    /// and stamp the result. A task that ends up unranked is re-placed in the
    /// unranked tail.
    fn stamp_rank(&self, task_id: TaskId, status_id: StatusId) -> Option<String> {
        let mut state = self.state();
        let cache = &mut state.cache;
        let column = cache.find_column(status_id)?;
        let idx = column.position_of(task_id)?;

        let rank = match slot_bounds(column, idx) {
            None => {
                debug!("unranked task above the drop slot, leaving rank unset");
                None
            }
            Some((lower, upper)) => match key_between(lower.as_deref(), upper.as_deref()) {
                Ok(rank) => Some(rank),
                Err(RankError::InvalidRange { lower, upper }) => {
                    // Equal or inverted neighbour ranks; the server re-ranks.
                    warn!(%lower, %upper, "neighbour ranks leave no gap");
                    None
                }
            },
        };

        if let Some(task) = cache.task_mut(task_id) {
            task.rank = rank.clone();
        }
        if let Some(index) = cache.settle(status_id, task_id) {
            debug!(index, "moved task re-placed by rank");
        }
        rank
    }

    fn neighbours(&self, task_id: TaskId, status_id: StatusId) -> (Neighbour, Neighbour) {
        let state = self.state();
        let Some(column) = state.cache.find_column(status_id) else {
            return (None, None);
        };
        let Some(idx) = column.position_of(task_id) else {
            return (None, None);
        };
        let describe = |task: &Task| (task.id, task.rank.clone());
        let left = idx
            .checked_sub(1)
            .and_then(|i| column.tasks.get(i))
            .map(describe);
        let right = column.tasks.get(idx + 1).map(describe);
        (left, right)
    }

    /// A neighbour's rank, fetching the task when the board left it out.
    async fn neighbour_rank(&self, neighbour: Neighbour) -> std::result::Result<Option<String>, ApiError> {
        let Some((task_id, rank)) = neighbour else {
            return Ok(None);
        };
        if rank.is_some() || !self.hydrate_missing_ranks {
            return Ok(rank);
        }

        debug!(task_id, "hydrating neighbour rank");
        let fetched = self.api.fetch_task(task_id).await?;
        if let Some(rank) = &fetched.rank
            && let Some(task) = self.state().cache.task_mut(task_id)
        {
            task.rank = Some(rank.clone());
        }
        Ok(fetched.rank)
    }
}

/// Rank bounds for the task at `idx`: the nearest ranked tasks above and
/// below it. `None` when an unranked task sits above the slot, since
/// unranked tasks sort after every ranked one.
fn slot_bounds(column: &Column, idx: usize) -> Option<(Option<String>, Option<String>)> {
    let above = &column.tasks[..idx];
    if above.iter().any(|task| task.rank.is_none()) {
        return None;
    }
    let lower = above.last().and_then(|task| task.rank.clone());
    let upper = column.tasks[idx + 1..]
        .iter()
        .find_map(|task| task.rank.clone());
    Some((lower, upper))
}

/// Merge a committed update into the cache. Returns the column the task
/// ended up in, or `None` when it is not (or no longer) on the board.
fn reconcile_update(
    cache: &mut BoardCache,
    task_id: TaskId,
    updates: &TaskFields,
    server: Task,
) -> Option<StatusId> {
    let (source_status, index) = cache.locate_task(task_id)?;
    let (mut task, _) = cache.remove_task(source_status, task_id)?;
    let previous_rank = task.rank.clone();

    task.apply_patch(updates);
    task.absorb(server);
    let target_status = match task.status_id {
        0 => source_status,
        id => id,
    };

    let inserted = if target_status == source_status && task.rank == previous_rank {
        cache.insert_task(source_status, task, Some(index))
    } else {
        cache.insert_ranked(target_status, task)
    };
    inserted.map(|_| target_status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ApiError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory API double. Records every move request and can be told to
    /// reject moves or neighbour lookups.
    #[derive(Default)]
    struct MockApi {
        board: Mutex<Vec<Column>>,
        tasks: Mutex<HashMap<TaskId, Task>>,
        created: Mutex<Option<Task>>,
        moves: Mutex<Vec<(TaskId, MoveTaskRequest)>>,
        move_response_rank: Mutex<Option<String>>,
        reject_moves: bool,
        reject_writes: bool,
        reject_fetch_task: bool,
        fail_board: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockApi {
        fn with_board(columns: Vec<Column>) -> Self {
            Self {
                board: Mutex::new(columns),
                ..Self::default()
            }
        }

        fn rejected(status: u16, message: &str) -> ApiError {
            ApiError::Status {
                status,
                message: message.to_string(),
                error: None,
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn recorded_moves(&self) -> Vec<(TaskId, MoveTaskRequest)> {
            self.moves.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BoardApi for MockApi {
        async fn fetch_board(&self, _project_id: i64) -> std::result::Result<Vec<Column>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_board.load(Ordering::SeqCst) {
                return Err(Self::rejected(500, "Database unavailable"));
            }
            Ok(self.board.lock().unwrap().clone())
        }

        async fn create_task(&self, _project_id: i64, fields: &TaskFields) -> std::result::Result<Task, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_writes {
                return Err(Self::rejected(422, "Title is required"));
            }
            let mut task = self.created.lock().unwrap().clone().unwrap_or_else(|| Task::new(99, 0));
            task.apply_patch(fields);
            Ok(task)
        }

        async fn update_task(&self, task_id: TaskId, fields: &TaskFields) -> std::result::Result<Task, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_writes {
                return Err(Self::rejected(403, ""));
            }
            let mut task = Task::new(task_id, 0);
            task.apply_patch(fields);
            task.fields.insert("updatedAt".into(), json!("now"));
            Ok(task)
        }

        async fn delete_task(&self, _task_id: TaskId) -> std::result::Result<(), ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_writes {
                return Err(Self::rejected(404, "Task not found"));
            }
            Ok(())
        }

        async fn move_task(&self, task_id: TaskId, request: &MoveTaskRequest) -> std::result::Result<Task, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.moves.lock().unwrap().push((task_id, request.clone()));
            if self.reject_moves {
                return Err(Self::rejected(409, "Move rejected"));
            }
            let rank = self
                .move_response_rank
                .lock()
                .unwrap()
                .clone()
                .or_else(|| request.rank.clone());
            let mut task = Task::new(task_id, request.status_id);
            task.rank = rank;
            Ok(task)
        }

        async fn fetch_task(&self, task_id: TaskId) -> std::result::Result<Task, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject_fetch_task {
                return Err(Self::rejected(500, "Lookup failed"));
            }
            self.tasks
                .lock()
                .unwrap()
                .get(&task_id)
                .cloned()
                .ok_or_else(|| Self::rejected(404, "Task not found"))
        }
    }

    const A: StatusId = 1;
    const B: StatusId = 2;

    fn two_columns() -> Vec<Column> {
        vec![
            Column::new(A, "Todo").with_tasks(vec![Task::new(1, A).with_rank("m")]),
            Column::new(B, "Done").with_tasks(vec![Task::new(2, B).with_rank("m")]),
        ]
    }

    fn three_in_a() -> Vec<Column> {
        vec![
            Column::new(A, "Todo").with_tasks(vec![
                Task::new(1, A).with_rank("b"),
                Task::new(2, A).with_rank("d"),
                Task::new(3, A).with_rank("f"),
            ]),
            Column::new(B, "Done"),
        ]
    }

    async fn loaded(api: MockApi) -> (Arc<MockApi>, BoardStore) {
        let api = Arc::new(api);
        let store = BoardStore::new(api.clone());
        store.load_board(10).await.unwrap();
        (api, store)
    }

    fn ids(store: &BoardStore, status_id: StatusId) -> Vec<TaskId> {
        store
            .column(status_id)
            .map(|c| c.tasks.iter().map(|t| t.id).collect())
            .unwrap_or_default()
    }

    fn fields(value: Value) -> TaskFields {
        value.as_object().cloned().unwrap()
    }

    fn assert_exclusive(store: &BoardStore) {
        let mut seen = std::collections::HashSet::new();
        for column in store.columns() {
            for task in &column.tasks {
                assert!(seen.insert(task.id), "task {} appears twice", task.id);
            }
        }
    }

    // ── load ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_load_sorts_columns_and_seeds_statuses() {
        let api = Arc::new(MockApi::with_board(vec![Column::new(A, "Todo").with_tasks(vec![
            Task::new(3, A),
            Task::new(2, A).with_rank("b"),
            Task::new(1, A).with_rank("a"),
        ])]));
        let statuses = Arc::new(StatusStore::new(Arc::new(NoReference)));
        let store = BoardStore::new(api).with_status_store(statuses.clone());

        store.load_board(10).await.unwrap();
        assert_eq!(ids(&store, A), vec![1, 2, 3]);
        assert_eq!(store.project_id(), Some(10));
        assert!(!store.is_loading());
        assert_eq!(statuses.project_id(), Some(10));
        assert_eq!(statuses.get(A).map(|s| s.title), Some("Todo".into()));
    }

    struct NoReference;

    #[async_trait]
    impl crate::api::ReferenceApi for NoReference {
        async fn fetch_statuses(&self, _: i64) -> std::result::Result<Vec<Value>, ApiError> {
            Ok(Vec::new())
        }
        async fn fetch_project_users(&self, _: i64) -> std::result::Result<Vec<Value>, ApiError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_load_failure_keeps_previous_board() {
        let (api, store) = loaded(MockApi::with_board(two_columns())).await;
        let before = store.snapshot();

        api.fail_board.store(true, Ordering::SeqCst);
        let err = store.load_board(10).await.unwrap_err();
        assert!(matches!(err, BoardError::FetchFailed { .. }));
        assert_eq!(store.error().as_deref(), Some("Database unavailable"));
        assert!(!store.is_loading());
        assert_eq!(store.snapshot(), before);

        api.fail_board.store(false, Ordering::SeqCst);
        store.refresh().await.unwrap();
        assert!(store.error().is_none());
    }

    #[tokio::test]
    async fn test_load_without_project_is_empty_board() {
        let (api, store) = loaded(MockApi::with_board(two_columns())).await;
        store.load_board(0).await.unwrap();
        assert!(store.columns().is_empty());
        assert!(store.project_id().is_none());
        assert!(store.error().is_none());
        assert_eq!(api.call_count(), 1);
    }

    // ── create / update / delete ─────────────────────────────────────

    #[tokio::test]
    async fn test_create_inserts_returned_task() {
        let api = MockApi::with_board(vec![Column::new(A, "Todo")]);
        *api.created.lock().unwrap() = Some(Task::new(5, 0).with_rank("m"));
        let (_, store) = loaded(api).await;

        let created = store
            .create_task(10, A, fields(json!({"title": "New"})))
            .await
            .unwrap();
        assert_eq!(created.id, 5);
        assert_eq!(ids(&store, A), vec![5]);
        let cached = store.task(5).unwrap();
        assert_eq!(cached.status_id, A);
        assert_eq!(cached.title(), Some("New"));
        assert!(!store.is_saving());
    }

    #[tokio::test]
    async fn test_create_places_by_rank() {
        let api = MockApi::with_board(three_in_a());
        *api.created.lock().unwrap() = Some(Task::new(7, A).with_rank("c"));
        let (_, store) = loaded(api).await;

        store.create_task(10, A, TaskFields::new()).await.unwrap();
        assert_eq!(ids(&store, A), vec![1, 7, 2, 3]);
        assert!(store.column(A).unwrap().is_rank_ordered());
    }

    #[tokio::test]
    async fn test_create_failure_leaves_cache() {
        let (_, store) = loaded(MockApi {
            reject_writes: true,
            ..MockApi::with_board(two_columns())
        })
        .await;
        let before = store.snapshot();

        let err = store.create_task(10, A, TaskFields::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "Title is required");
        assert_eq!(store.error().as_deref(), Some("Title is required"));
        assert!(!store.is_saving());
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_update_in_place_merges_fields() {
        let (_, store) = loaded(MockApi::with_board(three_in_a())).await;

        store
            .update_task(2, fields(json!({"title": "Renamed"})))
            .await
            .unwrap();
        assert_eq!(ids(&store, A), vec![1, 2, 3]);
        let task = store.task(2).unwrap();
        assert_eq!(task.title(), Some("Renamed"));
        assert_eq!(task.fields["updatedAt"], "now");
        assert_eq!(task.rank.as_deref(), Some("d"));
    }

    #[tokio::test]
    async fn test_update_status_change_moves_column() {
        let (_, store) = loaded(MockApi::with_board(two_columns())).await;

        store
            .update_task(1, fields(json!({"statusId": B})))
            .await
            .unwrap();
        assert!(ids(&store, A).is_empty());
        assert_eq!(ids(&store, B), vec![1, 2]);
        assert_eq!(store.task(1).unwrap().status_id, B);
        assert_exclusive(&store);
    }

    #[tokio::test]
    async fn test_update_unknown_task_is_silent() {
        let (_, store) = loaded(MockApi::with_board(two_columns())).await;
        let before = store.snapshot();
        store.update_task(77, fields(json!({"title": "x"}))).await.unwrap();
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_update_failure_uses_fallback_message() {
        let (_, store) = loaded(MockApi {
            reject_writes: true,
            ..MockApi::with_board(two_columns())
        })
        .await;
        let err = store
            .update_task(1, fields(json!({"title": "x"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to update task");
    }

    #[tokio::test]
    async fn test_update_without_fields_is_rejected_locally() {
        let (api, store) = loaded(MockApi::with_board(two_columns())).await;
        let calls = api.call_count();

        let err = store.update_task(1, TaskFields::new()).await.unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
        assert_eq!(store.error().as_deref(), Some("Validation failed: no fields to update"));
        assert_eq!(api.call_count(), calls);
        assert!(!store.is_saving());
    }

    #[tokio::test]
    async fn test_create_without_project_is_rejected_locally() {
        let (api, store) = loaded(MockApi::with_board(two_columns())).await;
        let calls = api.call_count();
        let before = store.snapshot();

        let err = store
            .create_task(0, A, fields(json!({"title": "New"})))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
        assert_eq!(api.call_count(), calls);
        assert_eq!(store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_delete_removes_task() {
        let (_, store) = loaded(MockApi::with_board(vec![Column::new(A, "Todo").with_tasks(
            vec![Task::new(1, A).with_rank("a"), Task::new(2, A).with_rank("b")],
        )]))
        .await;

        store.delete_task(1).await.unwrap();
        assert_eq!(ids(&store, A), vec![2]);
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_task() {
        let (_, store) = loaded(MockApi {
            reject_writes: true,
            ..MockApi::with_board(two_columns())
        })
        .await;
        assert!(store.delete_task(1).await.is_err());
        assert_eq!(ids(&store, A), vec![1]);
    }

    // ── move ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_cross_column_move_to_head() {
        let (api, store) = loaded(MockApi::with_board(two_columns())).await;

        let outcome = store.move_task(1, A, B, Some(0)).await.unwrap();
        let MoveOutcome::Moved(moved) = outcome else {
            panic!("expected a committed move, got {outcome:?}");
        };
        assert_eq!(moved.status_id, B);
        let k1 = moved.rank.clone().unwrap();
        assert!(k1.as_str() < "m");

        assert!(ids(&store, A).is_empty());
        assert_eq!(ids(&store, B), vec![1, 2]);
        assert!(store.column(B).unwrap().is_rank_ordered());

        let moves = api.recorded_moves();
        assert_eq!(moves.len(), 1);
        assert_eq!(
            moves[0].1,
            MoveTaskRequest {
                status_id: B,
                left_task_rank: None,
                right_task_rank: Some("m".into()),
                rank: Some(k1),
            }
        );
        assert!(!store.is_saving());
    }

    #[tokio::test]
    async fn test_failed_move_rolls_back_exactly() {
        let (_, store) = loaded(MockApi {
            reject_moves: true,
            ..MockApi::with_board(two_columns())
        })
        .await;
        let before = store.snapshot();
        let mut events = store.subscribe();

        let err = store.move_task(1, A, B, Some(0)).await.unwrap_err();
        assert!(matches!(err, BoardError::CommitFailed { .. }));
        assert_eq!(err.to_string(), "Move rejected");
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.error().as_deref(), Some("Move rejected"));
        assert!(!store.is_saving());

        assert!(matches!(events.recv().await.unwrap(), BoardEvent::MoveApplied { .. }));
        assert_eq!(
            events.recv().await.unwrap(),
            BoardEvent::MoveRolledBack {
                task_id: 1,
                message: "Move rejected".into()
            }
        );
    }

    #[tokio::test]
    async fn test_same_slot_move_is_noop_without_network() {
        let (api, store) = loaded(MockApi::with_board(three_in_a())).await;
        let before = store.snapshot();
        let calls = api.call_count();

        assert_eq!(store.move_task(2, A, A, Some(1)).await.unwrap(), MoveOutcome::Unchanged);
        // Dropping just below itself is the same slot.
        assert_eq!(store.move_task(2, A, A, Some(2)).await.unwrap(), MoveOutcome::Unchanged);
        assert_eq!(store.move_task(3, A, A, None).await.unwrap(), MoveOutcome::Unchanged);

        assert_eq!(store.snapshot(), before);
        assert_eq!(api.call_count(), calls);
    }

    #[tokio::test]
    async fn test_same_column_move_down() {
        let (api, store) = loaded(MockApi::with_board(three_in_a())).await;

        store.move_task(1, A, A, Some(3)).await.unwrap();
        assert_eq!(ids(&store, A), vec![2, 3, 1]);
        assert!(store.column(A).unwrap().is_rank_ordered());

        let request = &api.recorded_moves()[0].1;
        assert_eq!(request.left_task_rank.as_deref(), Some("f"));
        assert_eq!(request.right_task_rank, None);
    }

    #[tokio::test]
    async fn test_same_column_move_up_between_neighbours() {
        let (_, store) = loaded(MockApi::with_board(three_in_a())).await;

        store.move_task(3, A, A, Some(1)).await.unwrap();
        assert_eq!(ids(&store, A), vec![1, 3, 2]);
        let rank = store.task(3).unwrap().rank.unwrap();
        assert!("b" < rank.as_str() && rank.as_str() < "d");
    }

    #[tokio::test]
    async fn test_move_with_missing_column_or_task_is_skipped() {
        let (api, store) = loaded(MockApi::with_board(two_columns())).await;
        let calls = api.call_count();

        assert_eq!(store.move_task(1, A, 42, Some(0)).await.unwrap(), MoveOutcome::Skipped);
        assert_eq!(store.move_task(1, 42, B, Some(0)).await.unwrap(), MoveOutcome::Skipped);
        assert_eq!(store.move_task(2, A, B, Some(0)).await.unwrap(), MoveOutcome::Skipped);
        assert_eq!(api.call_count(), calls);
    }

    #[tokio::test]
    async fn test_move_hydrates_missing_neighbour_rank() {
        let api = MockApi::with_board(vec![
            Column::new(A, "Todo").with_tasks(vec![Task::new(1, A).with_rank("m")]),
            Column::new(B, "Done").with_tasks(vec![Task::new(2, B)]),
        ]);
        api.tasks
            .lock()
            .unwrap()
            .insert(2, Task::new(2, B).with_rank("t"));
        let (api, store) = loaded(api).await;

        store.move_task(1, A, B, Some(0)).await.unwrap();
        let request = &api.recorded_moves()[0].1;
        assert_eq!(request.right_task_rank.as_deref(), Some("t"));
        assert!(request.rank.as_deref().unwrap() < "t");
        assert_eq!(store.task(2).unwrap().rank.as_deref(), Some("t"));
    }

    #[tokio::test]
    async fn test_hydration_failure_rolls_back_without_commit() {
        let (api, store) = loaded(MockApi {
            reject_fetch_task: true,
            ..MockApi::with_board(vec![
                Column::new(A, "Todo").with_tasks(vec![Task::new(1, A).with_rank("m")]),
                Column::new(B, "Done").with_tasks(vec![Task::new(2, B)]),
            ])
        })
        .await;
        let before = store.snapshot();

        let err = store.move_task(1, A, B, Some(0)).await.unwrap_err();
        assert_eq!(err.to_string(), "Lookup failed");
        assert_eq!(store.snapshot(), before);
        assert!(api.recorded_moves().is_empty());
    }

    #[tokio::test]
    async fn test_move_adopts_server_rank() {
        let api = MockApi::with_board(two_columns());
        *api.move_response_rank.lock().unwrap() = Some("a5".into());
        let (_, store) = loaded(api).await;

        store.move_task(1, A, B, None).await.unwrap();
        assert_eq!(store.task(1).unwrap().rank.as_deref(), Some("a5"));
        assert_eq!(ids(&store, B), vec![1, 2]);
        assert!(store.column(B).unwrap().is_rank_ordered());
    }

    #[tokio::test]
    async fn test_move_between_equal_ranks_defers_to_server() {
        let api = MockApi::with_board(vec![
            Column::new(A, "Todo").with_tasks(vec![Task::new(1, A).with_rank("z")]),
            Column::new(B, "Done").with_tasks(vec![
                Task::new(2, B).with_rank("m"),
                Task::new(3, B).with_rank("m"),
            ]),
        ]);
        let (api, store) = loaded(api).await;

        store.move_task(1, A, B, Some(1)).await.unwrap();
        let request = &api.recorded_moves()[0].1;
        assert_eq!(request.left_task_rank.as_deref(), Some("m"));
        assert_eq!(request.right_task_rank.as_deref(), Some("m"));
        assert!(request.rank.is_none());
        // The stale "z" from column A must not survive between two "m"s.
        assert!(store.task(1).unwrap().rank.is_none());
        assert_eq!(ids(&store, B), vec![2, 3, 1]);
        assert!(store.column(B).unwrap().is_rank_ordered());
    }

    #[tokio::test]
    async fn test_move_below_unranked_task_stays_unranked() {
        let api = MockApi::with_board(vec![
            Column::new(A, "Todo").with_tasks(vec![Task::new(1, A).with_rank("t")]),
            Column::new(B, "Done").with_tasks(vec![
                Task::new(2, B).with_rank("m"),
                Task::new(3, B),
            ]),
        ]);
        // The lookup confirms task 3 has no rank.
        api.tasks.lock().unwrap().insert(3, Task::new(3, B));
        let (api, store) = loaded(api).await;

        store.move_task(1, A, B, None).await.unwrap();

        let request = &api.recorded_moves()[0].1;
        assert!(request.left_task_rank.is_none());
        assert!(request.rank.is_none());
        assert!(store.task(1).unwrap().rank.is_none());
        assert_eq!(ids(&store, B), vec![2, 1, 3]);
        assert!(store.column(B).unwrap().is_rank_ordered());

        // A reload sorts the column the same way.
        let mut reloaded = store.snapshot();
        reloaded.sort_by_rank();
        assert_eq!(reloaded, store.snapshot());
    }

    #[tokio::test]
    async fn test_move_above_unranked_tail_ranks_after_lower_bound() {
        let api = Arc::new(MockApi::with_board(vec![
            Column::new(A, "Todo").with_tasks(vec![Task::new(1, A).with_rank("b")]),
            Column::new(B, "Done").with_tasks(vec![
                Task::new(2, B).with_rank("m"),
                Task::new(3, B),
            ]),
        ]));
        let store = BoardStore::with_options(
            api.clone(),
            BoardOptions {
                serialize_mutations: false,
                hydrate_missing_ranks: false,
            },
        );
        store.load_board(10).await.unwrap();
        let calls = api.call_count();

        store.move_task(1, A, B, Some(1)).await.unwrap();

        let rank = store.task(1).unwrap().rank.unwrap();
        assert!(rank.as_str() > "m");
        assert_eq!(ids(&store, B), vec![2, 1, 3]);
        assert!(store.column(B).unwrap().is_rank_ordered());
        // Only the move itself; the unranked neighbour was not looked up.
        assert_eq!(api.call_count(), calls + 1);
    }

    #[tokio::test]
    async fn test_repeated_moves_keep_invariants() {
        let (_, store) = loaded(MockApi::with_board(three_in_a())).await;

        for _ in 0..20 {
            store.move_task(1, A, B, Some(0)).await.unwrap();
            store.move_task(1, B, A, Some(0)).await.unwrap();
            store.move_task(3, A, A, Some(0)).await.unwrap();
        }
        assert_exclusive(&store);
        assert!(store.column(A).unwrap().is_rank_ordered());
        assert_eq!(store.snapshot().task_count(), 3);
    }

    #[tokio::test]
    async fn test_serialized_mutations_complete_in_order() {
        let api = Arc::new(MockApi::with_board(three_in_a()));
        let store = Arc::new(BoardStore::with_options(
            api.clone(),
            BoardOptions {
                serialize_mutations: true,
                hydrate_missing_ranks: true,
            },
        ));
        store.load_board(10).await.unwrap();

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.move_task(1, A, B, None).await })
        };
        let second = {
            let store = store.clone();
            tokio::spawn(async move { store.move_task(2, A, B, None).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_exclusive(&store);
        assert_eq!(store.column(B).unwrap().tasks.len(), 2);
        assert!(store.column(B).unwrap().is_rank_ordered());
        assert_eq!(api.recorded_moves().len(), 2);
    }

    // ── local reorder and modal ──────────────────────────────────────

    #[tokio::test]
    async fn test_reorder_locally_has_no_remote_effect() {
        let (api, store) = loaded(MockApi::with_board(three_in_a())).await;
        let calls = api.call_count();

        assert!(store.reorder_task_locally(A, 1, Some(2)));
        assert_eq!(ids(&store, A), vec![2, 1, 3]);
        assert!(!store.reorder_task_locally(A, 1, Some(1)));
        assert_eq!(api.call_count(), calls);
    }

    #[tokio::test]
    async fn test_modal_state_round_trip() {
        let (_, store) = loaded(MockApi::with_board(two_columns())).await;
        store.open_create_modal(B);
        assert!(store.modal().create_open);
        store.open_detail_modal(store.task(1).unwrap());
        assert!(store.modal().detail_open);
        assert!(!store.modal().create_open);
        store.close_modals();
        assert!(!store.modal().is_open());
    }
}
