//! In-memory board cache: columns of tasks keyed by status id.
//!
//! Every primitive here is synchronous and never touches the network. The
//! sync layer above owns the only writer.

use serde::{Deserialize, Serialize};

use crate::models::{Column, Status, StatusId, Task, TaskId, rank_order};

/// Column state captured before an optimistic mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSnapshot {
    columns: Vec<Column>,
}

impl ColumnSnapshot {
    pub fn status_ids(&self) -> impl Iterator<Item = StatusId> + '_ {
        self.columns.iter().map(|c| c.status_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardCache {
    columns: Vec<Column>,
}

impl BoardCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Self {
        let mut cache = Self::new();
        cache.replace(columns);
        cache
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.columns.iter().map(|c| c.tasks.len()).sum()
    }

    pub fn find_column(&self, status_id: StatusId) -> Option<&Column> {
        self.columns.iter().find(|c| c.status_id == status_id)
    }

    fn find_column_mut(&mut self, status_id: StatusId) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.status_id == status_id)
    }

    /// First column holding `task_id`, with the task's index in it.
    pub fn locate_task(&self, task_id: TaskId) -> Option<(StatusId, usize)> {
        self.columns
            .iter()
            .find_map(|c| c.position_of(task_id).map(|idx| (c.status_id, idx)))
    }

    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        let (status_id, idx) = self.locate_task(task_id)?;
        self.find_column(status_id).map(|c| &c.tasks[idx])
    }

    pub fn task_mut(&mut self, task_id: TaskId) -> Option<&mut Task> {
        let (status_id, idx) = self.locate_task(task_id)?;
        self.find_column_mut(status_id).map(|c| &mut c.tasks[idx])
    }

    /// Remove a task from one column, returning it with its former index.
    pub fn remove_task(&mut self, status_id: StatusId, task_id: TaskId) -> Option<(Task, usize)> {
        let column = self.find_column_mut(status_id)?;
        let idx = column.position_of(task_id)?;
        Some((column.tasks.remove(idx), idx))
    }

    /// Insert a task into a column. `None` appends; an index past the end is
    /// clamped. The task's status id is stamped to the column's.
    ///
    /// Returns the index the task landed at, or `None` when the column does
    /// not exist (the task is dropped).
    pub fn insert_task(
        &mut self,
        status_id: StatusId,
        mut task: Task,
        index: Option<usize>,
    ) -> Option<usize> {
        let column = self.find_column_mut(status_id)?;
        let idx = index.map_or(column.tasks.len(), |i| i.min(column.tasks.len()));
        task.status_id = status_id;
        column.tasks.insert(idx, task);
        Some(idx)
    }

    /// Insert at the position the rank order dictates.
    pub fn insert_ranked(&mut self, status_id: StatusId, task: Task) -> Option<usize> {
        let column = self.find_column(status_id)?;
        let idx = column
            .tasks
            .partition_point(|existing| rank_order(existing, &task).is_lt());
        self.insert_task(status_id, task, Some(idx))
    }

    /// Remove a task from whichever column holds it.
    pub fn remove_anywhere(&mut self, task_id: TaskId) -> Option<Task> {
        let (status_id, _) = self.locate_task(task_id)?;
        self.remove_task(status_id, task_id).map(|(task, _)| task)
    }

    /// Swap in a freshly fetched board. Each column is sorted by rank and
    /// every task stamped with its column's status id.
    pub fn replace(&mut self, columns: Vec<Column>) {
        self.columns = columns;
        for column in &mut self.columns {
            for task in &mut column.tasks {
                task.status_id = column.status_id;
            }
        }
        self.sort_by_rank();
    }

    pub fn clear(&mut self) {
        self.columns.clear();
    }

    pub fn sort_by_rank(&mut self) {
        for column in &mut self.columns {
            column.tasks.sort_by(rank_order);
        }
    }

    pub fn statuses(&self) -> Vec<Status> {
        self.columns.iter().map(Status::from).collect()
    }

    /// Capture the given columns (deduplicated, unknown ids skipped).
    pub fn snapshot_columns(&self, status_ids: &[StatusId]) -> ColumnSnapshot {
        let mut columns: Vec<Column> = Vec::new();
        for &id in status_ids {
            if columns.iter().any(|c| c.status_id == id) {
                continue;
            }
            if let Some(column) = self.find_column(id) {
                columns.push(column.clone());
            }
        }
        ColumnSnapshot { columns }
    }

    /// Put captured columns back exactly as they were.
    pub fn restore_columns(&mut self, snapshot: ColumnSnapshot) {
        for saved in snapshot.columns {
            if let Some(column) = self.find_column_mut(saved.status_id) {
                *column = saved;
            }
        }
    }

    /// Same-column reorder with no remote side effects.
    ///
    /// `to_index` is interpreted against the list before removal, the way a
    /// drop target reports it. Returns `false` when nothing moved.
    pub fn reorder_within(&mut self, status_id: StatusId, task_id: TaskId, to_index: Option<usize>) -> bool {
        let Some(original) = self.find_column(status_id).and_then(|c| c.position_of(task_id)) else {
            return false;
        };
        let target = adjusted_index(original, to_index);
        if target == Some(original) {
            return false;
        }
        let Some((task, _)) = self.remove_task(status_id, task_id) else {
            return false;
        };
        self.insert_task(status_id, task, target);
        true
    }

    /// Re-place a task whose rank changed if it no longer fits between its
    /// neighbours. Returns the task's index when it was moved.
    pub fn settle(&mut self, status_id: StatusId, task_id: TaskId) -> Option<usize> {
        if self.find_column(status_id)?.is_rank_ordered() {
            return None;
        }
        let (task, _) = self.remove_task(status_id, task_id)?;
        self.insert_ranked(status_id, task)
    }
}

/// Account for the removal shift when a task moves down its own column.
pub fn adjusted_index(original: usize, to_index: Option<usize>) -> Option<usize> {
    to_index.map(|i| if i > original { i - 1 } else { i })
}
