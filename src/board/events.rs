//! Change notifications published by the board store.

use serde::Serialize;
use taskflow_common::{StatusId, TaskId};
use tokio::sync::broadcast;

pub const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BoardEvent {
    Loading {
        project_id: i64,
    },
    Loaded {
        project_id: i64,
        columns: usize,
        tasks: usize,
    },
    LoadFailed {
        project_id: i64,
        message: String,
    },
    TaskCreated {
        task_id: TaskId,
        status_id: StatusId,
    },
    TaskUpdated {
        task_id: TaskId,
        status_id: Option<StatusId>,
    },
    TaskDeleted {
        task_id: TaskId,
    },
    /// Applied locally, commit in flight.
    MoveApplied {
        task_id: TaskId,
        from_status_id: StatusId,
        to_status_id: StatusId,
        index: usize,
    },
    MoveCommitted {
        task_id: TaskId,
        status_id: StatusId,
        rank: Option<String>,
    },
    MoveRolledBack {
        task_id: TaskId,
        message: String,
    },
    Reordered {
        task_id: TaskId,
        status_id: StatusId,
    },
    CommitFailed {
        message: String,
    },
    ModalChanged,
    Cleared,
}

/// Publish to all subscribers. Having none is normal for a CLI run.
pub fn publish(tx: &broadcast::Sender<BoardEvent>, event: BoardEvent) {
    let _ = tx.send(event);
}
