//! Task mutations: `taskflow create|update|delete|move`.

use anyhow::{Result, bail};
use console::style;
use serde_json::{Value, json};

use taskflow::api::TaskFields;
use taskflow::board::{BoardStore, MoveOutcome};
use taskflow::config::TaskflowConfig;

use super::board::task_line;
use super::connect;

fn store(config: &TaskflowConfig) -> Result<BoardStore> {
    Ok(BoardStore::with_options(
        connect(config)?,
        config.board_options(),
    ))
}

pub async fn cmd_create(
    config: &TaskflowConfig,
    project_id: i64,
    status_id: i64,
    title: &str,
    description: Option<&str>,
    assignee: Option<i64>,
) -> Result<()> {
    if title.trim().is_empty() {
        bail!("Task title cannot be empty");
    }

    let mut fields = TaskFields::new();
    fields.insert("title".to_string(), json!(title));
    if let Some(description) = description {
        fields.insert("description".to_string(), json!(description));
    }
    if let Some(assignee) = assignee {
        fields.insert("assigneeId".to_string(), json!(assignee));
    }

    let task = store(config)?
        .create_task(project_id, status_id, fields)
        .await?;
    println!("{} {}", style("Created").green(), task_line(&task));
    Ok(())
}

pub async fn cmd_update(
    config: &TaskflowConfig,
    task_id: i64,
    title: Option<&str>,
    status_id: Option<i64>,
    description: Option<&str>,
) -> Result<()> {
    let mut fields = TaskFields::new();
    if let Some(title) = title {
        fields.insert("title".to_string(), json!(title));
    }
    if let Some(status_id) = status_id {
        fields.insert("statusId".to_string(), json!(status_id));
    }
    if let Some(description) = description {
        fields.insert("description".to_string(), Value::String(description.to_string()));
    }
    if fields.is_empty() {
        bail!("Nothing to update; pass --title, --status or --description");
    }

    let task = store(config)?.update_task(task_id, fields).await?;
    println!("{} {}", style("Updated").green(), task_line(&task));
    Ok(())
}

pub async fn cmd_delete(config: &TaskflowConfig, task_id: i64) -> Result<()> {
    store(config)?.delete_task(task_id).await?;
    println!("{} task {}", style("Deleted").green(), task_id);
    Ok(())
}

/// Load the board so neighbour ranks are known, then move.
pub async fn cmd_move(
    config: &TaskflowConfig,
    project_id: i64,
    task_id: i64,
    from: i64,
    to: i64,
    index: Option<usize>,
) -> Result<()> {
    let store = store(config)?;
    store.load_board(project_id).await?;

    match store.move_task(task_id, from, to, index).await? {
        MoveOutcome::Moved(task) => {
            println!("{} {}", style("Moved").green(), task_line(&task));
        }
        MoveOutcome::Unchanged => {
            println!("Task {} is already at that position.", task_id);
        }
        MoveOutcome::Skipped => {
            println!(
                "{} task {} is not in column {}, or column {} is not on the board",
                style("Skipped:").yellow(),
                task_id,
                from,
                to
            );
        }
    }
    Ok(())
}
