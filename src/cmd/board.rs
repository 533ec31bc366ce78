//! Board listing: `taskflow board`.

use anyhow::{Context, Result};
use console::style;

use taskflow::board::BoardStore;
use taskflow::config::TaskflowConfig;
use taskflow_common::{Column, Task};

use super::connect;

pub async fn cmd_board(config: &TaskflowConfig, project_id: i64, json: bool) -> Result<()> {
    let api = connect(config)?;
    let store = BoardStore::with_options(api, config.board_options());
    store.load_board(project_id).await?;

    let columns = store.columns();
    if json {
        let out = serde_json::to_string_pretty(&columns).context("Failed to encode board")?;
        println!("{}", out);
        return Ok(());
    }

    if columns.is_empty() {
        println!("Board for project {} is empty.", project_id);
        return Ok(());
    }

    println!();
    for column in &columns {
        print_column(column);
    }
    Ok(())
}

fn print_column(column: &Column) {
    println!(
        "{} {}",
        style(&column.status_title).cyan().bold(),
        style(format!("#{} ({})", column.status_id, column.tasks.len())).dim()
    );
    if column.tasks.is_empty() {
        println!("  {}", style("(no tasks)").dim());
    }
    for task in &column.tasks {
        println!("  {}", task_line(task));
    }
    println!();
}

pub(crate) fn task_line(task: &Task) -> String {
    format!(
        "{} {} {}",
        style(format!("{:>5}", task.id)).yellow(),
        task.title().unwrap_or("(untitled)"),
        style(task.rank.as_deref().unwrap_or("-")).dim()
    )
}
