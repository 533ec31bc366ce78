//! Reference lookups: `taskflow statuses|users|sprints`.

use anyhow::Result;
use console::style;

use taskflow::config::TaskflowConfig;
use taskflow::reference::{SprintStatus, SprintStore, StatusStore, UserStore};

use super::connect;

pub async fn cmd_statuses(config: &TaskflowConfig, project_id: i64) -> Result<()> {
    let store = StatusStore::new(connect(config)?);
    let statuses = store.load(project_id, false).await?;

    if statuses.is_empty() {
        println!("No statuses for project {}.", project_id);
    }
    for status in statuses {
        println!("{} {}", style(format!("{:>5}", status.id)).yellow(), status.title);
    }
    Ok(())
}

pub async fn cmd_users(config: &TaskflowConfig, project_id: i64, picker: bool) -> Result<()> {
    let store = UserStore::new(connect(config)?);
    let users = store.load(project_id, false).await?;

    if picker {
        for option in store.options(true) {
            let value = option.value.map_or_else(|| "-".to_string(), |v| v.to_string());
            println!("{} {}", style(format!("{:>5}", value)).yellow(), option.label);
        }
        return Ok(());
    }

    if users.is_empty() {
        println!("No members in project {}.", project_id);
    }
    for user in users {
        println!(
            "{} {:<3} {} {} {}",
            style(format!("{:>5}", user.user_id)).yellow(),
            user.initials(),
            user.name,
            style(user.email.as_deref().unwrap_or("")).dim(),
            style(format!("[{}]", user.role)).cyan()
        );
    }
    Ok(())
}

pub async fn cmd_sprints(config: &TaskflowConfig, project_id: i64) -> Result<()> {
    let store = SprintStore::new(connect(config)?);
    let sprints = store.fetch(project_id, false).await?;

    if sprints.is_empty() {
        println!("No sprints for project {}.", project_id);
    }
    for sprint in sprints {
        let label = match sprint.status {
            SprintStatus::Active => style(sprint.label()).green(),
            SprintStatus::Closed => style(sprint.label()).dim(),
            SprintStatus::Planned => style(sprint.label()),
        };
        let dates = match (&sprint.start_date, &sprint.end_date) {
            (Some(start), Some(end)) => format!("{} → {}", start, end),
            (Some(start), None) => format!("from {}", start),
            _ => String::new(),
        };
        println!("{} {}", label, style(dates).dim());
        if !sprint.description.is_empty() {
            println!("    {}", sprint.description);
        }
    }
    Ok(())
}
