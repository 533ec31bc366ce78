//! Project and wiki listings: `taskflow projects|wiki`.

use anyhow::Result;
use console::style;

use taskflow::config::TaskflowConfig;
use taskflow::reference::{ProjectStore, WikiStore};

use super::connect;

pub async fn cmd_projects(config: &TaskflowConfig) -> Result<()> {
    let store = ProjectStore::new(connect(config)?);
    let projects = store.list().await?;

    if projects.is_empty() {
        println!("No projects.");
    }
    for project in projects {
        println!("{} {}", style(format!("{:>5}", project.id)).yellow(), project.label());
        if !project.description.is_empty() {
            println!("      {}", style(&project.description).dim());
        }
    }
    Ok(())
}

/// List a project's wiki pages, or print one page in full.
pub async fn cmd_wiki(config: &TaskflowConfig, project_id: i64, page_id: Option<i64>) -> Result<()> {
    let store = WikiStore::new(connect(config)?);

    if let Some(page_id) = page_id {
        match store.page(page_id).await? {
            Some(page) => {
                println!("{}", style(&page.title).cyan().bold());
                if let Some(updated_at) = &page.updated_at {
                    println!("{}", style(format!("updated {}", updated_at)).dim());
                }
                println!();
                println!("{}", page.content);
            }
            None => println!("Wiki page {} not found.", page_id),
        }
        return Ok(());
    }

    let pages = store.load(project_id, false).await?;
    if pages.is_empty() {
        println!("No wiki pages for project {}.", project_id);
    }
    for page in pages {
        println!("{} {}", style(format!("{:>5}", page.id)).yellow(), page.title);
    }
    Ok(())
}
