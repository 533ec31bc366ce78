//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module          | Commands handled                                   |
//! |-----------------|-----------------------------------------------------|
//! | `board`         | `Board`                                            |
//! | `task`          | `Create`, `Update`, `Delete`, `Move`               |
//! | `reference`     | `Statuses`, `Users`, `Sprints`                     |
//! | `project`       | `Projects`, `Wiki`                                 |
//! | `config`        | `Config`                                           |

pub mod board;
pub mod config;
pub mod project;
pub mod reference;
pub mod task;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;

use taskflow::api::HttpApi;
use taskflow::config::{CliOverrides, LogFormat, TaskflowConfig};
use taskflow::logging::{self, LogOptions};
use taskflow::session::Session;

use crate::Cli;

pub use board::cmd_board;
pub use config::cmd_config;
pub use project::{cmd_projects, cmd_wiki};
pub use reference::{cmd_sprints, cmd_statuses, cmd_users};
pub use task::{cmd_create, cmd_delete, cmd_move, cmd_update};

pub fn load_config(cli: &Cli, project_dir: &Path) -> Result<TaskflowConfig> {
    let overrides = CliOverrides {
        api_base: cli.api_base.clone(),
        token: cli.token.clone(),
        serialize_mutations: cli.serialize_mutations.then_some(true),
    };
    TaskflowConfig::load(project_dir, &overrides)
}

pub fn init_logging(cli: &Cli, config: &TaskflowConfig) -> Result<Option<WorkerGuard>> {
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        config.toml.logging.format
    };
    logging::init(&LogOptions {
        verbose: cli.verbose,
        format,
        file_dir: config.toml.logging.file.clone(),
        filter: config.toml.logging.filter.clone(),
    })
}

/// Authenticated HTTP client for one invocation.
pub(crate) fn connect(config: &TaskflowConfig) -> Result<Arc<HttpApi>> {
    let session = Session::with_token(config.token.clone());
    if !session.is_authenticated() {
        tracing::debug!("no token configured, requests are sent unauthenticated");
    }
    let api = HttpApi::new(&config.http_options(), session)
        .with_context(|| format!("Invalid API base URL '{}'", config.api_base))?;
    Ok(Arc::new(api))
}
