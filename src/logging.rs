//! tracing subscriber setup for the CLI.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "TASKFLOW_LOG";

const LOG_FILE_PREFIX: &str = "taskflow.log";

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub verbose: bool,
    pub format: LogFormat,
    /// Directory for the daily rolling file.
    pub file_dir: Option<PathBuf>,
    /// Directive used when `TASKFLOW_LOG` is unset.
    pub filter: Option<String>,
}

pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "taskflow=debug,info" } else { "warn" }
}

/// Build the filter: `TASKFLOW_LOG` wins, then the configured directive,
/// then the verbosity default.
pub fn build_filter(env_value: Option<String>, options: &LogOptions) -> Result<EnvFilter> {
    let directive = env_value
        .filter(|v| !v.trim().is_empty())
        .or_else(|| options.filter.clone())
        .unwrap_or_else(|| default_directive(options.verbose).to_string());
    EnvFilter::try_new(&directive).with_context(|| format!("Invalid log filter '{}'", directive))
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean.
///
/// Keep the returned guard alive for the life of the process when a log
/// file is configured, or buffered lines are lost.
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(std::env::var(LOG_ENV).ok(), options)?;

    let (file_layer, guard) = match &options.file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let installed = match options.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };
    installed.context("Failed to install tracing subscriber")?;

    Ok(guard)
}
