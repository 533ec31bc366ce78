//! Configuration for taskflow, read from `.taskflow/taskflow.toml`.
//!
//! Settings are layered file → environment → CLI. When the working
//! directory has no `.taskflow/taskflow.toml`, the per-user file under the
//! platform config dir (`~/.config/taskflow/taskflow.toml` on Linux) is
//! used instead.
//!
//! # Configuration File Format
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:3000"
//! timeout_secs = 30
//! fallback_without_leading_slash = true
//!
//! [board]
//! serialize_mutations = false
//! hydrate_missing_ranks = true
//!
//! [logging]
//! format = "pretty"
//! file = "/var/log/taskflow"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::http::HttpOptions;
use crate::board::BoardOptions;

pub const DEFAULT_API_BASE: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const CONFIG_DIR: &str = ".taskflow";
pub const CONFIG_FILE: &str = "taskflow.toml";

pub const ENV_API_BASE: &str = "TASKFLOW_API_BASE";
pub const ENV_TOKEN: &str = "TASKFLOW_TOKEN";
pub const ENV_SERIALIZE_MUTATIONS: &str = "TASKFLOW_SERIALIZE_MUTATIONS";

/// Remote API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Retry a 404 on the board and column-rank paths without the leading
    /// slash.
    #[serde(default = "default_true")]
    pub fallback_without_leading_slash: bool,
    /// Access token. Prefer `TASKFLOW_TOKEN` over committing one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_true() -> bool {
    true
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            fallback_without_leading_slash: true,
            token: None,
        }
    }
}

/// Board sync behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardSection {
    /// Run create/update/delete/move one at a time, in issue order.
    #[serde(default)]
    pub serialize_mutations: bool,
    /// Fetch a neighbour task individually when the board payload left its
    /// rank out.
    #[serde(default = "default_true")]
    pub hydrate_missing_ranks: bool,
}

impl Default for BoardSection {
    fn default() -> Self {
        Self {
            serialize_mutations: false,
            hydrate_missing_ranks: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Pretty => write!(f, "pretty"),
            LogFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub format: LogFormat,
    /// Directory for a daily rolling log file, in addition to stderr.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// `EnvFilter` directive used when `TASKFLOW_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// The complete taskflow.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskflowToml {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub board: BoardSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl TaskflowToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse taskflow.toml")
    }

    /// Load `<config_dir>/taskflow.toml`, or defaults when it doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize taskflow.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match reqwest::Url::parse(&self.api.base_url) {
            Ok(url) if !matches!(url.scheme(), "http" | "https") => warnings.push(format!(
                "api.base_url '{}' should use http or https, not '{}'",
                self.api.base_url,
                url.scheme()
            )),
            Ok(_) => {}
            Err(e) => warnings.push(format!(
                "api.base_url '{}' is not a valid URL: {}",
                self.api.base_url, e
            )),
        }

        if self.api.timeout_secs == 0 {
            warnings.push("api.timeout_secs is 0; every request will time out".to_string());
        }

        if self.api.token.is_some() {
            warnings.push(format!(
                "api.token is stored in plain text; prefer the {} environment variable",
                ENV_TOKEN
            ));
        }

        warnings
    }
}

/// Values given on the command line. `None` defers to lower layers.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_base: Option<String>,
    pub token: Option<String>,
    pub serialize_mutations: Option<bool>,
}

/// Where the active taskflow.toml was found, if anywhere.
pub fn discover_config_file(project_dir: &Path) -> Option<PathBuf> {
    let local = project_dir.join(CONFIG_DIR).join(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("taskflow").join(CONFIG_FILE))
        .filter(|path| path.exists())
}

/// Fully resolved settings for one CLI invocation.
#[derive(Debug, Clone)]
pub struct TaskflowConfig {
    pub project_dir: PathBuf,
    /// File the settings were read from; `None` means built-in defaults.
    pub source: Option<PathBuf>,
    pub toml: TaskflowToml,
    pub api_base: String,
    pub token: Option<String>,
    pub serialize_mutations: bool,
}

impl TaskflowConfig {
    /// Load from disk and the process environment.
    pub fn load(project_dir: &Path, cli: &CliOverrides) -> Result<Self> {
        let source = discover_config_file(project_dir);
        let toml = match &source {
            Some(path) => TaskflowToml::load(path)?,
            None => TaskflowToml::default(),
        };
        Ok(Self::resolve(
            project_dir.to_path_buf(),
            source,
            toml,
            |key| std::env::var(key).ok(),
            cli,
        ))
    }

    /// Apply the environment and CLI layers on top of a parsed file.
    pub fn resolve(
        project_dir: PathBuf,
        source: Option<PathBuf>,
        toml: TaskflowToml,
        env: impl Fn(&str) -> Option<String>,
        cli: &CliOverrides,
    ) -> Self {
        let env_nonblank = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let api_base = cli
            .api_base
            .clone()
            .or_else(|| env_nonblank(ENV_API_BASE))
            .unwrap_or_else(|| toml.api.base_url.clone());

        let token = cli
            .token
            .clone()
            .or_else(|| env_nonblank(ENV_TOKEN))
            .or_else(|| toml.api.token.clone());

        let serialize_mutations = cli
            .serialize_mutations
            .or_else(|| env_nonblank(ENV_SERIALIZE_MUTATIONS).map(|v| parse_flag(&v)))
            .unwrap_or(toml.board.serialize_mutations);

        Self {
            project_dir,
            source,
            toml,
            api_base,
            token,
            serialize_mutations,
        }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.project_dir.join(CONFIG_DIR)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.toml.api.timeout_secs)
    }

    pub fn http_options(&self) -> HttpOptions {
        HttpOptions {
            base_url: self.api_base.clone(),
            timeout: self.timeout(),
            fallback_without_leading_slash: self.toml.api.fallback_without_leading_slash,
        }
    }

    pub fn board_options(&self) -> BoardOptions {
        BoardOptions {
            serialize_mutations: self.serialize_mutations,
            hydrate_missing_ranks: self.toml.board.hydrate_missing_ranks,
        }
    }

    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if self.api_base != self.toml.api.base_url
            && let Err(e) = reqwest::Url::parse(&self.api_base)
        {
            warnings.push(format!("API base '{}' is not a valid URL: {}", self.api_base, e));
        }
        warnings
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
