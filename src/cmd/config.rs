//! Configuration view and validation commands: `taskflow config`.

use anyhow::Result;

use taskflow::config::{CONFIG_FILE, TaskflowConfig, TaskflowToml};

use super::super::ConfigCommands;

pub fn cmd_config(config: &TaskflowConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_dir().join(CONFIG_FILE);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Taskflow Configuration");
            println!("======================");
            println!();

            match &config.source {
                Some(path) => println!("Config file: {}", path.display()),
                None => {
                    println!("No taskflow.toml found at {}", config_path.display());
                    println!("Using default configuration.");
                }
            }
            println!();

            let toml = &config.toml;
            println!("[api]");
            println!("  base_url = \"{}\"", toml.api.base_url);
            println!("  timeout_secs = {}", toml.api.timeout_secs);
            println!(
                "  fallback_without_leading_slash = {}",
                toml.api.fallback_without_leading_slash
            );
            if toml.api.token.is_some() {
                println!("  token = <set>");
            }
            println!();

            println!("[board]");
            println!("  serialize_mutations = {}", toml.board.serialize_mutations);
            println!("  hydrate_missing_ranks = {}", toml.board.hydrate_missing_ranks);
            println!();

            println!("[logging]");
            println!("  format = \"{}\"", toml.logging.format);
            if let Some(file) = &toml.logging.file {
                println!("  file = \"{}\"", file.display());
            }
            if let Some(filter) = &toml.logging.filter {
                println!("  filter = \"{}\"", filter);
            }
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  api_base = \"{}\"", config.api_base);
            println!(
                "  token = {}",
                if config.token.is_some() { "<set>" } else { "<none>" }
            );
            println!("  serialize_mutations = {}", config.serialize_mutations);
            println!();

            if config.source.is_none() {
                println!("Run 'taskflow config init' to create a taskflow.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if config.source.is_none() {
                println!("No taskflow.toml found. Using defaults (valid).");
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("taskflow.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            TaskflowToml::default().save(&config_path)?;

            println!("Created taskflow.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [api] base_url, timeout_secs");
            println!("  - [board] serialize_mutations, hydrate_missing_ranks");
            println!("  - [logging] format, file, filter");
            println!();
        }
    }

    Ok(())
}
