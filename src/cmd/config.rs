//! Configuration view and validation commands: `teamboard config`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use teamboard::config::{BoardConfig, CONFIG_DIR, CONFIG_FILE};

use super::super::ConfigCommands;

fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| Path::new(CONFIG_DIR).join(CONFIG_FILE))
}

/// `effective` is the config after file, env and flag layering.
pub fn cmd_config(
    effective: &BoardConfig,
    explicit: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let config_path = config_path(explicit);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Teamboard Configuration");
            println!("=======================");
            println!();

            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No teamboard.toml found at {}", config_path.display());
                println!("Run 'teamboard config init' to create one.");
            }
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("[server]");
            println!("  host = \"{}\"", effective.server.host);
            println!("  port = {}", effective.server.port);
            println!("  dev_mode = {}", effective.server.dev_mode);
            println!("[database]");
            println!("  path = \"{}\"", effective.database.path.display());
            println!("[permissions]");
            println!("  mode = \"{}\"", effective.permissions.mode);
            println!("[logging]");
            println!("  level = \"{}\"", effective.logging.level);
            println!("  format = \"{:?}\"", effective.logging.format);
            if let Some(dir) = &effective.logging.dir {
                println!("  dir = \"{}\"", dir.display());
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No teamboard.toml found. Using defaults.");
            }

            let warnings = effective.validate();
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
                println!("teamboard.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if let Some(parent) = config_path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create config directory {}", parent.display())
                })?;
            }

            BoardConfig::default().save(&config_path)?;

            println!("Created teamboard.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [server] host, port, dev_mode");
            println!("  - [permissions] mode (\"members\" or \"open\")");
            println!("  - [logging] level, format, dir");
            println!();
        }
    }

    Ok(())
}
