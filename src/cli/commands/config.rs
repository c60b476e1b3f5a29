//! Config Command
//!
//! Inspect the effective configuration.
//!
//! Usage:
//!   scr config show [-f toml|json]
//!   scr config path

use crate::config::{Config, ConfigLoader, ENV_PREFIX};
use crate::types::{Result, ScrError};

/// Render the merged configuration
pub fn render(config: &Config, format: &str) -> Result<String> {
    match format.to_lowercase().as_str() {
        "toml" => ConfigLoader::render_toml(config),
        "json" => ConfigLoader::render_json(config),
        other => Err(ScrError::Config(format!(
            "Invalid format '{}'. Valid values: toml, json",
            other
        ))),
    }
}

/// Show configuration
pub fn show(config: &Config, format: &str) -> Result<()> {
    println!("{}", render(config, format)?);
    Ok(())
}

/// Show configuration file paths
pub fn path() -> Result<()> {
    let status = |exists: bool| if exists { "found" } else { "not found" };

    match ConfigLoader::global_config_path() {
        Some(global) => println!(
            "Global:  {} ({})",
            global.display(),
            status(global.exists())
        ),
        None => println!("Global:  cannot determine config directory"),
    }

    let project = ConfigLoader::project_config_path();
    println!("Project: {} ({})", project.display(), status(project.exists()));
    println!("Env:     {}<SECTION>__<KEY>", ENV_PREFIX);
    Ok(())
}
