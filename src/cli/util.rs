//! CLI Common Utilities
//!
//! Configuration loading and output path helpers shared by command handlers.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::config::{Config, ConfigLoader, OutputFormat};
use crate::types::Result;

/// Load the effective configuration.
///
/// An explicit `--config` file replaces the global/project discovery chain.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// `--format` flag, falling back to `[output] format`
pub fn resolve_format(flag: Option<OutputFormat>, config: &Config) -> OutputFormat {
    flag.unwrap_or(config.output.format)
}

/// Sibling path for the agent report: `out/report.json` -> `out/report_agents.json`
pub fn agents_report_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.file_stem().unwrap_or_default());
    name.push("_agents");
    if let Some(ext) = output.extension() {
        name.push(".");
        name.push(ext);
    }
    output.with_file_name(name)
}
