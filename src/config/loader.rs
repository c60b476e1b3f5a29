//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (~/.config/scr/config.toml)
//! 3. Project config (.scr/config.toml)
//! 4. Environment variables (SCR_CONFIG_* prefix, `__` separates section and key)
//!
//! The env prefix deliberately differs from the sandbox policy variables
//! (`SCR_NO_NETWORK`, `SCR_NO_FILE_WRITE`, `SCR_TRACE_MODE`).

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::env;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::types::Config;
use crate::types::{Result, ScrError};

pub const ENV_PREFIX: &str = "SCR_CONFIG_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Config: loading global config from {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path();
        if project_path.exists() {
            debug!("Config: loading project config from {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        Self::finish(figment)
    }

    /// Load defaults, then `path`, then environment variables
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(ScrError::Config(format!(
                "Config file does not exist: {}",
                path.display()
            )));
        }
        debug!("Config: loading {}", path.display());
        Self::finish(
            Figment::new()
                .merge(Serialized::defaults(Config::default()))
                .merge(Toml::file(path)),
        )
    }

    fn finish(figment: Figment) -> Result<Config> {
        // e.g. SCR_CONFIG_TRACER__TIMEOUT_SECS -> tracer.timeout_secs
        let config: Config = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true))
            .extract()
            .map_err(|e| ScrError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Get path to global config directory (~/.config/scr/)
    pub fn global_dir() -> Option<PathBuf> {
        env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                env::var("HOME")
                    .ok()
                    .map(|home| PathBuf::from(home).join(".config"))
            })
            .map(|p| p.join("scr"))
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        PathBuf::from(".scr/config.toml")
    }

    // =========================================================================
    // Rendering
    // =========================================================================

    pub fn render_toml(config: &Config) -> Result<String> {
        toml::to_string_pretty(config).map_err(|e| ScrError::Config(e.to_string()))
    }

    pub fn render_json(config: &Config) -> Result<String> {
        Ok(serde_json::to_string_pretty(config)?)
    }
}
