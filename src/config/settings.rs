//! Application settings loaded from lantern.toml
//!
//! Every section and key is optional. A missing file yields the defaults, so the bot runs
//! without any configuration beyond the Discord token.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::{env, path::Path, time::Duration};

/// Environment variable naming the settings file.
pub const CONFIG_PATH_ENV: &str = "LANTERN_CONFIG";

/// Settings file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "lantern.toml";

/// Configuration structure representing the entire lantern.toml file
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    /// `[di]` section
    pub di: DiSettings,
    /// `[bot]` section
    pub bot: BotSettings,
}

/// Dependency injection settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DiSettings {
    /// Turns container creation and parameter injection on or off
    pub enabled: bool,
}

impl Default for DiSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Discord bot settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BotSettings {
    /// Prefix for prefix commands
    pub prefix: String,
    /// Upper bound on a single command execution, in seconds
    pub execution_timeout_secs: Option<u64>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            prefix: "!".to_string(),
            execution_timeout_secs: None,
        }
    }
}

impl Settings {
    /// Whether dependency injection is on, after applying the environment override.
    #[must_use]
    pub fn di_enabled(&self) -> bool {
        self.di.enabled && !super::di_disabled_by_env()
    }

    /// The command execution time limit, if one is configured.
    #[must_use]
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.bot.execution_timeout_secs.map(Duration::from_secs)
    }
}

/// Parses settings from TOML text.
///
/// # Errors
/// Returns an error if the TOML syntax is invalid or a key has the wrong type.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    toml::from_str(contents).map_err(|e| Error::Config(format!("Failed to parse settings: {e}")))
}

/// Loads settings from a TOML file, falling back to defaults if the file does not exist.
///
/// # Errors
/// Returns [`Error::Io`] if the file exists but cannot be read, and [`Error::Config`] if it
/// cannot be parsed.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path_ref = path.as_ref();
    tracing::debug!("Attempting to load settings from: {:?}", path_ref);

    if !path_ref.exists() {
        tracing::info!("No settings file at {:?}, using defaults", path_ref);
        return Ok(Settings::default());
    }

    let contents = std::fs::read_to_string(path_ref)
        .inspect_err(|e| tracing::error!("Failed to read settings file {:?}: {}", path_ref, e))?;
    parse_settings(&contents)
}

/// Loads settings from the file named by [`CONFIG_PATH_ENV`], or from [`DEFAULT_CONFIG_PATH`].
///
/// # Errors
/// Returns an error if the settings file exists but cannot be read or parsed.
pub fn load_app_settings() -> Result<Settings> {
    let path = env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_settings(&path)
        .inspect(|settings| tracing::info!(path = %path, di_enabled = settings.di_enabled(), "Loaded settings"))
        .inspect_err(|e| tracing::error!("Failed to load settings from {}: {}", path, e))
}
