// Configuration loader
// Loads settings from $SYNTHLOOP_CONFIG or ~/.synthloop/config.toml

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::CONFIG_ENV_VAR;
use super::settings::Settings;

/// Resolve the settings file location without touching the filesystem
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::home_dir().map(|home| home.join(".synthloop").join("config.toml"))
}

/// Load settings, falling back to defaults when no file exists
pub fn load_settings() -> Result<Settings> {
    match config_path() {
        Some(path) if path.exists() => load_settings_from(&path),
        Some(path) => {
            tracing::info!(path = %path.display(), "No settings file found, using defaults");
            Ok(Settings::default())
        }
        None => {
            tracing::warn!("Could not determine home directory, using default settings");
            Ok(Settings::default())
        }
    }
}

/// Load and validate settings from an explicit TOML file
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;

    let settings: Settings = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

    settings
        .validate()
        .context("Configuration validation failed")?;

    tracing::debug!(
        path = %path.display(),
        sources = settings.sources.len(),
        "Loaded settings"
    );

    Ok(settings)
}
