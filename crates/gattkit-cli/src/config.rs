//! Configuration file management.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use gattkit_core::SessionConfig;

use crate::cli::SessionArgs;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Profile used when `--profile` is not given
    #[serde(default)]
    pub profile: Option<PathBuf>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// Session timeouts and limits
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Get the config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gattkit")
            .join("config.toml")
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        let path = Self::path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        eprintln!("Warning: Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    eprintln!("Warning: Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = self.to_toml()?;
        fs::write(&path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

/// Resolve the profile path: explicit flag first, then config.
pub fn resolve_profile(profile: Option<PathBuf>, config: &Config) -> Option<PathBuf> {
    profile.or_else(|| config.profile.clone())
}

/// Merge command-line timeouts over the configured session settings.
pub fn resolve_session(args: &SessionArgs, config: &Config) -> Result<SessionConfig> {
    let mut session = config.session.clone();
    if let Some(secs) = args.open_timeout {
        session = session.open_timeout(seconds(secs)?);
    }
    if let Some(secs) = args.timeout {
        let timeout = seconds(secs)?;
        session = session
            .discovery_timeout(timeout)
            .read_timeout(timeout)
            .write_timeout(timeout);
    }
    session.validate().context("Invalid session settings")?;
    Ok(session)
}

fn seconds(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("Invalid timeout: {secs}s"))
}
