use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};

/// Runtime configuration for the shared terminal session.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
    /// Shell binary override. `None` resolves via `$SHELL` and platform
    /// fallbacks.
    pub shell: Option<String>,
    /// Initial PTY width in columns.
    pub cols: u16,
    /// Initial PTY height in rows.
    pub rows: u16,
    /// Working directory for the shell. `None` uses the invoking user's
    /// home directory.
    pub workdir: Option<PathBuf>,
    /// Broadcast channel capacity for observer fan-out.
    pub broadcast_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            cols: 80,
            rows: 30,
            workdir: None,
            broadcast_capacity: crate::broadcast::DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::home_dir()
            .context("No home directory")?
            .join(".termhub");
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    pub fn load() -> Result<Self> {
        let config_path = Self::config_dir()?.join("config.json");
        if config_path.exists() {
            let content = fs::read_to_string(&config_path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            let default = Self::default();
            default.save()?;
            Ok(default)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_dir()?.join("config.json");
        fs::write(&config_path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Working directory to spawn the shell in: configured override,
    /// else home directory, else the current directory.
    #[must_use]
    pub fn resolved_workdir(&self) -> PathBuf {
        self.workdir
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}
