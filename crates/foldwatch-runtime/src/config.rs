use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use foldwatch_types::ClientIdentity;
use serde::{Deserialize, Serialize};

/// Resolve the data directory path based on priority:
/// 1. Explicit path (with tilde expansion)
/// 2. FOLDWATCH_PATH environment variable (with tilde expansion)
/// 3. XDG data directory
/// 4. ~/.foldwatch (fallback for systems without XDG)
pub fn resolve_data_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("FOLDWATCH_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("foldwatch"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".foldwatch"));
    }

    bail!("could not determine data path: no HOME directory or XDG data directory found")
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

fn default_sweep_interval() -> u64 {
    900
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Clients to monitor, keyed by their (unique) names.
    #[serde(default)]
    pub clients: Vec<ClientIdentity>,
    /// Relax the Hung heuristic for cores that checkpoint without progress.
    #[serde(default)]
    pub allow_running_async: bool,
    /// Seconds between automatic full sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
            allow_running_async: false,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(resolve_data_path(None)?.join("config.toml"))
    }

    pub fn history_path() -> Result<PathBuf> {
        Ok(resolve_data_path(None)?.join("history.db"))
    }

    pub fn query_path() -> Result<PathBuf> {
        Ok(resolve_data_path(None)?.join("queries.json"))
    }

    pub fn client(&self, name: &str) -> Option<&ClientIdentity> {
        self.clients.iter().find(|c| c.name == name)
    }
}
