//! Depot configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux/macOS: `~/.config/chunkferry/depot.toml`
//! - Windows: `%APPDATA%/chunkferry/depot.toml`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Depot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket server port (0 = auto-assign).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root directory for chunk and final-file storage.
    #[serde(default = "default_storage_root")]
    pub storage_root: String,

    /// Re-hash assembled files against the claimed content hash.
    #[serde(default = "default_true")]
    pub verify_digest: bool,

    /// Seconds between stale-upload sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Idle seconds after which a partial upload is considered abandoned.
    #[serde(default = "default_sweep_ttl")]
    pub sweep_ttl_secs: u64,
}

fn default_port() -> u16 {
    9440
}

fn default_storage_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    format!("{home}/.local/share/chunkferry")
}

fn default_true() -> bool {
    true
}

fn default_sweep_interval() -> u64 {
    600
}

fn default_sweep_ttl() -> u64 {
    24 * 60 * 60
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            storage_root: default_storage_root(),
            verify_digest: default_true(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_ttl_secs: default_sweep_ttl(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        // Restrict permissions on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(windows)]
    {
        let appdata = std::env::var("APPDATA")?;
        Ok(PathBuf::from(appdata)
            .join("chunkferry")
            .join("depot.toml"))
    }
    #[cfg(not(windows))]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("chunkferry")
            .join("depot.toml"))
    }
}
