use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::{DEFAULT_FILE_NAME, DEFAULT_MAX_STORED};

pub const DEFAULT_SERVER_URL: &str = "https://librenews.io/api";
pub const DEFAULT_SOUND: &str = "DEFAULT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub notifications: NotificationsConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// LibreNews API endpoint. Changing it forgets every stored flash.
    pub url: String,
    /// Background refresh interval in seconds
    pub poll_interval_secs: u64,
    /// Give up on a fetch after this many seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Raise a desktop notification for each new flash.
    pub enabled: bool,
    /// Sound name passed to the notification server; "DEFAULT" = server default.
    pub sound: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Location of flashes.json. Unset = platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Number of seen flashes to remember
    pub max_stored: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url:                DEFAULT_SERVER_URL.into(),
            poll_interval_secs: 300,
            timeout_secs:       30,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true, sound: DEFAULT_SOUND.into() }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: None, max_stored: DEFAULT_MAX_STORED }
    }
}

// ── Load / Save ───────────────────────────────────────────────────────

impl Config {
    /// Load from `path` (or the default location).  A missing or unreadable
    /// file yields the defaults; on first run the defaults are written out.
    pub fn load(path: Option<&Path>) -> Self {
        Self::reload(path).unwrap_or_default()
    }

    /// Like [`load`](Config::load), but a file that exists and fails to
    /// parse yields `None` so a running process keeps what it has.
    pub fn reload(path: Option<&Path>) -> Option<Self> {
        let Some(path) = path.map(Path::to_path_buf).or_else(Self::config_path) else {
            return Some(Config::default());
        };
        match try_load(&path) {
            Ok(c) => Some(c),
            Err(_) if !path.exists() => {
                // Best-effort
                let _ = try_write_defaults(&path);
                Some(Config::default())
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                None
            }
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("librenews").join("config.toml"))
    }

    /// Where flashes.json lives.
    pub fn store_path(&self) -> PathBuf {
        self.storage.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .map(|p| p.join("librenews").join(DEFAULT_FILE_NAME))
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE_NAME))
        })
    }
}

fn try_load(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let cfg: Config = toml::from_str(&text)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(cfg)
}

fn try_write_defaults(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(&Config::default())?;
    fs::write(path, format!("# librenews-sync configuration\n# Generated on first run, edit freely\n\n{text}"))?;
    Ok(())
}
