//! Operational settings.
//!
//! Settings live in an optional RON file found with the following precedence:
//! 1. `QREMOTE_CONFIG` environment variable
//! 2. ./qremote.config.ron (current working directory)
//! 3. /etc/qremote/qremote.config.ron (system-wide config)
//!
//! Without a file every setting takes its default. Routing itself is not
//! configured here; it comes from the control files under `control_root`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use qremote_common::control::DEFAULT_ROOT;
use qremote_delivery::{DnsConfig, SmtpTimeouts};
use serde::Deserialize;

pub const CONFIG_ENV: &str = "QREMOTE_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding `control/`
    pub control_root: PathBuf,
    pub timeouts: SmtpTimeouts,
    pub dns: DnsConfig,
    /// Log level, unless `LOG_LEVEL` says otherwise
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            control_root: PathBuf::from(DEFAULT_ROOT),
            timeouts: SmtpTimeouts::default(),
            dns: DnsConfig::default(),
            log_level: None,
        }
    }
}

impl Settings {
    /// Load the settings file, if there is one.
    ///
    /// # Errors
    ///
    /// Returns an error if `QREMOTE_CONFIG` names a missing file, or if the
    /// file found cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        match find_config_file()? {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    /// Prefer `root` over the configured control root when given.
    #[must_use]
    pub fn with_control_root(mut self, root: Option<PathBuf>) -> Self {
        if let Some(root) = root {
            self.control_root = root;
        }
        self
    }
}

fn find_config_file() -> anyhow::Result<Option<PathBuf>> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!("{CONFIG_ENV} points to non-existent file: {}", path.display());
    }

    Ok([
        PathBuf::from("./qremote.config.ron"),
        PathBuf::from("/etc/qremote/qremote.config.ron"),
    ]
    .into_iter()
    .find(|path| path.exists()))
}
