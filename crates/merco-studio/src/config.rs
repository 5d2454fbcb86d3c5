//! Studio configuration and XDG paths.
//!
//! | Purpose | XDG Variable | studio Path |
//! |---------|--------------|-------------|
//! | Config | `$XDG_CONFIG_HOME` | `$XDG_CONFIG_HOME/merco/studio.toml` |
//! | History | `$XDG_DATA_HOME` | `$XDG_DATA_HOME/merco/studio_history.txt` |
//!
//! Every config field is optional:
//!
//! ```toml
//! server_url = "http://127.0.0.1:3000"
//! autosave = true
//! autosave_ms = 2000
//! timeout_ms = 10000
//! ```
//!
//! `MERCO_SERVER_URL` overrides `server_url`; `--server` overrides both.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::Deserialize;

use merco_session::SessionConfig;

/// Environment variable overriding the configured server URL.
pub const SERVER_URL_ENV: &str = "MERCO_SERVER_URL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StudioConfig {
    /// Base URL of the strategy server.
    pub server_url: String,
    /// Whether edits are saved automatically.
    pub autosave: bool,
    /// Inactivity window before an automatic save, in milliseconds.
    pub autosave_ms: u64,
    /// Per-request timeout, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            autosave: true,
            autosave_ms: 2000,
            timeout_ms: 10_000,
        }
    }
}

impl StudioConfig {
    /// Load from the default location, then apply `MERCO_SERVER_URL`.
    pub fn load() -> Result<Self> {
        let config = Self::load_from(&config_path())?;
        Ok(config.with_server_override(std::env::var(SERVER_URL_ENV).ok()))
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Replace the server URL if `url` is set and non-empty.
    pub fn with_server_override(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
            self.server_url = url;
        }
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Session settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        let base = if self.autosave {
            SessionConfig::default()
        } else {
            SessionConfig::manual_save()
        };
        base.with_autosave_delay(Duration::from_millis(self.autosave_ms))
    }
}

/// `$XDG_CONFIG_HOME/merco`, or `~/.config/merco`.
pub fn config_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback().join(".config"))
        .join("merco")
}

/// `$XDG_DATA_HOME/merco`, or `~/.local/share/merco`.
pub fn data_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| home_fallback().join(".local").join("share"))
        .join("merco")
}

pub fn config_path() -> PathBuf {
    config_dir().join("studio.toml")
}

pub fn history_path() -> PathBuf {
    data_dir().join("studio_history.txt")
}

fn home_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = StudioConfig::load_from(&dir.path().join("studio.toml")).unwrap();
        assert_eq!(config, StudioConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let file = write_config("autosave_ms = 500\n");
        let config = StudioConfig::load_from(file.path()).unwrap();
        assert_eq!(config.autosave_ms, 500);
        assert_eq!(config.server_url, "http://127.0.0.1:3000");
        assert_eq!(config.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn invalid_file_names_the_path() {
        let file = write_config("autosave_ms = \"soon\"\n");
        let err = StudioConfig::load_from(file.path()).unwrap_err();
        assert!(format!("{err}").contains(&file.path().display().to_string()));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = write_config("autosave_delay = 5\n");
        assert!(StudioConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn server_override() {
        let config =
            StudioConfig::default().with_server_override(Some("http://remote:8080".into()));
        assert_eq!(config.server_url, "http://remote:8080");

        let config = StudioConfig::default().with_server_override(Some("  ".into()));
        assert_eq!(config.server_url, "http://127.0.0.1:3000");
    }

    #[test]
    fn session_config_follows_autosave_flag() {
        let config = StudioConfig {
            autosave: false,
            autosave_ms: 750,
            ..StudioConfig::default()
        };
        let session = config.session_config();
        assert!(!session.autosave);
        assert_eq!(session.autosave_delay, Duration::from_millis(750));
    }

    #[test]
    fn paths_are_under_merco() {
        assert!(config_dir().ends_with("merco"));
        assert!(data_dir().ends_with("merco"));
        assert!(config_path().ends_with("merco/studio.toml"));
    }
}
