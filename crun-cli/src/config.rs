//! Configuration loader: TOML config at `<home>/.crun/config.toml`.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

/// Log verbosity, mirroring `internal/log/logger.go`'s level option.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Fine-grained diagnostic detail.
    Debug,
    /// Normal operational events.
    #[default]
    Info,
    /// Recovered or noteworthy conditions.
    Warn,
    /// Failures only.
    Error,
}

/// Log line encoding.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Newline-delimited JSON.
    Json,
    /// Human-readable text.
    #[default]
    Text,
}

/// The runtime's persisted configuration.
///
/// Field names are serialized PascalCase (`RootDir`, `AppLogDir`, ...):
/// the Go original's struct has no `toml` tags at all, so its exported Go
/// field names are its TOML keys directly, and this reproduces that
/// on-disk format rather than switching it to snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// The content-addressed store root.
    pub root_dir: PathBuf,
    /// Directory the structured event log is written under.
    pub app_log_dir: PathBuf,
    /// This config file's own path, recorded so `init` can detect
    /// re-initialization by its presence.
    pub config_file_path: PathBuf,
    /// Minimum level the structured logger emits.
    pub log_level: LogLevel,
    /// Structured log encoding.
    pub log_format: LogFormat,
}

impl Config {
    /// Computes defaults from `SUDO_USER`'s home directory (falling back to
    /// the current user's home via the `dirs` crate, then `/root`),
    /// matching `Default()` in `internal/config/config.go`.
    pub fn default_for_home() -> Self {
        let home = resolve_home();
        let crun_dir = home.join(".crun");
        Self {
            root_dir: crun_dir.join("store"),
            app_log_dir: crun_dir.join("logs"),
            config_file_path: crun_dir.join("config.toml"),
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
        }
    }

    /// Loads the config at `path`. Returns defaults, silently, if the file
    /// is absent — missing config is not an error, only an unconfigured
    /// state `init` is meant to resolve.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default_for_home()),
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }

    /// Atomically writes this config to `config_file_path`: temp file, then
    /// rename, mirroring `internal/config/write.go`.
    pub fn write(&self) -> Result<()> {
        let parent = self
            .config_file_path
            .parent()
            .context("config_file_path has no parent directory")?;
        std::fs::create_dir_all(parent)?;
        let body = toml::to_string_pretty(self)?;
        let tmp = self.config_file_path.with_extension("tmp");
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, &self.config_file_path)?;
        Ok(())
    }
}

/// Resolves the real user's home directory: `SUDO_USER`'s home if set and
/// it exists, else the current user's home (via `dirs::home_dir`), else
/// `/root`. The tool typically runs as root via `sudo`, so `$HOME` alone
/// would resolve to `/root` even when a normal user invoked it.
fn resolve_home() -> PathBuf {
    if let Ok(sudo_user) = std::env::var("SUDO_USER") {
        let candidate = PathBuf::from("/home").join(&sudo_user);
        if candidate.is_dir() {
            return candidate;
        }
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_returns_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.config_file_path, Config::default_for_home().config_file_path);
    }

    #[test]
    fn write_then_load_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cfg = Config::default_for_home();
        cfg.config_file_path = tmp.path().join(".crun/config.toml");
        cfg.root_dir = tmp.path().join(".crun/store");
        cfg.write().unwrap();

        let loaded = Config::load(&cfg.config_file_path).unwrap();
        assert_eq!(loaded.root_dir, cfg.root_dir);
        assert!(!cfg.config_file_path.with_extension("tmp").exists());
    }
}
