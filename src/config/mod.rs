//! Configuration management for jiracli.
//!
//! The configuration is a small TOML file holding the JIRA location, the
//! username, the preferred protocol and, for the RPC protocol, the last session
//! token. Passwords are never written here; they live in the OS keyring.

mod settings;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

pub use settings::EstimateSettings;

/// Errors raised while loading or saving the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform configuration directory could be determined.
    #[error("Could not determine configuration directory")]
    NoConfigDir,

    /// The configuration directory could not be created.
    #[error("Failed to create configuration directory: {0}")]
    CreateDirError(#[source] std::io::Error),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file: {0}")]
    ReadError(#[source] std::io::Error),

    /// The configuration file could not be written.
    #[error("Failed to write configuration file: {0}")]
    WriteError(#[source] std::io::Error),

    /// The configuration file is not valid TOML.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// The configuration could not be serialized.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A value in the configuration is invalid.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// The persisted jiracli configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the JIRA instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Username used to log in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Wire protocol name (`rest` or `rpc`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Session token of the RPC protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Parent-estimate bookkeeping settings.
    #[serde(default)]
    pub estimate: EstimateSettings,
    /// Where this configuration is saved; `None` keeps it in memory only.
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl Config {
    /// Load the configuration from the default location.
    ///
    /// A missing file yields an empty configuration bound to that location.
    pub fn load() -> Result<Self> {
        Self::load_from(&default_path()?)
    }

    /// Load the configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(ConfigError::ReadError)?;
            toml::from_str::<Config>(&content)?
        } else {
            debug!("No configuration file at {:?}, using defaults", path);
            Config::default()
        };
        config.path = Some(path.to_path_buf());
        config.validate()?;
        Ok(config)
    }

    /// An in-memory configuration that is never written to disk.
    pub fn ephemeral() -> Self {
        Self::default()
    }

    /// Write the configuration back to the file it was loaded from.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(ConfigError::CreateDirError)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(ConfigError::WriteError)?;
        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// The file backing this configuration, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check the stored values.
    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.base_url {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(ConfigError::ValidationError(format!(
                    "base_url '{}' must start with http:// or https://",
                    url
                )));
            }
        }
        if let Some(username) = &self.username {
            if username.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "username cannot be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether nothing identifying a JIRA instance has been stored yet.
    pub fn is_first_run(&self) -> bool {
        self.base_url.is_none() && self.username.is_none()
    }
}

/// The default configuration file location.
///
/// - Linux: `~/.config/jiracli/config.toml`
/// - macOS: `~/Library/Application Support/jiracli/config.toml`
/// - Windows: `C:\Users\<User>\AppData\Roaming\jiracli\config.toml`
pub fn default_path() -> Result<PathBuf> {
    let base = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(base.join("jiracli").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(config.base_url.is_none());
        assert!(config.is_first_run());
        assert_eq!(config.path(), Some(path.as_path()));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::load_from(&path).unwrap();
        config.base_url = Some("https://jira.example.com".to_string());
        config.username = Some("admin".to_string());
        config.protocol = Some("rpc".to_string());
        config.token = Some("abc123".to_string());
        config.save().unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded, config);
        assert!(!reloaded.is_first_run());
    }

    #[test]
    fn test_ephemeral_save_is_noop() {
        let mut config = Config::ephemeral();
        config.token = Some("t".to_string());
        assert!(config.save().is_ok());
        assert!(config.path().is_none());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "base_url = \"jira.example.com\"\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("must start with http"));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "base_url = [").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_estimate_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "base_url = \"https://jira.example.com\"\n[estimate]\nparent_type = \"Epic\"\n",
        )
        .unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.estimate.parent_type, "Epic");
        assert_eq!(config.estimate.excluded_label, "student");
    }

    #[test]
    fn test_default_path_structure() {
        let path = default_path().unwrap();
        assert!(path.ends_with("jiracli/config.toml"));
    }
}
