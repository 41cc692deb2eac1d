//! Manager configuration.
//!
//! Loaded from `$XDG_CONFIG_HOME/strata/config.toml` when present:
//!
//! ```toml
//! [http]
//! default_charset = "ISO-8859-1"
//! user_agent = "strata/0.1"
//! timeout_secs = 30
//!
//! [local]
//! read_only = true
//!
//! [archive]
//! schemes = ["zip", "jar"]
//!
//! [mime]
//! schemes = ["mime"]
//! ```
//!
//! Every key is optional; a missing file means defaults.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level configuration handed to every provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    pub mime: MimeConfig,
}

/// Options for `http`/`https` file systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Charset reported when a response's Content-Type has none.
    #[serde(default = "default_charset")]
    pub default_charset: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_charset() -> String {
    "ISO-8859-1".to_string()
}

fn default_user_agent() -> String {
    format!("strata/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            default_charset: default_charset(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Options for the `file` scheme.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Drop the write capabilities from local file systems.
    #[serde(default)]
    pub read_only: bool,
}

/// Schemes served by the archive provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_schemes")]
    pub schemes: Vec<String>,
}

fn default_archive_schemes() -> Vec<String> {
    vec!["zip".to_string()]
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            schemes: default_archive_schemes(),
        }
    }
}

/// Schemes served by the document provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MimeConfig {
    #[serde(default = "default_mime_schemes")]
    pub schemes: Vec<String>,
}

fn default_mime_schemes() -> Vec<String> {
    vec!["mime".to_string()]
}

impl Default for MimeConfig {
    fn default() -> Self {
        Self {
            schemes: default_mime_schemes(),
        }
    }
}

impl ManagerConfig {
    /// Parse configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load configuration from the default path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            Some(path) => {
                tracing::debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the default config file path.
    pub fn config_path() -> Option<PathBuf> {
        BaseDirs::new().map(|d| d.config_dir().join("strata").join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.http.default_charset, "ISO-8859-1");
        assert_eq!(config.http.timeout_secs, 30);
        assert!(config.http.user_agent.starts_with("strata/"));
        assert!(!config.local.read_only);
        assert_eq!(config.archive.schemes, vec!["zip"]);
        assert_eq!(config.mime.schemes, vec!["mime"]);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[http]
default_charset = "UTF-8"
user_agent = "strata-test/1"
timeout_secs = 5

[local]
read_only = true

[archive]
schemes = ["zip", "jar"]
"#;
        let config = ManagerConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.http.default_charset, "UTF-8");
        assert_eq!(config.http.user_agent, "strata-test/1");
        assert_eq!(config.http.timeout_secs, 5);
        assert!(config.local.read_only);
        assert_eq!(config.archive.schemes, vec!["zip", "jar"]);
        assert_eq!(config.mime.schemes, vec!["mime"]);
    }

    #[test]
    fn test_parse_partial_config() {
        let config = ManagerConfig::from_toml_str("[http]\ntimeout_secs = 1\n").unwrap();
        assert_eq!(config.http.timeout_secs, 1);
        assert_eq!(config.http.default_charset, "ISO-8859-1");
        assert_eq!(ManagerConfig::from_toml_str("").unwrap(), ManagerConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[local]\nread_only = true\n").unwrap();
        assert!(ManagerConfig::load_from(&path).unwrap().local.read_only);

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            ManagerConfig::load_from(&missing),
            Err(ConfigError::Read { .. })
        ));

        std::fs::write(&path, "[local]\nread_only = 3\n").unwrap();
        assert!(matches!(ManagerConfig::load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_config_path_is_under_strata() {
        if let Some(path) = ManagerConfig::config_path() {
            assert!(path.ends_with("strata/config.toml"));
        }
    }
}
