//! Configuration for Estuary.
//!
//! Configuration is read from `~/.config/estuary/config.toml` unless another
//! path is given. If the file doesn't exist, a default configuration with
//! comments and a single local account is created.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::app::EstuaryError;
use crate::domain::{Account, Backend};
use crate::fetcher::parallel::DEFAULT_WORKERS;

/// Main configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where per-account caches live. Defaults to the platform data dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_root: Option<PathBuf>,
    pub fetch: FetchConfig,
    pub retention: RetentionConfig,
    pub accounts: Vec<Account>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_root: None,
            fetch: FetchConfig::default(),
            retention: RetentionConfig::default(),
            accounts: vec![Account::local("local", "Local feeds")],
        }
    }
}

/// Network behaviour shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Feeds fetched at once by the local backend.
    pub parallelism: usize,
    pub timeout_secs: u64,
    /// Items requested per page from remote services.
    pub page_size: usize,
    /// Upper bound on items pulled from one listing.
    pub max_items: usize,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_WORKERS,
            timeout_secs: 10,
            page_size: 100,
            max_items: 1000,
            user_agent: format!("estuary/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub max_age_days: u32,
    /// Sweep old read articles after every refresh.
    pub auto_clean: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            auto_clean: false,
        }
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.max_age_days))
    }
}

impl Config {
    /// Load configuration from `path`, or the default path when `None`.
    ///
    /// If the config file doesn't exist, creates a default one with comments.
    /// Missing fields in the config file will use default values.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_config_path()?,
        };

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Write the configuration back, e.g. after a backend rotated its tokens.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.parallelism == 0 {
            return Err(ConfigError::Invalid("fetch.parallelism must be at least 1".into()));
        }
        if self.fetch.page_size == 0 || self.fetch.max_items == 0 {
            return Err(ConfigError::Invalid(
                "fetch.page_size and fetch.max_items must be at least 1".into(),
            ));
        }

        let mut keys = HashSet::new();
        for account in &self.accounts {
            if account.key.trim().is_empty() {
                return Err(ConfigError::Invalid("account key must not be empty".into()));
            }
            if account.key.contains(['/', '\\']) || account.key == "." || account.key == ".." {
                return Err(ConfigError::Invalid(format!(
                    "account key {:?} is not usable as a directory name",
                    account.key
                )));
            }
            if !keys.insert(account.key.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate account key {:?}",
                    account.key
                )));
            }

            let server = match &account.backend {
                Backend::Local => None,
                Backend::Ttrss { server, .. } | Backend::Inoreader { server, .. } => Some(server),
            };
            if let Some(server) = server {
                url::Url::parse(server).map_err(|e| {
                    ConfigError::Invalid(format!("account {}: bad server URL: {}", account.key, e))
                })?;
            }
        }

        Ok(())
    }

    /// Root directory of the per-account caches.
    pub fn storage_root(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage_root {
            Some(root) => Ok(root.clone()),
            None => Ok(dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("estuary")),
        }
    }

    pub fn account(&self, key: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.key == key)
    }

    /// Get the default config file path: `~/.config/estuary/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("estuary").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    /// Generate the default config file content with comments.
    fn default_config_content() -> String {
        r##"# Estuary configuration
#
# Each account keeps its cache in <storage_root>/<key>/collection.db.
# storage_root defaults to the platform data directory.
# storage_root = "/home/me/.local/share/estuary"

[fetch]
# Feeds fetched concurrently by local accounts
parallelism = 10

# Timeout for every network call, in seconds
timeout_secs = 10

# Paging of remote services
page_size = 100
max_items = 1000

[retention]
# Read, unstarred articles older than this are removed by `estuary clean`
max_age_days = 30

# Also clean after every refresh
auto_clean = false

# Accounts. kind is one of: local, ttrss, inoreader
#
# [[accounts]]
# key = "work"
# name = "Work TTRSS"
# kind = "ttrss"
# server = "https://rss.example.com/tt-rss"
# username = "me"
# password = "secret"
#
# [[accounts]]
# key = "ino"
# name = "Inoreader"
# kind = "inoreader"
# app_id = "1000000000"
# app_key = "..."
# refresh_token = "..."

[[accounts]]
key = "local"
name = "Local feeds"
kind = "local"
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for EstuaryError {
    fn from(e: ConfigError) -> Self {
        EstuaryError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_deserializes() {
        let content = Config::default_config_content();
        let config: Config = toml::from_str(&content).expect("Default config should be valid TOML");

        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let content = r##"
[fetch]
parallelism = 4

[[accounts]]
key = "ino"
name = "Inoreader"
kind = "inoreader"
app_id = "1"
app_key = "k"
refresh_token = "r"
"##;
        let config: Config = toml::from_str(content).expect("Partial config should work");

        assert_eq!(config.fetch.parallelism, 4);
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.retention.max_age_days, 30);
        assert_eq!(config.accounts.len(), 1);
        match &config.accounts[0].backend {
            Backend::Inoreader { server, .. } => assert_eq!(server, "https://www.inoreader.com"),
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let config = Config {
            accounts: vec![Account::local("a", "A"), Account::local("a", "B")],
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let mut config = Config::default();
        config.fetch.parallelism = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        // and the written file loads back the same
        assert_eq!(Config::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn test_save_round_trips_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.accounts.push(Account {
            key: "work".into(),
            name: "Work".into(),
            backend: Backend::Ttrss {
                server: "https://rss.example.com".into(),
                username: "me".into(),
                password: "secret".into(),
            },
        });

        config.save(&path).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), config);
    }
}
