//! Configuration for the presence monitor.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::policy::{DEFAULT_MAX_CONSECUTIVE_ERRORS, DEFAULT_RATE_LIMIT_GRACE};
use crate::error::ConfigError;

const APP_DIR: &str = "presence-monitor";

/// Main configuration for the monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Contact to watch (phone number, username or service id)
    pub target: String,

    /// Time between presence checks
    #[serde(with = "duration_serde")]
    pub check_interval: Duration,

    /// Zone used for every rendered timestamp
    pub reference_time_zone: Tz,

    /// Added to every rate-limit wait
    #[serde(with = "duration_serde")]
    pub rate_limit_grace: Duration,

    /// Consecutive transient errors before the monitor gives up
    pub max_consecutive_errors: u32,

    /// Append-only transition log
    pub log_path: PathBuf,

    /// Statistics snapshot
    pub stats_path: PathBuf,

    /// Which messaging client to use
    pub client: ClientConfig,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::data_dir();

        Self {
            target: String::new(),
            check_interval: Duration::from_secs(10),
            reference_time_zone: chrono_tz::Asia::Tehran,
            rate_limit_grace: DEFAULT_RATE_LIMIT_GRACE,
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
            log_path: data_dir.join("online_log.txt"),
            stats_path: data_dir.join("statistics.json"),
            client: ClientConfig::default(),
        }
    }
}

/// Result of [`Config::load_or_init`].
#[derive(Debug)]
pub enum LoadOutcome {
    Loaded(Config),
    /// No file existed; a template was written and must be edited first.
    Created(PathBuf),
}

impl Config {
    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Load configuration, writing a default template if the file is missing.
    pub fn load_or_init(path: &Path) -> Result<LoadOutcome, ConfigError> {
        if path.exists() {
            Self::load(path).map(LoadOutcome::Loaded)
        } else {
            Self::default().save(path)?;
            Ok(LoadOutcome::Created(path.to_path_buf()))
        }
    }

    /// Save configuration to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the default configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }

    /// Reject values the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target.trim().is_empty() {
            return Err(ConfigError::invalid("target is not set"));
        }
        if self.check_interval.is_zero() {
            return Err(ConfigError::invalid("check_interval must be at least 1 second"));
        }
        if self.max_consecutive_errors == 0 {
            return Err(ConfigError::invalid("max_consecutive_errors must be positive"));
        }
        Ok(())
    }

    /// Ensure the directories holding the log and statistics exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        for path in [&self.log_path, &self.stats_path] {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        Ok(())
    }
}

/// Messaging client selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientConfig {
    /// Local messaging bridge over HTTP
    Bridge {
        base_url: String,
        #[serde(default)]
        token: Option<String>,
    },
    /// JSON-lines script played back one step per check
    Replay { script: PathBuf },
}

impl ClientConfig {
    /// Whether this build can construct the selected client.
    pub fn is_available(&self) -> bool {
        match self {
            ClientConfig::Bridge { .. } => cfg!(feature = "bridge"),
            ClientConfig::Replay { .. } => true,
        }
    }
}

impl Default for ClientConfig {
    /// The bridge when it is compiled in, otherwise a replay script next to the data files.
    fn default() -> Self {
        if cfg!(feature = "bridge") {
            ClientConfig::Bridge {
                base_url: "http://127.0.0.1:8710".to_string(),
                token: None,
            }
        } else {
            ClientConfig::Replay {
                script: Config::data_dir().join("replay.jsonl"),
            }
        }
    }
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
