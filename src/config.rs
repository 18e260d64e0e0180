//! CLI configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via TALKSTATE_CONFIG or --config)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Transition notice configuration.
    pub notifications: NotificationConfig,
    /// Review defaults.
    pub review: ReviewConfig,
}

impl Config {
    /// Loads configuration from `path` (or TALKSTATE_CONFIG), then applies
    /// environment variable overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match std::env::var("TALKSTATE_CONFIG") {
                Ok(path) => Self::from_file(&path)?,
                Err(_) => Self::default(),
            },
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.storage.apply_env_overrides();
        self.notifications.apply_env_overrides();
        self.review.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.notifications.enabled && self.notifications.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "notifications enabled but channel_capacity is 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Data directory.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("TALKSTATE_DATA") {
            self.data_dir = PathBuf::from(dir);
        }
    }

    /// Returns the talk snapshot directory.
    pub fn talks_dir(&self) -> PathBuf {
        self.data_dir.join("talks")
    }
}

/// Transition notice configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Attach a notifier to the acceptance/rejection hooks.
    pub enabled: bool,
    /// Broadcast channel capacity.
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel_capacity: 256,
        }
    }
}

impl NotificationConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("TALKSTATE_NOTIFY") {
            self.enabled = env_flag(&enabled);
        }
        if let Ok(capacity) = std::env::var("TALKSTATE_NOTIFY_CAPACITY") {
            if let Ok(n) = capacity.parse() {
                self.channel_capacity = n;
            }
        }
    }
}

/// Review defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// `send_mail` value used when a fire request does not set one.
    pub send_mail_default: bool,
}

impl ReviewConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(send) = std::env::var("TALKSTATE_SEND_MAIL") {
            self.send_mail_default = env_flag(&send);
        }
    }
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};
    use tempfile::TempDir;

    const ENV_VARS: [&str; 5] = [
        "TALKSTATE_CONFIG",
        "TALKSTATE_DATA",
        "TALKSTATE_NOTIFY",
        "TALKSTATE_NOTIFY_CAPACITY",
        "TALKSTATE_SEND_MAIL",
    ];

    /// Serializes tests that touch the process environment and clears it.
    fn env_lock() -> MutexGuard<'static, ()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        let guard = LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
        guard
    }

    fn write_yaml(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("talkstate.yaml");
        std::fs::write(
            &path,
            "storage:\n  data_dir: /from/yaml\n\
             notifications:\n  enabled: false\n  channel_capacity: 32\n\
             review:\n  send_mail_default: false\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));
        assert_eq!(config.storage.talks_dir(), PathBuf::from("./data/talks"));
        assert!(!config.notifications.enabled);
        assert_eq!(config.notifications.channel_capacity, 256);
        assert!(!config.review.send_mail_default);
    }

    #[test]
    fn test_from_file_partial() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("talkstate.yaml");
        std::fs::write(
            &path,
            "storage:\n  data_dir: /var/lib/talkstate\nnotifications:\n  enabled: true\n",
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/talkstate"));
        assert!(config.notifications.enabled);
        assert_eq!(config.notifications.channel_capacity, 256);
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file("/nonexistent/talkstate.yaml");
        assert!(matches!(result, Err(ConfigError::IoError(..))));
    }

    #[test]
    fn test_from_file_bad_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "storage: [unclosed").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::ParseError(..))
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = Config::default();
        config.notifications.enabled = true;
        config.notifications.channel_capacity = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_env_flag() {
        assert!(env_flag("1"));
        assert!(env_flag("TRUE"));
        assert!(!env_flag("yes"));
    }

    #[test]
    fn test_env_overrides_yaml() {
        let _guard = env_lock();
        let dir = TempDir::new().unwrap();
        let path = write_yaml(&dir);

        std::env::set_var("TALKSTATE_DATA", "/from/env");
        std::env::set_var("TALKSTATE_NOTIFY", "true");
        std::env::set_var("TALKSTATE_NOTIFY_CAPACITY", "64");
        std::env::set_var("TALKSTATE_SEND_MAIL", "1");

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/from/env"));
        assert!(config.notifications.enabled);
        assert_eq!(config.notifications.channel_capacity, 64);
        assert!(config.review.send_mail_default);

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_load_keeps_yaml_without_env() {
        let _guard = env_lock();
        let dir = TempDir::new().unwrap();
        let path = write_yaml(&dir);

        // Unparseable capacity is ignored rather than zeroing the channel.
        std::env::set_var("TALKSTATE_NOTIFY_CAPACITY", "lots");

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/from/yaml"));
        assert!(!config.notifications.enabled);
        assert_eq!(config.notifications.channel_capacity, 32);
        assert!(!config.review.send_mail_default);

        std::env::remove_var("TALKSTATE_NOTIFY_CAPACITY");
    }

    #[test]
    fn test_load_from_config_env_var() {
        let _guard = env_lock();
        let dir = TempDir::new().unwrap();
        let path = write_yaml(&dir);

        let config = Config::load(None).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("./data"));

        std::env::set_var("TALKSTATE_CONFIG", &path);
        let config = Config::load(None).unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/from/yaml"));
        assert_eq!(config.notifications.channel_capacity, 32);

        std::env::remove_var("TALKSTATE_CONFIG");
    }

    #[test]
    fn test_load_rejects_zero_capacity_from_env() {
        let _guard = env_lock();
        std::env::set_var("TALKSTATE_NOTIFY", "1");
        std::env::set_var("TALKSTATE_NOTIFY_CAPACITY", "0");

        assert!(matches!(
            Config::load(None),
            Err(ConfigError::ValidationError(_))
        ));

        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_yaml_roundtrip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.storage.data_dir, config.storage.data_dir);
        assert_eq!(
            parsed.notifications.channel_capacity,
            config.notifications.channel_capacity
        );
    }
}
