//! Retry configuration
//!
//! Settings come from (lowest to highest precedence) built-in defaults, an
//! optional JSON file and `ESCPOS_RETRY_*` environment variables. The result
//! is turned into a validated [`RetryPolicy`] and handed to each connection;
//! nothing here is global.
//!
//! File layout:
//!
//! ```json
//! { "retry": { "max_tries": 3, "delay": 3, "factor": 2 } }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::PrintResult;
use crate::retry::{DEFAULT_DELAY, DEFAULT_FACTOR, DEFAULT_MAX_TRIES, RetryPolicy};

pub const ENV_MAX_TRIES: &str = "ESCPOS_RETRY_MAX_TRIES";
pub const ENV_DELAY: &str = "ESCPOS_RETRY_DELAY";
pub const ENV_FACTOR: &str = "ESCPOS_RETRY_FACTOR";

/// Raw retry options as they appear in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_tries: u32,
    /// Seconds before the first retry
    pub delay: u64,
    pub factor: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    retry: RetrySettings,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            delay: DEFAULT_DELAY.as_secs(),
            factor: DEFAULT_FACTOR,
        }
    }
}

impl RetrySettings {
    /// `~/.escpos/config.json`, or `None` when no home directory is known.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".escpos").join("config.json"))
    }

    /// Read settings from a JSON file; absent keys keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> PrintResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&raw)?;
        debug!(path = %path.display(), settings = ?file.retry, "Loaded retry settings");
        Ok(file.retry)
    }

    /// Like [`from_file`](Self::from_file), but writes a default file first
    /// when `path` does not exist yet.
    pub fn load_or_init(path: impl AsRef<Path>) -> PrintResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let body = serde_json::to_string_pretty(&ConfigFile::default())?;
            std::fs::write(path, body)?;
            info!(path = %path.display(), "Created default retry config");
        }
        Self::from_file(path)
    }

    /// Apply `ESCPOS_RETRY_*` overrides; unparseable values are ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            max_tries: lookup(ENV_MAX_TRIES)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(self.max_tries),
            delay: lookup(ENV_DELAY)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(self.delay),
            factor: lookup(ENV_FACTOR)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(self.factor),
        }
    }

    /// Validate into a [`RetryPolicy`]
    pub fn policy(&self) -> PrintResult<RetryPolicy> {
        RetryPolicy::new(self.max_tries, Duration::from_secs(self.delay), self.factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrintError;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = RetrySettings::default();
        assert_eq!(settings.max_tries, 3);
        assert_eq!(settings.delay, 3);
        assert_eq!(settings.factor, 2);
        assert_eq!(settings.policy().unwrap(), RetryPolicy::default());
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"retry": {"max_tries": 5}}"#).unwrap();

        let settings = RetrySettings::from_file(&path).unwrap();
        assert_eq!(settings.max_tries, 5);
        assert_eq!(settings.delay, 3);
        assert_eq!(settings.factor, 2);
    }

    #[test]
    fn test_from_file_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ retry: ").unwrap();

        assert!(matches!(
            RetrySettings::from_file(&path),
            Err(PrintError::Json(_))
        ));
    }

    #[test]
    fn test_load_or_init_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let settings = RetrySettings::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(settings, RetrySettings::default());

        let again = RetrySettings::from_file(&path).unwrap();
        assert_eq!(again, settings);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [(ENV_MAX_TRIES, "7"), (ENV_DELAY, "nope")]
            .into_iter()
            .collect();
        let settings =
            RetrySettings::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(settings.max_tries, 7);
        assert_eq!(settings.delay, 3);
        assert_eq!(settings.factor, 2);
    }

    #[test]
    fn test_invalid_policy() {
        let settings = RetrySettings {
            max_tries: 3,
            delay: 0,
            factor: 2,
        };
        assert!(matches!(
            settings.policy(),
            Err(PrintError::InvalidArgument(_))
        ));
    }
}
