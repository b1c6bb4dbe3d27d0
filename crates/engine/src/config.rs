//! Store configuration via `eventstore.toml`
//!
//! The file form of [`StoreSettings`]. On first open of a store directory a
//! commented default file is written; edit it and reopen to change limits.
//! Durations are plain integer seconds or milliseconds so the file stays
//! readable without a duration syntax.

use eventstore_core::{Error, LogLevel, RecordFormat, Result};
use eventstore_storage::FileQueueConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::settings::StoreSettings;

/// Config file name placed in the store directory.
pub const CONFIG_FILE_NAME: &str = "eventstore.toml";

/// Store configuration loaded from `eventstore.toml`.
///
/// # Example
///
/// ```toml
/// max_events = 1000000
/// max_age_secs = 2592000
/// minimum_level = "INFO"
///
/// [queue]
/// sync_writes = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum stored records; `0` disables the store.
    pub max_events: i64,
    /// Maximum record age in seconds.
    pub max_age_secs: Option<u64>,
    /// Intake buffer capacity.
    pub max_buffer_size: usize,
    /// Producer backpressure bound in milliseconds.
    pub max_buffer_wait_ms: u64,
    /// Per-batch eviction cap.
    pub max_trim_size: usize,
    /// Deferred flush delay in milliseconds.
    pub flush_delay_ms: u64,
    /// Explicit cleanup interval in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_interval_secs: Option<u64>,
    /// Events below this level are discarded at intake.
    pub minimum_level: String,
    /// Rendering for records shown to operators: `"plain"` or `"json"`.
    pub format: String,
    /// Journal tuning for the on-disk queue.
    pub queue: FileQueueConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let settings = StoreSettings::default();
        Self {
            max_events: settings.max_events,
            max_age_secs: settings.max_age.map(|age| age.as_secs()),
            max_buffer_size: settings.max_buffer_size,
            max_buffer_wait_ms: settings.max_buffer_wait_time.as_millis() as u64,
            max_trim_size: settings.max_trim_size,
            flush_delay_ms: settings.flush_delay.as_millis() as u64,
            cleanup_interval_secs: None,
            minimum_level: LogLevel::default().as_str().to_string(),
            format: "plain".to_string(),
            queue: FileQueueConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Checked settings described by this config.
    pub fn to_settings(&self) -> StoreSettings {
        StoreSettings {
            max_events: self.max_events,
            max_age: self.max_age_secs.map(Duration::from_secs),
            max_buffer_size: self.max_buffer_size,
            max_buffer_wait_time: Duration::from_millis(self.max_buffer_wait_ms),
            max_trim_size: self.max_trim_size,
            flush_delay: Duration::from_millis(self.flush_delay_ms),
            cleanup_interval: self.cleanup_interval_secs.map(Duration::from_secs),
        }
        .checked()
    }

    /// Parse `minimum_level`.
    pub fn minimum_level(&self) -> Result<LogLevel> {
        self.minimum_level.parse().map_err(|e| {
            Error::config(format!("Invalid minimum_level in {}: {}", CONFIG_FILE_NAME, e))
        })
    }

    /// Parse `format`.
    pub fn record_format(&self) -> Result<RecordFormat> {
        self.format.parse().map_err(|e| {
            Error::config(format!("Invalid format in {}: {}", CONFIG_FILE_NAME, e))
        })
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Event store configuration
#
# Maximum number of stored events. 0 disables the store and clears any
# stored history on the next open. Positive values below 100 are raised to 100.
max_events = 1000000

# Maximum event age in seconds (default: 30 days, minimum: 1 hour)
max_age_secs = 2592000

# Intake buffer capacity and how long a producer may wait for space (ms)
max_buffer_size = 10000
max_buffer_wait_ms = 1000

# Most events evicted per cleanup batch
max_trim_size = 500

# Delay before a deferred flush runs (ms)
flush_delay_ms = 5000

# Cleanup interval in seconds (default: max_age / 60, between 1 min and 1 day)
# cleanup_interval_secs = 600

# Events below this level are discarded: TRACE, DEBUG, INFO, WARN, ERROR, FATAL
minimum_level = "INFO"

# Rendering for records shown to operators: "plain" or "json"
format = "plain"

[queue]
# fsync the journal after every write
sync_writes = false
# Rewrite the journal once this many evicted records have accumulated
compact_min_dead = 10000
"#
    }

    /// Parse config from TOML text and validate the enumerated fields.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse config: {}", e)))?;
        config.minimum_level()?;
        config.record_format()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Config(msg) => Error::config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::config(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_toml_matches_default_config() {
        let parsed = StoreConfig::from_toml_str(StoreConfig::default_toml()).unwrap();
        assert_eq!(parsed, StoreConfig::default());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = StoreConfig::from_toml_str("max_events = 500\n").unwrap();
        assert_eq!(config.max_events, 500);
        assert_eq!(config.max_trim_size, 500);
        assert_eq!(config.minimum_level().unwrap(), LogLevel::Info);
    }

    #[test]
    fn test_to_settings_applies_floors() {
        let config = StoreConfig::from_toml_str("max_events = 5\nmax_age_secs = 10\n").unwrap();
        let settings = config.to_settings();
        assert_eq!(settings.max_events, 100);
        assert_eq!(settings.max_age, Some(Duration::from_secs(3600)));
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        let err = StoreConfig::from_toml_str("minimum_level = \"LOUD\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_format_is_config_error() {
        let err = StoreConfig::from_toml_str("format = \"xml\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_write_default_if_missing_keeps_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        StoreConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(StoreConfig::from_file(&path).unwrap(), StoreConfig::default());

        std::fs::write(&path, "max_events = 0\n").unwrap();
        StoreConfig::write_default_if_missing(&path).unwrap();
        assert_eq!(StoreConfig::from_file(&path).unwrap().max_events, 0);
    }

    #[test]
    fn test_write_to_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = StoreConfig {
            max_events: 2_000,
            cleanup_interval_secs: Some(120),
            minimum_level: "WARN".to_string(),
            ..Default::default()
        };
        config.write_to_file(&path).unwrap();
        assert_eq!(StoreConfig::from_file(&path).unwrap(), config);
    }
}
