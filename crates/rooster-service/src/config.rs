//! Service configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::{Duration, UtcOffset};

use rooster_core::{BetweenSampling, CalculatorConfig, LocalZone, Location};

use crate::retry::RetryConfig;

/// Service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Calculation and reload settings.
    pub scheduler: SchedulerConfig,
    /// Where solar events are computed for.
    pub location: LocationConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Astronomy data source.
    pub astronomy: AstronomyConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// # Example
    ///
    /// ```
    /// use rooster_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.scheduler.validate());
        errors.extend(self.location.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.astronomy.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Largest accepted UTC offset, in minutes.
pub const MAX_UTC_OFFSET_MINUTES: i32 = 18 * 60;

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Fixed offset from UTC in minutes. When unset the system time zone is
    /// used, daylight saving included.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
    /// Astronomy data older than this (seconds) is not used.
    pub astronomy_max_age: u64,
    /// Seconds from now used when an anchor is unavailable.
    pub fallback_offset: u64,
    /// How `Between` alarms pick their instant.
    pub sampling: BetweenSampling,
    /// Seconds between full reschedules, which pick up edits made by other
    /// processes.
    pub reload_interval: u64,
    /// Seconds a stored trigger time may lie in the past at startup and
    /// still ring late instead of being skipped.
    pub missed_grace: u64,
}

/// Minimum reload interval in seconds.
pub const MIN_RELOAD_INTERVAL: u64 = 10;

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: None,
            astronomy_max_age: 6 * 3600,
            fallback_offset: 3600,
            sampling: BetweenSampling::Seeded,
            reload_interval: 300,
            missed_grace: 15 * 60,
        }
    }
}

impl SchedulerConfig {
    /// Validate scheduler configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(minutes) = self.utc_offset_minutes
            && minutes.abs() > MAX_UTC_OFFSET_MINUTES
        {
            errors.push(ValidationError {
                field: "scheduler.utc_offset_minutes".to_string(),
                message: format!(
                    "offset {} is out of range (at most {} minutes either way)",
                    minutes, MAX_UTC_OFFSET_MINUTES
                ),
            });
        }
        if self.astronomy_max_age == 0 {
            errors.push(ValidationError {
                field: "scheduler.astronomy_max_age".to_string(),
                message: "maximum astronomy age must be positive".to_string(),
            });
        }
        if self.fallback_offset == 0 {
            errors.push(ValidationError {
                field: "scheduler.fallback_offset".to_string(),
                message: "fallback offset must be positive".to_string(),
            });
        }
        if self.reload_interval < MIN_RELOAD_INTERVAL {
            errors.push(ValidationError {
                field: "scheduler.reload_interval".to_string(),
                message: format!(
                    "reload interval {} is too short (minimum {} seconds)",
                    self.reload_interval, MIN_RELOAD_INTERVAL
                ),
            });
        }

        errors
    }

    /// The zone alarms are evaluated in: the fixed override if set,
    /// otherwise the system zone.
    pub fn zone(&self) -> LocalZone {
        match self.utc_offset_minutes {
            Some(minutes) => LocalZone::Fixed(
                UtcOffset::from_whole_seconds(minutes.saturating_mul(60))
                    .unwrap_or(UtcOffset::UTC),
            ),
            None => LocalZone::System,
        }
    }

    /// Calculator settings derived from this section.
    pub fn calculator(&self) -> CalculatorConfig {
        CalculatorConfig::default()
            .zone(self.zone())
            .max_astronomy_age(seconds(self.astronomy_max_age))
            .fallback_offset(seconds(self.fallback_offset))
            .sampling(self.sampling)
    }

    pub fn reload_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reload_interval)
    }

    pub fn missed_grace(&self) -> Duration {
        seconds(self.missed_grace)
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
}

/// Location configuration. `0, 0` means no location has been set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub latitude: f64,
    pub longitude: f64,
}

impl LocationConfig {
    /// Validate location configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(-90.0..=90.0).contains(&self.latitude) {
            errors.push(ValidationError {
                field: "location.latitude".to_string(),
                message: format!("latitude {} must be between -90 and 90", self.latitude),
            });
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            errors.push(ValidationError {
                field: "location.longitude".to_string(),
                message: format!("longitude {} must be between -180 and 180", self.longitude),
            });
        }

        errors
    }

    pub fn location(&self) -> Location {
        Location::new(self.latitude, self.longitude)
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: rooster_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Default sunrise-sunset endpoint.
pub const DEFAULT_API_URL: &str = "https://api.sunrise-sunset.org/json";

/// Minimum refresh interval in seconds (10 minutes).
pub const MIN_REFRESH_INTERVAL: u64 = 600;

/// How retry delays grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// `retry_delay_ms`, then twice that, and so on.
    #[default]
    Linear,
    /// `retry_delay_ms` doubled on every attempt.
    Exponential,
}

/// Astronomy data source configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AstronomyConfig {
    /// Endpoint returning sunrise-sunset style JSON.
    pub api_url: String,
    /// Seconds between scheduled refreshes.
    pub refresh_interval: u64,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Retries after the first failed request.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub retry_delay_ms: u64,
    pub backoff: BackoffKind,
    /// Stretch each delay by up to 25% at random.
    pub jitter: bool,
}

impl Default for AstronomyConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            refresh_interval: 23 * 3600,
            timeout: 10,
            max_retries: 2,
            retry_delay_ms: 2000,
            backoff: BackoffKind::Linear,
            jitter: false,
        }
    }
}

impl AstronomyConfig {
    /// Validate astronomy configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            errors.push(ValidationError {
                field: "astronomy.api_url".to_string(),
                message: format!("'{}' is not an http(s) URL", self.api_url),
            });
        }
        if self.refresh_interval < MIN_REFRESH_INTERVAL {
            errors.push(ValidationError {
                field: "astronomy.refresh_interval".to_string(),
                message: format!(
                    "refresh interval {} is too short (minimum {} seconds)",
                    self.refresh_interval, MIN_REFRESH_INTERVAL
                ),
            });
        }
        if self.timeout == 0 {
            errors.push(ValidationError {
                field: "astronomy.timeout".to_string(),
                message: "timeout must be positive".to_string(),
            });
        }

        errors
    }

    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval)
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout)
    }

    /// Retry policy for fetches.
    pub fn retry(&self) -> RetryConfig {
        let retries = self.max_retries.max(1);
        let (config, growth) = match self.backoff {
            BackoffKind::Linear => (
                RetryConfig::new(self.max_retries).linear(),
                u64::from(retries),
            ),
            BackoffKind::Exponential => (
                RetryConfig::new(self.max_retries).backoff_multiplier(2.0),
                1u64.checked_shl(retries - 1).unwrap_or(u64::MAX),
            ),
        };
        config
            .initial_delay(std::time::Duration::from_millis(self.retry_delay_ms))
            .max_delay(std::time::Duration::from_millis(
                self.retry_delay_ms.saturating_mul(growth),
            ))
            .jitter(self.jitter)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field path (e.g., `astronomy.api_url`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rooster")
        .join("rooster.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;

    fn fields(err: ConfigError) -> Vec<String> {
        match err {
            ConfigError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.scheduler.astronomy_max_age, 21_600);
        assert_eq!(config.scheduler.fallback_offset, 3_600);
        assert_eq!(config.astronomy.refresh_interval, 82_800);
        assert_eq!(config.astronomy.api_url, DEFAULT_API_URL);
        assert_eq!(config.storage.path, rooster_store::default_db_path());
        assert!(config.location.location().is_unset());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [location]
            latitude = 52.52
            longitude = 13.405

            [scheduler]
            utc_offset_minutes = 60
            sampling = "random"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.location.location(), Location::new(52.52, 13.405));
        assert_eq!(config.scheduler.sampling, BetweenSampling::Random);
        assert_eq!(config.scheduler.fallback_offset, 3_600);
        assert_eq!(config.astronomy, AstronomyConfig::default());
    }

    #[test]
    fn test_calculator_settings() {
        let scheduler = SchedulerConfig {
            utc_offset_minutes: Some(-330),
            astronomy_max_age: 60,
            fallback_offset: 120,
            ..Default::default()
        };
        let calc = scheduler.calculator();
        assert_eq!(
            calc.zone,
            LocalZone::Fixed(UtcOffset::from_hms(-5, -30, 0).unwrap())
        );
        assert_eq!(calc.max_astronomy_age, Duration::minutes(1));
        assert_eq!(calc.fallback_offset, Duration::minutes(2));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let config = Config {
            scheduler: SchedulerConfig {
                utc_offset_minutes: Some(20 * 60),
                fallback_offset: 0,
                ..Default::default()
            },
            location: LocationConfig {
                latitude: 91.0,
                longitude: -181.0,
            },
            storage: StorageConfig {
                path: PathBuf::new(),
            },
            astronomy: AstronomyConfig {
                api_url: "ftp://example.com".to_string(),
                refresh_interval: 60,
                ..Default::default()
            },
        };
        assert_eq!(
            fields(config.validate().unwrap_err()),
            vec![
                "scheduler.utc_offset_minutes",
                "scheduler.fallback_offset",
                "location.latitude",
                "location.longitude",
                "storage.path",
                "astronomy.api_url",
                "astronomy.refresh_interval",
            ]
        );
    }

    #[test]
    fn test_validation_error_display() {
        let err = ConfigError::Validation(vec![ValidationError {
            field: "astronomy.timeout".to_string(),
            message: "timeout must be positive".to_string(),
        }]);
        assert_eq!(
            err.to_string(),
            "Configuration validation failed:\n  - astronomy.timeout: timeout must be positive"
        );
    }

    #[test]
    fn test_zone_defaults_to_system() {
        let scheduler = SchedulerConfig::default();
        assert_eq!(scheduler.utc_offset_minutes, None);
        assert_eq!(scheduler.zone(), LocalZone::System);
        assert_eq!(scheduler.calculator().zone, LocalZone::System);
        assert_eq!(scheduler.missed_grace(), Duration::minutes(15));

        // An unset override is left out of the written file.
        let written = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(!written.contains("utc_offset_minutes"));
    }

    #[test]
    fn test_retry_policy() {
        let retry = AstronomyConfig::default().retry();
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.initial_delay, std::time::Duration::from_secs(2));
        assert_eq!(retry.max_delay, std::time::Duration::from_secs(4));
        assert_eq!(retry.backoff, Backoff::Linear);
        assert!(!retry.jitter);
    }

    #[test]
    fn test_exponential_retry_from_toml() {
        let toml = r#"
            [astronomy]
            max_retries = 4
            retry_delay_ms = 500
            backoff = "exponential"
            jitter = true
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.astronomy.backoff, BackoffKind::Exponential);

        let retry = config.astronomy.retry();
        assert_eq!(retry.backoff, Backoff::Exponential(2.0));
        assert_eq!(retry.max_delay, std::time::Duration::from_secs(4));
        assert!(retry.jitter);
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("rooster.toml");

        let config = Config {
            location: LocationConfig {
                latitude: -33.87,
                longitude: 151.21,
            },
            storage: StorageConfig {
                path: PathBuf::from("/tmp/rooster-test.db"),
            },
            ..Default::default()
        };

        config.save(&config_path).unwrap();
        let loaded = Config::load_validated(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = Config::load(temp_dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_invalid_toml() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("bad.toml");
        std::fs::write(&path, "[scheduler\nfallback_offset = ").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
