//! Alarm scheduling daemon for the Rooster alarm clock.
//!
//! This crate wires the [`rooster_core`] engine to its production
//! collaborators:
//! - a SQLite store ([`SqliteAlarmStore`] over [`rooster_store::Store`])
//! - in-process tokio timers ([`TokioTimer`])
//! - astronomy data fetched from a sunrise-sunset style API
//!   ([`AstronomyFetcher`]) with retry and offline fallback
//!
//! The [`Runner`] reschedules every enabled alarm at startup, handles fired
//! timers, refreshes astronomy data on demand and on a fixed interval, and
//! recomputes approximate alarms after each successful refresh.
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/rooster/rooster.toml`:
//!
//! ```toml
//! [scheduler]
//! # utc_offset_minutes = 60   # fixed override; the system zone otherwise
//! astronomy_max_age = 21600   # seconds
//! fallback_offset = 3600      # seconds
//! sampling = "seeded"         # or "random"
//! reload_interval = 300       # seconds
//! missed_grace = 900          # seconds
//!
//! [location]
//! latitude = 52.52
//! longitude = 13.405
//!
//! [storage]
//! path = "~/.local/share/rooster/alarms.db"
//!
//! [astronomy]
//! api_url = "https://api.sunrise-sunset.org/json"
//! refresh_interval = 82800    # seconds
//! timeout = 10
//! max_retries = 2
//! retry_delay_ms = 2000
//! backoff = "linear"          # or "exponential"
//! jitter = false
//! ```

pub mod astronomy;
pub mod config;
pub mod error;
pub mod retry;
pub mod runner;
pub mod state;
pub mod store_adapter;
pub mod timer;

pub use astronomy::{AstronomyDataResult, AstronomyFetcher};
pub use config::{
    AstronomyConfig, BackoffKind, Config, ConfigError, LocationConfig, SchedulerConfig, StorageConfig,
    ValidationError,
};
pub use error::{Error, FetchError, Result};
pub use runner::Runner;
pub use state::{AppState, Channels};
pub use store_adapter::SqliteAlarmStore;
pub use timer::TokioTimer;
