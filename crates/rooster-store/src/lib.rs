//! Local persistence for Rooster alarms.
//!
//! This crate provides SQLite-based storage for alarm definitions, their
//! computed trigger times, and the most recent astronomy data.
//!
//! # Features
//!
//! - Alarm CRUD with ids assigned by the database
//! - Trigger-time updates that flag approximate results for recomputation
//! - A single cached astronomy record, replaced on every refresh
//! - JSON backup export/import
//!
//! # Example
//!
//! ```no_run
//! use rooster_store::Store;
//!
//! let store = Store::open(rooster_store::default_db_path())?;
//! for alarm in store.list_enabled()? {
//!     println!("{} -> {}", alarm.id, alarm.calculated_time);
//! }
//! # Ok::<(), rooster_store::Error>(())
//! ```

mod backup;
mod error;
mod schema;
mod store;

pub use backup::{AlarmBackup, BACKUP_VERSION, ImportResult};
pub use error::{Error, Result};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/rooster/alarms.db`
/// - macOS: `~/Library/Application Support/rooster/alarms.db`
/// - Windows: `C:\Users\<user>\AppData\Local\rooster\alarms.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("rooster")
        .join("alarms.db")
}
