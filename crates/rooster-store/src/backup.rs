//! JSON export and import of alarm definitions.

use std::path::Path;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, warn};

use rooster_types::{Alarm, AlarmId};

use crate::error::{Error, Result};
use crate::store::Store;

/// Current backup format version.
pub const BACKUP_VERSION: u32 = 1;

/// A portable snapshot of every alarm definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmBackup {
    pub version: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
    pub alarms: Vec<Alarm>,
}

/// Outcome of an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportResult {
    /// Ids assigned to the newly inserted alarms.
    pub imported: Vec<AlarmId>,
    /// Entries that matched an existing alarm and were left out.
    pub skipped: usize,
}

impl Store {
    /// Snapshot all alarms.
    pub fn export_backup(&self) -> Result<AlarmBackup> {
        Ok(AlarmBackup {
            version: BACKUP_VERSION,
            exported_at: OffsetDateTime::now_utc(),
            alarms: self.list_alarms()?,
        })
    }

    /// Serialize all alarms as pretty-printed JSON.
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_backup()?)?)
    }

    /// Write a JSON backup to `path`.
    pub fn export_to_path<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let backup = self.export_backup()?;
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(&backup)?)?;
        info!(
            "Exported {} alarms to {}",
            backup.alarms.len(),
            path.as_ref().display()
        );
        Ok(backup.alarms.len())
    }

    /// Import alarms from a backup.
    ///
    /// Imported alarms get fresh ids and an unset trigger time so the
    /// scheduler computes them from scratch. An entry whose definition
    /// matches an existing alarm is skipped.
    pub fn import_backup(&self, backup: &AlarmBackup) -> Result<ImportResult> {
        if backup.version > BACKUP_VERSION {
            return Err(Error::UnsupportedBackup(backup.version));
        }

        let mut existing = self.list_alarms()?;
        let mut result = ImportResult::default();

        for alarm in &backup.alarms {
            if existing.iter().any(|e| same_definition(e, alarm)) {
                result.skipped += 1;
                continue;
            }
            let fresh = Alarm {
                calculated_time: 0,
                needs_recompute: false,
                ..alarm.clone()
            };
            let stored = self.insert_alarm(&fresh)?;
            result.imported.push(stored.id);
            existing.push(stored);
        }

        if result.skipped > 0 {
            warn!("Skipped {} duplicate alarms during import", result.skipped);
        }
        info!("Imported {} alarms", result.imported.len());
        Ok(result)
    }

    /// Import alarms from a JSON string.
    pub fn import_json(&self, json: &str) -> Result<ImportResult> {
        let backup: AlarmBackup = serde_json::from_str(json)?;
        self.import_backup(&backup)
    }

    /// Import alarms from a JSON backup file.
    pub fn import_from_path<P: AsRef<Path>>(&self, path: P) -> Result<ImportResult> {
        let json = std::fs::read_to_string(path)?;
        self.import_json(&json)
    }
}

/// Two alarms describe the same thing when everything but the id and the
/// scheduling state agrees.
fn same_definition(a: &Alarm, b: &Alarm) -> bool {
    a.label == b.label
        && a.mode == b.mode
        && a.relative1 == b.relative1
        && a.relative2 == b.relative2
        && a.time1 == b.time1
        && a.time2 == b.time2
        && a.weekdays == b.weekdays
}
