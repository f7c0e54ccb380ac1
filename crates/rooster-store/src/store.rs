//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use rooster_types::{Alarm, AlarmId, AstronomyData, Location, WeekdayMask};

use crate::error::{Error, Result};
use crate::schema;

const ALARM_COLUMNS: &str = "id, label, enabled, mode, relative1, relative2, time1, time2, \
     weekdays, calculated_time, needs_recompute, snooze_enabled, snooze_duration, \
     snooze_count, volume, vibrate, gradual_volume, ringtone_uri";

/// SQLite-based store for alarms and astronomy data.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // === Alarm operations ===

    /// Insert a new alarm. The id on `alarm` is ignored; the stored alarm
    /// with its assigned id is returned.
    pub fn insert_alarm(&self, alarm: &Alarm) -> Result<Alarm> {
        self.conn.execute(
            "INSERT INTO alarms (label, enabled, mode, relative1, relative2, time1, time2,
                weekdays, calculated_time, needs_recompute, snooze_enabled, snooze_duration,
                snooze_count, volume, vibrate, gradual_volume, ringtone_uri)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                rooster_types::sanitize_label(&alarm.label),
                alarm.enabled,
                alarm.mode.as_str(),
                alarm.relative1.as_str(),
                alarm.relative2.as_str(),
                alarm.time1,
                alarm.time2,
                alarm.weekdays.bits(),
                alarm.calculated_time,
                alarm.needs_recompute,
                alarm.snooze_enabled,
                alarm.snooze_duration_minutes,
                alarm.snooze_count,
                alarm.volume,
                alarm.vibrate,
                alarm.gradual_volume,
                alarm.ringtone_uri,
            ],
        )?;

        let id = AlarmId(self.conn.last_insert_rowid());
        debug!("Inserted alarm {}", id);
        self.get_alarm(id)?.ok_or(Error::AlarmNotFound(id))
    }

    /// Get an alarm by id.
    pub fn get_alarm(&self, id: AlarmId) -> Result<Option<Alarm>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM alarms WHERE id = ?", ALARM_COLUMNS))?;
        let alarm = stmt.query_row([id.0], row_to_alarm).optional()?;
        Ok(alarm)
    }

    /// List all alarms ordered by id.
    pub fn list_alarms(&self) -> Result<Vec<Alarm>> {
        self.query_alarms(&format!("SELECT {} FROM alarms ORDER BY id", ALARM_COLUMNS))
    }

    /// List enabled alarms ordered by next trigger time.
    pub fn list_enabled(&self) -> Result<Vec<Alarm>> {
        self.query_alarms(&format!(
            "SELECT {} FROM alarms WHERE enabled = 1 ORDER BY calculated_time, id",
            ALARM_COLUMNS
        ))
    }

    fn query_alarms(&self, sql: &str) -> Result<Vec<Alarm>> {
        let mut stmt = self.conn.prepare(sql)?;
        let alarms = stmt
            .query_map([], row_to_alarm)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(alarms)
    }

    /// Replace every field of a stored alarm.
    pub fn update_alarm(&self, alarm: &Alarm) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE alarms SET
                label = ?2, enabled = ?3, mode = ?4, relative1 = ?5, relative2 = ?6,
                time1 = ?7, time2 = ?8, weekdays = ?9, calculated_time = ?10,
                needs_recompute = ?11, snooze_enabled = ?12, snooze_duration = ?13,
                snooze_count = ?14, volume = ?15, vibrate = ?16, gradual_volume = ?17,
                ringtone_uri = ?18
             WHERE id = ?1",
            params![
                alarm.id.0,
                rooster_types::sanitize_label(&alarm.label),
                alarm.enabled,
                alarm.mode.as_str(),
                alarm.relative1.as_str(),
                alarm.relative2.as_str(),
                alarm.time1,
                alarm.time2,
                alarm.weekdays.bits(),
                alarm.calculated_time,
                alarm.needs_recompute,
                alarm.snooze_enabled,
                alarm.snooze_duration_minutes,
                alarm.snooze_count,
                alarm.volume,
                alarm.vibrate,
                alarm.gradual_volume,
                alarm.ringtone_uri,
            ],
        )?;
        if changed == 0 {
            return Err(Error::AlarmNotFound(alarm.id));
        }
        Ok(())
    }

    /// Write the next trigger instant for an alarm.
    pub fn update_calculated_time(
        &self,
        id: AlarmId,
        calculated_time: i64,
        needs_recompute: bool,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE alarms SET calculated_time = ?2, needs_recompute = ?3 WHERE id = ?1",
            params![id.0, calculated_time, needs_recompute],
        )?;
        if changed == 0 {
            return Err(Error::AlarmNotFound(id));
        }
        Ok(())
    }

    /// Enable or disable an alarm.
    pub fn set_enabled(&self, id: AlarmId, enabled: bool) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE alarms SET enabled = ?2 WHERE id = ?1",
            params![id.0, enabled],
        )?;
        if changed == 0 {
            return Err(Error::AlarmNotFound(id));
        }
        Ok(())
    }

    /// Delete an alarm. Returns whether a row was removed.
    pub fn delete_alarm(&self, id: AlarmId) -> Result<bool> {
        let changed = self.conn.execute("DELETE FROM alarms WHERE id = ?", [id.0])?;
        if changed > 0 {
            info!("Deleted alarm {}", id);
        }
        Ok(changed > 0)
    }

    // === Astronomy operations ===

    /// Replace the stored astronomy data.
    pub fn save_astronomy(&self, data: &AstronomyData) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO astronomy_data (id, latitude, longitude, sunrise, sunset,
                solar_noon, civil_dawn, civil_dusk, nautical_dawn, nautical_dusk, astro_dawn,
                astro_dusk, last_updated, day_length)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                data.location.latitude,
                data.location.longitude,
                data.sunrise,
                data.sunset,
                data.solar_noon,
                data.civil_dawn,
                data.civil_dusk,
                data.nautical_dawn,
                data.nautical_dusk,
                data.astro_dawn,
                data.astro_dusk,
                data.last_updated,
                data.day_length,
            ],
        )?;
        debug!("Saved astronomy data (updated {})", data.last_updated);
        Ok(())
    }

    /// Load the stored astronomy data, if any.
    pub fn load_astronomy(&self) -> Result<Option<AstronomyData>> {
        let data = self
            .conn
            .query_row(
                "SELECT latitude, longitude, sunrise, sunset, solar_noon, civil_dawn, civil_dusk,
                    nautical_dawn, nautical_dusk, astro_dawn, astro_dusk, last_updated, day_length
                 FROM astronomy_data WHERE id = 1",
                [],
                |row| {
                    Ok(AstronomyData {
                        location: Location::new(row.get(0)?, row.get(1)?),
                        sunrise: row.get(2)?,
                        sunset: row.get(3)?,
                        solar_noon: row.get(4)?,
                        civil_dawn: row.get(5)?,
                        civil_dusk: row.get(6)?,
                        nautical_dawn: row.get(7)?,
                        nautical_dusk: row.get(8)?,
                        astro_dawn: row.get(9)?,
                        astro_dusk: row.get(10)?,
                        last_updated: row.get(11)?,
                        day_length: row.get(12)?,
                    })
                },
            )
            .optional()?;
        Ok(data)
    }
}

fn row_to_alarm(row: &Row<'_>) -> rusqlite::Result<Alarm> {
    Ok(Alarm {
        id: AlarmId(row.get(0)?),
        label: row.get(1)?,
        enabled: row.get(2)?,
        mode: parse_column(row, 3)?,
        relative1: parse_column(row, 4)?,
        relative2: parse_column(row, 5)?,
        time1: row.get(6)?,
        time2: row.get(7)?,
        weekdays: WeekdayMask::from_bits(row.get(8)?),
        calculated_time: row.get(9)?,
        needs_recompute: row.get(10)?,
        snooze_enabled: row.get(11)?,
        snooze_duration_minutes: row.get(12)?,
        snooze_count: row.get(13)?,
        volume: row.get(14)?,
        vibrate: row.get(15)?,
        gradual_volume: row.get(16)?,
        ringtone_uri: row.get(17)?,
    })
}

/// Parse a text column through `FromStr`, reporting failures as conversion
/// errors on that column.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = rooster_types::ParseError>,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
