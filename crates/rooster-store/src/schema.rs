//! Database schema.

use rusqlite::Connection;
use tracing::info;

use crate::error::{Error, Result};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize(conn: &Connection) -> Result<()> {
    match get_schema_version(conn)? {
        0 => {
            create_schema_v1(conn)?;
            info!("Created database schema version {}", SCHEMA_VERSION);
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        newer => Err(Error::UnsupportedSchema(newer)),
    }
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 =
        conn.query_row("SELECT version FROM schema_version", [], |row| row.get(0))?;

    Ok(version)
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?)",
        [version],
    )?;
    Ok(())
}

/// Create the initial schema (version 1).
fn create_schema_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL
        );

        -- AUTOINCREMENT keeps ids from being reused after a delete
        CREATE TABLE IF NOT EXISTS alarms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL DEFAULT '',
            enabled INTEGER NOT NULL,
            mode TEXT NOT NULL,
            relative1 TEXT NOT NULL,
            relative2 TEXT NOT NULL,
            time1 INTEGER NOT NULL,
            time2 INTEGER NOT NULL,
            weekdays INTEGER NOT NULL,
            calculated_time INTEGER NOT NULL DEFAULT 0,
            -- Set when calculated_time came from stale or missing astronomy data
            needs_recompute INTEGER NOT NULL DEFAULT 0,
            snooze_enabled INTEGER NOT NULL,
            snooze_duration INTEGER NOT NULL,
            snooze_count INTEGER NOT NULL,
            volume INTEGER NOT NULL,
            vibrate INTEGER NOT NULL,
            gradual_volume INTEGER NOT NULL,
            ringtone_uri TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_alarms_enabled_time
            ON alarms(enabled, calculated_time);

        -- Single row, replaced wholesale on every refresh
        CREATE TABLE IF NOT EXISTS astronomy_data (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            latitude REAL NOT NULL,
            longitude REAL NOT NULL,
            sunrise INTEGER NOT NULL,
            sunset INTEGER NOT NULL,
            solar_noon INTEGER NOT NULL,
            civil_dawn INTEGER NOT NULL,
            civil_dusk INTEGER NOT NULL,
            nautical_dawn INTEGER NOT NULL,
            nautical_dusk INTEGER NOT NULL,
            astro_dawn INTEGER NOT NULL,
            astro_dusk INTEGER NOT NULL,
            last_updated INTEGER NOT NULL,
            day_length INTEGER NOT NULL
        );
        "#,
    )?;

    set_schema_version(conn, 1)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    fn has_column(conn: &Connection, table: &str, column: &str) -> bool {
        conn.prepare(&format!("PRAGMA table_info({})", table))
            .unwrap()
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .any(|name| name.unwrap() == column)
    }

    #[test]
    fn test_initialize_fresh_database() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();

        let tables = table_names(&conn);
        assert!(tables.contains(&"alarms".to_string()));
        assert!(tables.contains(&"astronomy_data".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
        assert!(has_column(&conn, "alarms", "needs_recompute"));
    }

    #[test]
    fn test_schema_version_tracking() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), 0);

        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);

        // Re-running is a no-op.
        initialize(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();

        assert!(matches!(
            initialize(&conn),
            Err(Error::UnsupportedSchema(v)) if v == SCHEMA_VERSION + 1
        ));
    }
}
