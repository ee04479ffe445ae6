//! Settings store — `company_settings` key/value rows.
//!
//! Writes from this crate are insert-if-absent: a value that an operator
//! edited through the application is never overwritten by provisioning.

use rusqlite::{params, Connection};

use super::DatabaseError;

/// Keys every installation carries, created empty on first provisioning.
pub const DEFAULT_SETTING_KEYS: &[&str] = &[
    "company_name_ar",
    "company_name_en",
    "tax_number",
    "address",
    "phone",
    "logo_path",
    "sample_data_inserted",
    "theme",
];

/// Value a sentinel key holds once its guarded work has completed.
pub const SENTINEL_DONE: &str = "1";

/// Get a setting by key. Returns None if the key was never written.
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT setting_value FROM company_settings WHERE setting_key = ?1")?;
    match stmt.query_row([key], |row| row.get::<_, Option<String>>(0)) {
        Ok(val) => Ok(Some(val.unwrap_or_default())),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

/// Insert a setting only if the key is absent. Returns true if a row was written.
pub fn insert_setting_if_absent(
    conn: &Connection,
    key: &str,
    value: &str,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT INTO company_settings (setting_key, setting_value) VALUES (?1, ?2)
         ON CONFLICT(setting_key) DO NOTHING",
        params![key, value],
    )?;
    Ok(inserted > 0)
}

/// Create every default key with an empty value. Existing values stay as they are.
pub fn ensure_default_settings(conn: &Connection) -> Result<usize, DatabaseError> {
    let mut created = 0;
    for key in DEFAULT_SETTING_KEYS {
        if insert_setting_if_absent(conn, key, "")? {
            created += 1;
        }
    }
    if created > 0 {
        tracing::debug!(created, "Default settings keys created");
    }
    Ok(created)
}

pub fn is_sentinel_done(conn: &Connection, key: &str) -> Result<bool, DatabaseError> {
    Ok(get_setting(conn, key)?.as_deref() == Some(SENTINEL_DONE))
}

/// Mark a sentinel as done.
///
/// Inserts the key if absent and promotes the empty placeholder written by
/// [`ensure_default_settings`]. Any other existing value is left untouched,
/// and a done sentinel is never reset.
pub fn mark_sentinel_done(conn: &Connection, key: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO company_settings (setting_key, setting_value) VALUES (?1, ?2)
         ON CONFLICT(setting_key) DO UPDATE SET setting_value = excluded.setting_value
         WHERE company_settings.setting_value IS NULL OR company_settings.setting_value = ''",
        params![key, SENTINEL_DONE],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn settings_db() -> Connection {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(
            "CREATE TABLE company_settings (setting_key TEXT PRIMARY KEY, setting_value TEXT DEFAULT '')",
        )
        .unwrap();
        conn
    }

    #[test]
    fn missing_key_reads_as_none() {
        let conn = settings_db();
        assert_eq!(get_setting(&conn, "theme").unwrap(), None);
    }

    #[test]
    fn insert_if_absent_keeps_existing_value() {
        let conn = settings_db();
        assert!(insert_setting_if_absent(&conn, "theme", "dark").unwrap());
        assert!(!insert_setting_if_absent(&conn, "theme", "light").unwrap());
        assert_eq!(get_setting(&conn, "theme").unwrap().as_deref(), Some("dark"));
    }

    #[test]
    fn default_settings_created_once() {
        let conn = settings_db();
        assert_eq!(ensure_default_settings(&conn).unwrap(), DEFAULT_SETTING_KEYS.len());
        assert_eq!(ensure_default_settings(&conn).unwrap(), 0);
        assert_eq!(get_setting(&conn, "tax_number").unwrap().as_deref(), Some(""));
    }

    #[test]
    fn sentinel_promotes_placeholder() {
        let conn = settings_db();
        ensure_default_settings(&conn).unwrap();
        assert!(!is_sentinel_done(&conn, "sample_data_inserted").unwrap());

        mark_sentinel_done(&conn, "sample_data_inserted").unwrap();
        assert!(is_sentinel_done(&conn, "sample_data_inserted").unwrap());

        // Idempotent
        mark_sentinel_done(&conn, "sample_data_inserted").unwrap();
        assert!(is_sentinel_done(&conn, "sample_data_inserted").unwrap());
    }

    #[test]
    fn sentinel_inserted_when_absent() {
        let conn = settings_db();
        mark_sentinel_done(&conn, "catalog_v2_seeded").unwrap();
        assert!(is_sentinel_done(&conn, "catalog_v2_seeded").unwrap());
    }

    #[test]
    fn sentinel_does_not_overwrite_operator_value() {
        let conn = settings_db();
        insert_setting_if_absent(&conn, "sample_data_inserted", "disabled").unwrap();
        mark_sentinel_done(&conn, "sample_data_inserted").unwrap();
        assert_eq!(
            get_setting(&conn, "sample_data_inserted").unwrap().as_deref(),
            Some("disabled")
        );
    }
}
