use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{params, Connection};

use super::DatabaseError;

/// Plain, unquoted SQL identifier: table, column and index names.
static SQL_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").unwrap());

/// Open a SQLite connection to the given path.
///
/// The schema is not touched here; callers run [`crate::provision::provision`]
/// before handing the connection to the application modules.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    configure_pragmas(&conn)?;
    tracing::debug!(path = %path.display(), "Opened clinic database");
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    Ok(())
}

/// Reject anything that is not a plain identifier before it is spliced into SQL.
pub fn validate_identifier(name: &str) -> Result<(), DatabaseError> {
    if SQL_IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(DatabaseError::InvalidIdentifier(name.to_string()))
    }
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn index_exists(conn: &Connection, index: &str) -> Result<bool, DatabaseError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'index' AND name = ?1",
        params![index],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Column names of a table in declaration order. Empty if the table is absent.
pub fn column_names(conn: &Connection, table: &str) -> Result<Vec<String>, DatabaseError> {
    validate_identifier(table)?;
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64, DatabaseError> {
    validate_identifier(table)?;
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_keys_enabled() {
        let conn = open_memory_database().unwrap();
        let fk: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn identifier_validation() {
        assert!(validate_identifier("invoices").is_ok());
        assert!(validate_identifier("_tmp_1").is_ok());
        assert!(validate_identifier("invoice number").is_err());
        assert!(validate_identifier("1invoices").is_err());
        assert!(validate_identifier("x; DROP TABLE patients").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn introspection_helpers() {
        let conn = open_memory_database().unwrap();
        assert!(!table_exists(&conn, "invoices").unwrap());
        assert!(column_names(&conn, "invoices").unwrap().is_empty());

        conn.execute_batch(
            "CREATE TABLE invoices (id INTEGER PRIMARY KEY, total REAL);
             CREATE INDEX idx_inv_total ON invoices(total);
             INSERT INTO invoices (total) VALUES (10.0), (20.0);",
        )
        .unwrap();

        assert!(table_exists(&conn, "invoices").unwrap());
        assert!(index_exists(&conn, "idx_inv_total").unwrap());
        assert_eq!(column_names(&conn, "invoices").unwrap(), vec!["id", "total"]);
        assert_eq!(count_rows(&conn, "invoices").unwrap(), 2);
    }

    #[test]
    fn database_opens_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.db");
        let conn = open_database(&path).unwrap();
        conn.execute_batch("CREATE TABLE patients (id INTEGER PRIMARY KEY)")
            .unwrap();
        drop(conn);

        let conn2 = open_database(&path).unwrap();
        assert!(table_exists(&conn2, "patients").unwrap());
        let mode: String = conn2
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
