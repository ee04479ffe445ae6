//! Identifier backfill — invoice numbers and medical record numbers for rows
//! created before the numbering scheme existed.
//!
//! Meant to run once, at startup, from a single process. New rows get their
//! identifier from the application when they are created.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::{validate_identifier, DatabaseError};

/// Storage-assigned key that fixes creation order.
const KEY_COLUMN: &str = "id";

static PREFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9]{0,15}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierScope {
    /// Numbering restarts every calendar year: `INV-2025-00001`.
    Year(i32),
    /// One sequence forever: `MRN-000001`.
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierScheme {
    pub prefix: String,
    pub scope: IdentifierScope,
    /// Minimum digits; larger numbers widen rather than wrap.
    pub width: usize,
}

impl IdentifierScheme {
    pub fn yearly(prefix: &str, year: i32) -> Self {
        Self {
            prefix: prefix.to_string(),
            scope: IdentifierScope::Year(year),
            width: 5,
        }
    }

    pub fn global(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            scope: IdentifierScope::Global,
            width: 6,
        }
    }

    /// Leading part shared by every identifier in the current scope.
    fn stem(&self) -> String {
        match self.scope {
            IdentifierScope::Year(year) => format!("{}-{year}-", self.prefix),
            IdentifierScope::Global => format!("{}-", self.prefix),
        }
    }

    pub fn format(&self, sequence: u64) -> String {
        format!("{}{sequence:0width$}", self.stem(), width = self.width)
    }

    fn matcher(&self) -> Result<Regex, DatabaseError> {
        let pattern = format!(r"^{}(\d{{{},}})$", regex::escape(&self.stem()), self.width);
        Regex::new(&pattern).map_err(|e| DatabaseError::InvalidIdentifier(e.to_string()))
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        if !PREFIX.is_match(&self.prefix) {
            return Err(DatabaseError::InvalidIdentifier(format!(
                "identifier prefix '{}'",
                self.prefix
            )));
        }
        if self.width == 0 {
            return Err(DatabaseError::InvalidIdentifier("identifier width 0".into()));
        }
        Ok(())
    }
}

impl fmt::Display for IdentifierScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stem(), "N".repeat(self.width))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Rows already carrying a well-formed identifier for this scope.
    pub existing: usize,
    pub assigned: usize,
    pub first: Option<String>,
    pub last: Option<String>,
}

/// Give every row with a NULL or empty identifier the next number in
/// creation order.
///
/// Numbering resumes after the rows already identified in this scope, so an
/// interrupted pass picks up where it stopped. Each row is its own update:
/// when one fails, the rows before it keep their identifiers and the error
/// names the failing row.
pub fn backfill_identifiers(
    conn: &Connection,
    table: &str,
    column: &str,
    scheme: &IdentifierScheme,
) -> Result<BackfillReport, DatabaseError> {
    validate_identifier(table)?;
    validate_identifier(column)?;
    scheme.validate()?;

    let (existing, highest) = scan_existing(conn, table, column, scheme)?;
    if highest > existing as u64 {
        tracing::debug!(table, existing, highest, "Identifier sequence has gaps; continuing after highest");
    }
    // None once the sequence has run past u64::MAX.
    let mut next = highest.max(existing as u64).checked_add(1);

    let pending: Vec<i64> = {
        let mut stmt = conn.prepare(&format!(
            "SELECT {KEY_COLUMN} FROM {table}
             WHERE {column} IS NULL OR {column} = ''
             ORDER BY {KEY_COLUMN}"
        ))?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let mut report = BackfillReport {
        existing,
        ..BackfillReport::default()
    };
    if pending.is_empty() {
        tracing::debug!(table, column, "No rows awaiting identifiers");
        return Ok(report);
    }

    let mut update = conn.prepare(&format!(
        "UPDATE {table} SET {column} = ?1
         WHERE {KEY_COLUMN} = ?2 AND ({column} IS NULL OR {column} = '')"
    ))?;
    for (row_index, row_id) in pending.into_iter().enumerate() {
        let sequence = next.ok_or_else(|| DatabaseError::IdentifierSpaceExhausted {
            table: table.to_string(),
            scheme: scheme.to_string(),
        })?;
        let identifier = scheme.format(sequence);
        let changed = update
            .execute(params![identifier, row_id])
            .map_err(|source| DatabaseError::BackfillFailed {
                table: table.to_string(),
                row_id,
                row_index,
                source,
            })?;
        // Identified since the scan: leave it alone and keep the number.
        if changed == 0 {
            continue;
        }
        next = sequence.checked_add(1);
        report.assigned += 1;
        if report.first.is_none() {
            report.first = Some(identifier.clone());
        }
        report.last = Some(identifier);
    }

    tracing::info!(
        table,
        column,
        scheme = %scheme,
        assigned = report.assigned,
        "Identifiers backfilled"
    );
    Ok(report)
}

/// Count well-formed identifiers in scope and find the highest sequence used.
fn scan_existing(
    conn: &Connection,
    table: &str,
    column: &str,
    scheme: &IdentifierScheme,
) -> Result<(usize, u64), DatabaseError> {
    let matcher = scheme.matcher()?;
    let mut stmt = conn.prepare(&format!(
        "SELECT {column} FROM {table} WHERE {column} LIKE ?1"
    ))?;
    // Prefix and year carry no LIKE wildcards.
    let like = format!("{}%", scheme.stem());
    let values = stmt
        .query_map(params![like], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut count = 0;
    let mut highest = 0;
    for value in values {
        let Some(sequence) = matcher
            .captures(&value)
            .and_then(|c| c[1].parse::<u64>().ok())
        else {
            continue;
        };
        count += 1;
        highest = highest.max(sequence);
    }
    Ok((count, highest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;

    fn invoices_db(rows: &[&str]) -> Connection {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(
            "CREATE TABLE invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_name TEXT DEFAULT '',
                invoice_number TEXT DEFAULT ''
            )",
        )
        .unwrap();
        for number in rows {
            conn.execute(
                "INSERT INTO invoices (invoice_number) VALUES (?1)",
                [number],
            )
            .unwrap();
        }
        conn
    }

    fn numbers(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT COALESCE(invoice_number, '') FROM invoices ORDER BY id")
            .unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn inv_2025() -> IdentifierScheme {
        IdentifierScheme::yearly("INV", 2025)
    }

    #[test]
    fn formats() {
        assert_eq!(inv_2025().format(1), "INV-2025-00001");
        assert_eq!(inv_2025().format(123456), "INV-2025-123456");
        assert_eq!(IdentifierScheme::global("MRN").format(42), "MRN-000042");
        assert_eq!(inv_2025().to_string(), "INV-2025-NNNNN");
    }

    #[test]
    fn five_unnumbered_invoices() {
        let conn = invoices_db(&["", "", "", "", ""]);
        let report = backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        assert_eq!(report.assigned, 5);
        assert_eq!(report.first.as_deref(), Some("INV-2025-00001"));
        assert_eq!(report.last.as_deref(), Some("INV-2025-00005"));
        assert_eq!(
            numbers(&conn),
            vec![
                "INV-2025-00001",
                "INV-2025-00002",
                "INV-2025-00003",
                "INV-2025-00004",
                "INV-2025-00005",
            ]
        );
    }

    #[test]
    fn null_identifiers_are_backfilled() {
        let conn = invoices_db(&[]);
        conn.execute_batch("INSERT INTO invoices (invoice_number) VALUES (NULL), (NULL)")
            .unwrap();
        backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        assert_eq!(numbers(&conn), vec!["INV-2025-00001", "INV-2025-00002"]);
    }

    #[test]
    fn numbered_rows_are_not_disturbed() {
        let conn = invoices_db(&["INV-2025-00001", "", "INV-2024-00007", "legacy-17", "", "INV-2025-00002"]);
        let report = backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        assert_eq!(report.existing, 2);
        assert_eq!(report.assigned, 2);
        assert_eq!(
            numbers(&conn),
            vec![
                "INV-2025-00001",
                "INV-2025-00003",
                "INV-2024-00007",
                "legacy-17",
                "INV-2025-00004",
                "INV-2025-00002",
            ]
        );
    }

    #[test]
    fn second_pass_is_a_noop() {
        let conn = invoices_db(&["", "", ""]);
        backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        let before = numbers(&conn);
        let report = backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        assert_eq!(report.assigned, 0);
        assert_eq!(report.existing, 3);
        assert_eq!(numbers(&conn), before);
    }

    #[test]
    fn new_rows_continue_the_sequence() {
        let conn = invoices_db(&["", ""]);
        backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        conn.execute("INSERT INTO invoices (invoice_number) VALUES ('')", [])
            .unwrap();
        let report = backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        assert_eq!(report.first.as_deref(), Some("INV-2025-00003"));
    }

    #[test]
    fn interrupted_pass_resumes_without_collision() {
        let conn = invoices_db(&["", "", "", "", ""]);
        conn.execute_batch(
            "CREATE TRIGGER crash_at_third BEFORE UPDATE ON invoices
             WHEN OLD.id = 3
             BEGIN SELECT RAISE(ABORT, 'simulated crash'); END;",
        )
        .unwrap();

        let err = backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap_err();
        match err {
            DatabaseError::BackfillFailed { table, row_id, row_index, .. } => {
                assert_eq!(table, "invoices");
                assert_eq!(row_id, 3);
                assert_eq!(row_index, 2);
            }
            other => panic!("expected BackfillFailed, got {other:?}"),
        }
        assert_eq!(numbers(&conn), vec!["INV-2025-00001", "INV-2025-00002", "", "", ""]);

        conn.execute_batch("DROP TRIGGER crash_at_third").unwrap();
        let report = backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        assert_eq!(report.existing, 2);
        assert_eq!(report.assigned, 3);

        let all = numbers(&conn);
        assert_eq!(
            all,
            vec![
                "INV-2025-00001",
                "INV-2025-00002",
                "INV-2025-00003",
                "INV-2025-00004",
                "INV-2025-00005",
            ]
        );
    }

    #[test]
    fn gaps_from_deleted_rows_never_cause_reuse() {
        // 00002 and 00003 were deleted long ago.
        let conn = invoices_db(&["INV-2025-00001", "INV-2025-00004", "", ""]);
        backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        let all = numbers(&conn);
        assert_eq!(all[2], "INV-2025-00005");
        assert_eq!(all[3], "INV-2025-00006");

        let mut sorted = all.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), all.len());
    }

    #[test]
    fn exhausted_sequence_is_an_error_not_a_wrap() {
        let conn = invoices_db(&["INV-2025-18446744073709551615", ""]);
        let err = backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::IdentifierSpaceExhausted { ref table, .. } if table == "invoices"
        ));
        assert_eq!(numbers(&conn), vec!["INV-2025-18446744073709551615", ""]);
    }

    #[test]
    fn last_number_in_the_sequence_is_still_issued() {
        let conn = invoices_db(&["INV-2025-18446744073709551614", "", ""]);
        let err = backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap_err();
        assert!(matches!(err, DatabaseError::IdentifierSpaceExhausted { .. }));
        assert_eq!(
            numbers(&conn),
            vec!["INV-2025-18446744073709551614", "INV-2025-18446744073709551615", ""]
        );
    }

    #[test]
    fn assignment_follows_creation_order() {
        let conn = invoices_db(&["", "", "", ""]);
        backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        let matcher = inv_2025().matcher().unwrap();
        let sequences: Vec<u64> = numbers(&conn)
            .iter()
            .map(|n| matcher.captures(n).unwrap()[1].parse().unwrap())
            .collect();
        assert!(sequences.windows(2).all(|w| w[1] == w[0] + 1));
    }

    #[test]
    fn year_scopes_are_independent() {
        let conn = invoices_db(&["INV-2024-00001", "INV-2024-00002", ""]);
        backfill_identifiers(&conn, "invoices", "invoice_number", &inv_2025()).unwrap();
        assert_eq!(numbers(&conn)[2], "INV-2025-00001");
    }

    #[test]
    fn global_medical_record_numbers() {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(
            "CREATE TABLE patients (id INTEGER PRIMARY KEY AUTOINCREMENT, name_en TEXT, mrn TEXT);
             INSERT INTO patients (name_en, mrn) VALUES ('A', NULL), ('B', 'MRN-000001'), ('C', NULL);",
        )
        .unwrap();

        let report =
            backfill_identifiers(&conn, "patients", "mrn", &IdentifierScheme::global("MRN")).unwrap();
        assert_eq!(report.existing, 1);
        assert_eq!(report.assigned, 2);

        let mrn_of = |name: &str| -> String {
            conn.query_row("SELECT mrn FROM patients WHERE name_en = ?1", [name], |r| r.get(0))
                .unwrap()
        };
        assert_eq!(mrn_of("A"), "MRN-000002");
        assert_eq!(mrn_of("B"), "MRN-000001");
        assert_eq!(mrn_of("C"), "MRN-000003");
    }

    #[test]
    fn invalid_names_are_rejected() {
        let conn = invoices_db(&[""]);
        assert!(matches!(
            backfill_identifiers(&conn, "invoices; --", "invoice_number", &inv_2025()),
            Err(DatabaseError::InvalidIdentifier(_))
        ));
        assert!(matches!(
            backfill_identifiers(&conn, "invoices", "invoice_number", &IdentifierScheme::yearly("IN-V", 2025)),
            Err(DatabaseError::InvalidIdentifier(_))
        ));
        assert_eq!(numbers(&conn), vec![""]);
    }
}
