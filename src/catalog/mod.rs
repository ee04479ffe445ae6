//! Reference catalog seeding.
//!
//! A catalog converges to one row per natural key no matter how many times
//! it is seeded. The row-count threshold only short-circuits the scan once a
//! catalog is mature; the natural-key check inside the transaction is what
//! prevents duplicates.

pub mod admin;
pub mod reference;
pub mod sample;

pub use admin::*;
pub use reference::*;
pub use sample::*;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;

use crate::db::{validate_identifier, DatabaseError};

/// Where a catalog lives and how its rows are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Catalog {
    pub name: &'static str,
    pub table: &'static str,
    pub key_columns: &'static [&'static str],
    pub attribute_columns: &'static [&'static str],
    /// Row count at which seeding is skipped without looking at keys.
    /// `None` always takes the natural-key path.
    pub threshold: Option<i64>,
}

impl Catalog {
    pub const fn with_threshold(self, threshold: i64) -> Self {
        Self {
            threshold: Some(threshold),
            ..self
        }
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        validate_identifier(self.table)?;
        for column in self.key_columns.iter().chain(self.attribute_columns) {
            validate_identifier(column)?;
        }
        if self.key_columns.is_empty() {
            return Err(DatabaseError::InvalidIdentifier(format!(
                "catalog {} has no natural key",
                self.name
            )));
        }
        Ok(())
    }

    fn exists_sql(&self) -> String {
        let predicate = self
            .key_columns
            .iter()
            .enumerate()
            .map(|(i, column)| format!("{column} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!("SELECT 1 FROM {} WHERE {predicate} LIMIT 1", self.table)
    }

    fn insert_sql(&self) -> String {
        let columns: Vec<&str> = self
            .key_columns
            .iter()
            .chain(self.attribute_columns)
            .copied()
            .collect();
        let placeholders = (1..=columns.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.table,
            columns.join(", ")
        )
    }
}

/// A reference row: natural key values first, then attribute values, each in
/// the column order of its [`Catalog`].
pub trait CatalogEntry {
    fn natural_key(&self) -> Vec<Value>;
    fn attributes(&self) -> Vec<Value>;

    /// Human-readable key for logs and errors.
    fn key_label(&self) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SeedOutcome {
    /// The catalog already held at least `threshold` rows.
    SkippedThreshold { rows: i64 },
    Seeded {
        inserted: usize,
        already_present: usize,
    },
}

/// Seed one catalog. All inserts commit together or not at all.
pub fn seed_catalog<E: CatalogEntry>(
    conn: &Connection,
    catalog: &Catalog,
    entries: &[E],
) -> Result<SeedOutcome, DatabaseError> {
    catalog.validate()?;

    // Failures outside a single entry are labelled with the step instead.
    let step_error = |step: &str, source: rusqlite::Error| DatabaseError::CatalogSeedFailed {
        catalog: catalog.name.to_string(),
        natural_key: format!("<{step}>"),
        source,
    };

    let rows: i64 = conn
        .query_row(&format!("SELECT COUNT(*) FROM {}", catalog.table), [], |row| {
            row.get(0)
        })
        .map_err(|e| step_error("count", e))?;
    if let Some(threshold) = catalog.threshold {
        if rows >= threshold {
            tracing::debug!(catalog = catalog.name, rows, threshold, "Catalog mature, skipping");
            return Ok(SeedOutcome::SkippedThreshold { rows });
        }
    }

    let seed_error = |entry: &E, source: rusqlite::Error| DatabaseError::CatalogSeedFailed {
        catalog: catalog.name.to_string(),
        natural_key: entry.key_label(),
        source,
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| step_error("begin", e))?;
    let mut inserted = 0;
    let mut already_present = 0;
    {
        let mut exists_stmt = tx
            .prepare(&catalog.exists_sql())
            .map_err(|e| step_error("prepare", e))?;
        let mut insert_stmt = tx
            .prepare(&catalog.insert_sql())
            .map_err(|e| step_error("prepare", e))?;
        let expected_values = catalog.key_columns.len() + catalog.attribute_columns.len();

        for entry in entries {
            let key = entry.natural_key();
            if key.len() != catalog.key_columns.len() {
                return Err(seed_error(
                    entry,
                    rusqlite::Error::InvalidParameterCount(key.len(), catalog.key_columns.len()),
                ));
            }
            let present = exists_stmt
                .exists(params_from_iter(key.iter()))
                .map_err(|e| seed_error(entry, e))?;
            if present {
                already_present += 1;
                continue;
            }

            let mut values = key;
            values.extend(entry.attributes());
            if values.len() != expected_values {
                return Err(seed_error(
                    entry,
                    rusqlite::Error::InvalidParameterCount(values.len(), expected_values),
                ));
            }
            insert_stmt
                .execute(params_from_iter(values.iter()))
                .map_err(|e| seed_error(entry, e))?;
            inserted += 1;
        }
    }
    tx.commit().map_err(|e| step_error("commit", e))?;

    tracing::info!(catalog = catalog.name, inserted, already_present, "Catalog seeded");
    Ok(SeedOutcome::Seeded {
        inserted,
        already_present,
    })
}
