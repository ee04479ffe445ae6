//! Schema evolution — additive, idempotent structural changes.
//!
//! There is no migration ledger. Every declaration is attempted on every run
//! and a failure that means "already there" counts as success, so the live
//! schema is always re-derived from the database itself.

pub mod classify;
pub mod declarations;

pub use classify::{classify_failure, FailureKind};
pub use declarations::CLINIC_SCHEMA;

use std::fmt;

use rusqlite::Connection;
use serde::Serialize;

use crate::db::{column_names, validate_identifier, DatabaseError};

// ═══════════════════════════════════════════════════════════
// Declarations
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Timestamp,
}

impl ColumnType {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Timestamp => "DATETIME",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnDefault {
    None,
    Text(&'static str),
    Integer(i64),
    Real(f64),
    /// Not constant: allowed in CREATE TABLE only.
    CurrentTimestamp,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub ty: ColumnType,
    pub default: ColumnDefault,
    pub not_null: bool,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnDef {
    const fn plain(name: &'static str, ty: ColumnType, default: ColumnDefault) -> Self {
        Self {
            name,
            ty,
            default,
            not_null: false,
            primary_key: false,
            unique: false,
        }
    }

    /// `id INTEGER PRIMARY KEY AUTOINCREMENT`
    pub const fn id() -> Self {
        Self {
            primary_key: true,
            ..Self::plain("id", ColumnType::Integer, ColumnDefault::None)
        }
    }

    /// Text primary key, for key/value tables.
    pub const fn text_key(name: &'static str) -> Self {
        Self {
            primary_key: true,
            ..Self::plain(name, ColumnType::Text, ColumnDefault::None)
        }
    }

    /// `TEXT DEFAULT ''`
    pub const fn text(name: &'static str) -> Self {
        Self::plain(name, ColumnType::Text, ColumnDefault::Text(""))
    }

    pub const fn text_default(name: &'static str, default: &'static str) -> Self {
        Self::plain(name, ColumnType::Text, ColumnDefault::Text(default))
    }

    /// Nullable text with no default.
    pub const fn text_nullable(name: &'static str) -> Self {
        Self::plain(name, ColumnType::Text, ColumnDefault::None)
    }

    pub const fn unique_text(name: &'static str) -> Self {
        Self {
            unique: true,
            ..Self::plain(name, ColumnType::Text, ColumnDefault::None)
        }
    }

    pub const fn integer(name: &'static str, default: i64) -> Self {
        Self::plain(name, ColumnType::Integer, ColumnDefault::Integer(default))
    }

    pub const fn integer_nullable(name: &'static str) -> Self {
        Self::plain(name, ColumnType::Integer, ColumnDefault::None)
    }

    pub const fn real(name: &'static str, default: f64) -> Self {
        Self::plain(name, ColumnType::Real, ColumnDefault::Real(default))
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::plain(name, ColumnType::Timestamp, ColumnDefault::None)
    }

    /// `created_at DATETIME DEFAULT CURRENT_TIMESTAMP`
    pub const fn created_at() -> Self {
        Self::plain(
            "created_at",
            ColumnType::Timestamp,
            ColumnDefault::CurrentTimestamp,
        )
    }

    pub const fn not_null(self) -> Self {
        Self {
            not_null: true,
            ..self
        }
    }

    fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", self.name, self.ty.as_sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.ty == ColumnType::Integer {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        match self.default {
            ColumnDefault::None => {}
            ColumnDefault::Text(value) => {
                sql.push_str(&format!(" DEFAULT '{}'", value.replace('\'', "''")))
            }
            ColumnDefault::Integer(value) => sql.push_str(&format!(" DEFAULT {value}")),
            ColumnDefault::Real(value) => sql.push_str(&format!(" DEFAULT {value:?}")),
            ColumnDefault::CurrentTimestamp => sql.push_str(" DEFAULT CURRENT_TIMESTAMP"),
        }
        sql
    }

    /// Why SQLite would refuse to add this column to an existing table.
    fn add_column_obstacle(&self) -> Option<&'static str> {
        if self.primary_key {
            Some("a primary key cannot be added to an existing table")
        } else if self.unique {
            Some("a UNIQUE column cannot be added to an existing table")
        } else if self.default == ColumnDefault::CurrentTimestamp {
            Some("a column with a non-constant default cannot be added")
        } else if self.not_null && self.default == ColumnDefault::None {
            Some("a NOT NULL column needs a constant default")
        } else {
            None
        }
    }

    /// The closest shape SQLite accepts in `ALTER TABLE ADD COLUMN`.
    fn relaxed_for_add(&self) -> Self {
        let mut relaxed = *self;
        relaxed.unique = false;
        if relaxed.default == ColumnDefault::CurrentTimestamp {
            relaxed.default = ColumnDefault::None;
        }
        if relaxed.not_null && relaxed.default == ColumnDefault::None {
            relaxed.not_null = false;
        }
        relaxed
    }
}

/// One declared structural element.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    CreateTable {
        table: &'static str,
        columns: &'static [ColumnDef],
    },
    AddColumn {
        table: &'static str,
        column: ColumnDef,
    },
    CreateIndex {
        name: &'static str,
        table: &'static str,
        columns: &'static [&'static str],
        unique: bool,
    },
}

impl SchemaChange {
    pub fn table(&self) -> &'static str {
        match self {
            Self::CreateTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::CreateIndex { table, .. } => *table,
        }
    }

    fn to_sql(&self) -> String {
        match self {
            Self::CreateTable { table, columns } => {
                let body = columns
                    .iter()
                    .map(ColumnDef::to_sql)
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("CREATE TABLE {table} ({body})")
            }
            Self::AddColumn { table, column } => {
                format!("ALTER TABLE {table} ADD COLUMN {}", column.to_sql())
            }
            Self::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => {
                let kind = if *unique { "UNIQUE INDEX" } else { "INDEX" };
                format!("CREATE {kind} {name} ON {table}({})", columns.join(", "))
            }
        }
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        let malformed = |reason: String| DatabaseError::MalformedDeclaration {
            declaration: self.to_string(),
            reason,
        };
        let check = |name: &str| {
            validate_identifier(name)
                .map_err(|_| malformed(format!("'{name}' is not a plain identifier")))
        };

        check(self.table())?;
        match self {
            Self::CreateTable { columns, .. } => {
                if columns.is_empty() {
                    return Err(malformed("table declares no columns".into()));
                }
                for (i, column) in columns.iter().enumerate() {
                    check(column.name)?;
                    if columns[..i]
                        .iter()
                        .any(|c| c.name.eq_ignore_ascii_case(column.name))
                    {
                        return Err(malformed(format!("column {} declared twice", column.name)));
                    }
                }
                if columns.iter().filter(|c| c.primary_key).count() > 1 {
                    return Err(malformed("more than one primary key column".into()));
                }
            }
            Self::AddColumn { column, .. } => {
                check(column.name)?;
                if let Some(reason) = column.add_column_obstacle() {
                    return Err(malformed(reason.into()));
                }
            }
            Self::CreateIndex { name, columns, .. } => {
                check(*name)?;
                if columns.is_empty() {
                    return Err(malformed("index declares no columns".into()));
                }
                for column in columns.iter() {
                    check(*column)?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateTable { table, .. } => write!(f, "create table {table}"),
            Self::AddColumn { table, column } => write!(f, "add column {table}.{}", column.name),
            Self::CreateIndex { name, table, .. } => write!(f, "create index {name} on {table}"),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Application
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    /// Declarations that changed the schema on this run.
    pub applied: usize,
    /// Declarations whose element was already present.
    pub already_satisfied: usize,
    /// Columns added to pre-existing tables to match their table declaration.
    pub columns_reconciled: usize,
}

impl SchemaReport {
    pub fn is_noop(&self) -> bool {
        self.applied == 0 && self.columns_reconciled == 0
    }
}

/// Apply every declaration in order, stopping at the first fatal failure.
pub fn ensure_schema(
    conn: &Connection,
    declarations: &[SchemaChange],
) -> Result<SchemaReport, DatabaseError> {
    let mut report = SchemaReport::default();

    for declaration in declarations {
        declaration.validate()?;
        let changed = apply(conn, declaration)?;
        if changed {
            report.applied += 1;
            tracing::info!(change = %declaration, "Schema change applied");
        } else {
            report.already_satisfied += 1;
            tracing::debug!(change = %declaration, "Schema element already present");
            if let SchemaChange::CreateTable { table, columns } = declaration {
                report.columns_reconciled += reconcile_columns(conn, declaration, *table, *columns)?;
            }
        }
    }

    tracing::info!(
        applied = report.applied,
        already_satisfied = report.already_satisfied,
        columns_reconciled = report.columns_reconciled,
        "Schema ensured"
    );
    Ok(report)
}

/// Attempt one change. `Ok(false)` means a benign "already exists" failure.
fn apply(conn: &Connection, declaration: &SchemaChange) -> Result<bool, DatabaseError> {
    execute_change(conn, declaration, &declaration.to_sql())
}

fn execute_change(
    conn: &Connection,
    declaration: &SchemaChange,
    sql: &str,
) -> Result<bool, DatabaseError> {
    let Err(err) = conn.execute_batch(sql) else {
        return Ok(true);
    };
    let kind = classify_failure(&err);
    if kind.is_benign() {
        return Ok(false);
    }
    match kind {
        FailureKind::MissingTable => Err(DatabaseError::MissingTable {
            declaration: declaration.to_string(),
            table: declaration.table().to_string(),
        }),
        _ => Err(DatabaseError::SchemaChangeFailed {
            declaration: declaration.to_string(),
            source: err,
        }),
    }
}

/// Add declared columns an older release did not create. Never alters
/// columns that are already there.
fn reconcile_columns(
    conn: &Connection,
    declaration: &SchemaChange,
    table: &'static str,
    columns: &'static [ColumnDef],
) -> Result<usize, DatabaseError> {
    let existing = column_names(conn, table)?;
    let mut added = 0;

    for column in columns {
        if existing.iter().any(|name| name.eq_ignore_ascii_case(column.name)) {
            continue;
        }
        if column.primary_key {
            tracing::warn!(table, column = column.name, "Existing table lacks declared key column; left as is");
            continue;
        }
        if let Some(reason) = column.add_column_obstacle() {
            tracing::warn!(table, column = column.name, reason, "Adding column in relaxed form");
        }
        let relaxed = column.relaxed_for_add();
        let sql = format!("ALTER TABLE {table} ADD COLUMN {}", relaxed.to_sql());
        if execute_change(conn, declaration, &sql)? {
            tracing::info!(table, column = column.name, "Column reconciled");
            added += 1;
        }
    }
    Ok(added)
}
