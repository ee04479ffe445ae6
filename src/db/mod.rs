pub mod audit;
pub mod settings;
pub mod sqlite;

pub use audit::*;
pub use settings::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Schema change failed at `{declaration}`: {source}")]
    SchemaChangeFailed {
        declaration: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Cannot apply `{declaration}`: table {table} does not exist")]
    MissingTable { declaration: String, table: String },

    #[error("Malformed declaration `{declaration}`: {reason}")]
    MalformedDeclaration { declaration: String, reason: String },

    #[error("Catalog {catalog} seeding rolled back at '{natural_key}': {source}")]
    CatalogSeedFailed {
        catalog: String,
        natural_key: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Reference data for catalog {catalog} could not be parsed: {reason}")]
    ReferenceDataParse { catalog: String, reason: String },

    #[error("Identifier backfill on {table} stopped at row id {row_id} (index {row_index} in pass): {source}")]
    BackfillFailed {
        table: String,
        row_id: i64,
        row_index: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Identifier sequence {scheme} on {table} has no numbers left")]
    IdentifierSpaceExhausted { table: String, scheme: String },

    #[error("Audit event could not be serialized: {0}")]
    AuditSerialization(#[from] serde_json::Error),

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),
}
