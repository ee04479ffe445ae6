use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::DatabaseError;

/// A change provisioning made to the database. Runs that change nothing
/// record nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProvisionEvent {
    SchemaEnsured {
        applied: usize,
        already_satisfied: usize,
        columns_reconciled: usize,
    },
    DefaultAdminCreated {
        username: String,
    },
    CatalogSeeded {
        catalog: String,
        inserted: usize,
        already_present: usize,
    },
    SampleDataInserted {
        patients: usize,
        invoices: usize,
    },
    IdentifiersAssigned {
        table: String,
        column: String,
        assigned: usize,
        first: Option<String>,
        last: Option<String>,
    },
}

impl ProvisionEvent {
    pub fn action(&self) -> &'static str {
        match self {
            Self::SchemaEnsured { .. } => "schema_ensured",
            Self::DefaultAdminCreated { .. } => "default_admin_created",
            Self::CatalogSeeded { .. } => "catalog_seeded",
            Self::SampleDataInserted { .. } => "sample_data_inserted",
            Self::IdentifiersAssigned { .. } => "identifiers_assigned",
        }
    }

    /// Table the event concerns, if any.
    pub fn record_type(&self) -> &str {
        match self {
            Self::SchemaEnsured { .. } | Self::SampleDataInserted { .. } => "",
            Self::DefaultAdminCreated { .. } => "system_users",
            Self::CatalogSeeded { catalog, .. } => catalog,
            Self::IdentifiersAssigned { table, .. } => table,
        }
    }
}

/// Receiver for provisioning events.
pub trait AuditSink {
    fn record(&mut self, conn: &Connection, event: &ProvisionEvent) -> Result<(), DatabaseError>;
}

/// Discards every event.
pub struct NoAudit;

impl AuditSink for NoAudit {
    fn record(&mut self, _conn: &Connection, _event: &ProvisionEvent) -> Result<(), DatabaseError> {
        Ok(())
    }
}

/// Writes events into the `audit_trail` table under the `provisioning` module.
pub struct AuditTrailSink;

impl AuditSink for AuditTrailSink {
    fn record(&mut self, conn: &Connection, event: &ProvisionEvent) -> Result<(), DatabaseError> {
        let details = serde_json::to_string(event)?;
        conn.execute(
            "INSERT INTO audit_trail (user_name, action, module, record_type, details)
             VALUES ('system', ?1, 'provisioning', ?2, ?3)",
            params![event.action(), event.record_type(), details],
        )?;
        Ok(())
    }
}

/// Query provisioning entries, newest first, as (action, record_type, details).
pub fn query_provisioning_audit(
    conn: &Connection,
) -> Result<Vec<(String, String, String)>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT action, record_type, details FROM audit_trail
         WHERE module = 'provisioning'
         ORDER BY id DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
