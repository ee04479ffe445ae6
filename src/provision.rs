//! Startup provisioning: schema, settings, first admin, catalogs, sample
//! data, identifiers.
//!
//! Every phase is safe to rerun, so a failed startup is recovered by simply
//! starting again. There is no retry here.

use std::fmt;

use chrono::Datelike;
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::{
    ensure_default_admin, seed_sample_data, ReferenceCatalogs, SampleDataOutcome, SeedOutcome,
    DEFAULT_ADMIN_USERNAME,
};
use crate::db::{ensure_default_settings, AuditSink, DatabaseError, ProvisionEvent};
use crate::identifiers::{backfill_identifiers, BackfillReport, IdentifierScheme};
use crate::schema::{ensure_schema, SchemaReport, CLINIC_SCHEMA};

pub const INVOICE_PREFIX: &str = "INV";
pub const MRN_PREFIX: &str = "MRN";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionOptions {
    /// Insert demo patients and invoices into an empty database.
    pub seed_sample_data: bool,
    /// Year used for invoice numbering. Defaults to the current local year.
    pub invoice_year: Option<i32>,
}

impl ProvisionOptions {
    fn invoice_year(&self) -> i32 {
        self.invoice_year
            .unwrap_or_else(|| chrono::Local::now().year())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionPhase {
    Schema,
    Settings,
    DefaultAdmin,
    Catalogs,
    SampleData,
    InvoiceNumbers,
    MedicalRecordNumbers,
}

impl fmt::Display for ProvisionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Schema => "schema",
            Self::Settings => "settings",
            Self::DefaultAdmin => "default administrator",
            Self::Catalogs => "catalogs",
            Self::SampleData => "sample data",
            Self::InvoiceNumbers => "invoice numbers",
            Self::MedicalRecordNumbers => "medical record numbers",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
#[error("Provisioning failed during {phase}: {source}")]
pub struct ProvisionError {
    pub phase: ProvisionPhase,
    #[source]
    pub source: DatabaseError,
}

trait PhaseContext<T> {
    fn phase(self, phase: ProvisionPhase) -> Result<T, ProvisionError>;
}

impl<T> PhaseContext<T> for Result<T, DatabaseError> {
    fn phase(self, phase: ProvisionPhase) -> Result<T, ProvisionError> {
        self.map_err(|source| ProvisionError { phase, source })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionReport {
    pub schema: SchemaReport,
    pub settings_inserted: usize,
    pub default_admin_created: bool,
    pub catalogs: Vec<(&'static str, SeedOutcome)>,
    pub sample_data: Option<SampleDataOutcome>,
    pub invoice_numbers: BackfillReport,
    pub medical_record_numbers: BackfillReport,
}

impl ProvisionReport {
    /// True when the run found everything already in place.
    pub fn changed_nothing(&self) -> bool {
        self.schema.is_noop()
            && self.settings_inserted == 0
            && !self.default_admin_created
            && self
                .catalogs
                .iter()
                .all(|(_, outcome)| matches!(outcome, SeedOutcome::SkippedThreshold { .. } | SeedOutcome::Seeded { inserted: 0, .. }))
            && !matches!(self.sample_data, Some(SampleDataOutcome::Inserted { .. }))
            && self.invoice_numbers.assigned == 0
            && self.medical_record_numbers.assigned == 0
    }
}

/// Bring the database up to date. Must complete before the application
/// serves any request.
pub fn provision(
    conn: &Connection,
    options: &ProvisionOptions,
    audit: &mut dyn AuditSink,
) -> Result<ProvisionReport, ProvisionError> {
    tracing::info!("Provisioning clinic database");

    let schema = ensure_schema(conn, CLINIC_SCHEMA).phase(ProvisionPhase::Schema)?;
    if !schema.is_noop() {
        emit(
            audit,
            conn,
            ProvisionEvent::SchemaEnsured {
                applied: schema.applied,
                already_satisfied: schema.already_satisfied,
                columns_reconciled: schema.columns_reconciled,
            },
        );
    }

    let settings_inserted = ensure_default_settings(conn).phase(ProvisionPhase::Settings)?;

    let default_admin_created = ensure_default_admin(conn).phase(ProvisionPhase::DefaultAdmin)?;
    if default_admin_created {
        emit(
            audit,
            conn,
            ProvisionEvent::DefaultAdminCreated {
                username: DEFAULT_ADMIN_USERNAME.to_string(),
            },
        );
    }

    let catalogs = ReferenceCatalogs::bundled()
        .and_then(|bundle| bundle.seed_all(conn))
        .phase(ProvisionPhase::Catalogs)?;
    for (name, outcome) in &catalogs {
        if let SeedOutcome::Seeded { inserted, already_present } = *outcome {
            if inserted > 0 {
                emit(
                    audit,
                    conn,
                    ProvisionEvent::CatalogSeeded {
                        catalog: name.to_string(),
                        inserted,
                        already_present,
                    },
                );
            }
        }
    }

    let sample_data = if options.seed_sample_data {
        let outcome = seed_sample_data(conn).phase(ProvisionPhase::SampleData)?;
        if let SampleDataOutcome::Inserted { patients, invoices } = outcome {
            emit(audit, conn, ProvisionEvent::SampleDataInserted { patients, invoices });
        }
        Some(outcome)
    } else {
        None
    };

    let invoice_scheme = IdentifierScheme::yearly(INVOICE_PREFIX, options.invoice_year());
    let invoice_numbers = backfill_identifiers(conn, "invoices", "invoice_number", &invoice_scheme)
        .phase(ProvisionPhase::InvoiceNumbers)?;
    record_backfill(audit, conn, "invoices", "invoice_number", &invoice_numbers);

    let mrn_scheme = IdentifierScheme::global(MRN_PREFIX);
    let medical_record_numbers = backfill_identifiers(conn, "patients", "mrn", &mrn_scheme)
        .phase(ProvisionPhase::MedicalRecordNumbers)?;
    record_backfill(audit, conn, "patients", "mrn", &medical_record_numbers);

    let report = ProvisionReport {
        schema,
        settings_inserted,
        default_admin_created,
        catalogs,
        sample_data,
        invoice_numbers,
        medical_record_numbers,
    };
    if report.changed_nothing() {
        tracing::info!("Database already provisioned");
    } else {
        tracing::info!(
            schema_applied = report.schema.applied,
            settings_inserted = report.settings_inserted,
            invoices_numbered = report.invoice_numbers.assigned,
            patients_numbered = report.medical_record_numbers.assigned,
            "Provisioning complete"
        );
    }
    Ok(report)
}

fn record_backfill(
    audit: &mut dyn AuditSink,
    conn: &Connection,
    table: &str,
    column: &str,
    report: &BackfillReport,
) {
    if report.assigned == 0 {
        return;
    }
    emit(
        audit,
        conn,
        ProvisionEvent::IdentifiersAssigned {
            table: table.to_string(),
            column: column.to_string(),
            assigned: report.assigned,
            first: report.first.clone(),
            last: report.last.clone(),
        },
    );
}

fn emit(audit: &mut dyn AuditSink, conn: &Connection, event: ProvisionEvent) {
    if let Err(e) = audit.record(conn, &event) {
        tracing::warn!(action = event.action(), error = %e, "Audit event not recorded");
    }
}
