//! Demo patients and invoices for a brand-new installation.
//!
//! Gated by the `sample_data_inserted` sentinel, which is a shortcut only:
//! a populated `patients` table also means "done", and the sentinel is
//! written after the inserts have committed, never before.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::{count_rows, is_sentinel_done, mark_sentinel_done, DatabaseError};

pub const SAMPLE_DATA_SENTINEL: &str = "sample_data_inserted";

const SAMPLE_PATIENTS: &[(i64, &str, &str, &str, &str, &str)] = &[
    (1001, "أحمد محمد", "Ahmed Mohammed", "1012345678", "0551234567", "With Doctor"),
    (1002, "سارة عبدالرحمن", "Sarah Abdulrahman", "1098765432", "0559876543", "Waiting"),
    (1003, "فيصل العتيبي", "Faisal Al-Otaibi", "1054321098", "0553456789", "Waiting"),
];

const SAMPLE_INVOICES: &[(&str, f64, bool)] = &[
    ("Ahmed Mohammed", 575.00, true),
    ("Yasser Khaled", 1240.00, false),
    ("Sarah Ali", 890.50, true),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleDataOutcome {
    /// The sentinel was already set.
    AlreadyDone,
    /// Real patients exist; the sentinel was set without inserting anything.
    ExistingData,
    Inserted { patients: usize, invoices: usize },
}

pub fn seed_sample_data(conn: &Connection) -> Result<SampleDataOutcome, DatabaseError> {
    if is_sentinel_done(conn, SAMPLE_DATA_SENTINEL)? {
        return Ok(SampleDataOutcome::AlreadyDone);
    }

    if count_rows(conn, "patients")? > 0 {
        mark_sentinel_done(conn, SAMPLE_DATA_SENTINEL)?;
        tracing::debug!("Patients present, sample data not needed");
        return Ok(SampleDataOutcome::ExistingData);
    }

    let tx = conn.unchecked_transaction()?;
    for (file_number, name_ar, name_en, national_id, phone, status) in SAMPLE_PATIENTS {
        tx.execute(
            "INSERT INTO patients (file_number, name_ar, name_en, national_id, phone, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![file_number, name_ar, name_en, national_id, phone, status],
        )?;
    }
    // Left unnumbered: invoice numbers come from the identifier backfill.
    for (patient_name, total, paid) in SAMPLE_INVOICES {
        tx.execute(
            "INSERT INTO invoices (patient_name, total, paid) VALUES (?1, ?2, ?3)",
            params![patient_name, total, paid],
        )?;
    }
    tx.commit()?;

    mark_sentinel_done(conn, SAMPLE_DATA_SENTINEL)?;
    tracing::info!(
        patients = SAMPLE_PATIENTS.len(),
        invoices = SAMPLE_INVOICES.len(),
        "Sample data inserted"
    );
    Ok(SampleDataOutcome::Inserted {
        patients: SAMPLE_PATIENTS.len(),
        invoices: SAMPLE_INVOICES.len(),
    })
}
