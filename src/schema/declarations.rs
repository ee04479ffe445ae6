//! The clinic schema, in the order it grew.
//!
//! Tables are declared with the columns of their first release; every later
//! addition is its own `AddColumn` so that databases created by any earlier
//! release converge on the same shape. Append new declarations at the end.

use super::SchemaChange::{AddColumn, CreateIndex, CreateTable};
use super::{ColumnDef as C, SchemaChange};

const COMPANY_SETTINGS: &[C] = &[C::text_key("setting_key"), C::text("setting_value")];

const SYSTEM_USERS: &[C] = &[
    C::id(),
    C::unique_text("username").not_null(),
    C::text("password_hash"),
    C::text("display_name"),
    C::text_default("role", "Staff"),
    C::integer("is_active", 1),
    C::created_at(),
];

const PATIENTS: &[C] = &[
    C::id(),
    C::integer("file_number", 0),
    C::text("name_ar"),
    C::text("name_en"),
    C::text("national_id"),
    C::text("phone"),
    C::text("department"),
    C::text("notes"),
    C::real("amount", 0.0),
    C::text("payment_method"),
    C::text_default("status", "Waiting"),
    C::created_at(),
];

const APPOINTMENTS: &[C] = &[
    C::id(),
    C::integer_nullable("patient_id"),
    C::text("patient_name"),
    C::text("doctor_name"),
    C::text("department"),
    C::text("appt_date"),
    C::text("appt_time"),
    C::text("notes"),
    C::text_default("status", "Confirmed"),
    C::created_at(),
];

const INVOICES: &[C] = &[
    C::id(),
    C::text("patient_name"),
    C::real("total", 0.0),
    C::integer("paid", 0),
    C::integer("order_id", 0),
    C::text("service_type"),
    C::text("invoice_number"),
    C::text("description"),
    C::real("amount", 0.0),
    C::real("vat_amount", 0.0),
    C::integer("patient_id", 0),
    C::text("payment_method"),
    C::created_at(),
];

const LAB_TESTS_CATALOG: &[C] = &[
    C::id(),
    C::text("test_name"),
    C::text("category"),
    C::text("normal_range"),
    C::real("price", 0.0),
];

const RADIOLOGY_CATALOG: &[C] = &[
    C::id(),
    C::text("modality"),
    C::text("exact_name"),
    C::text("default_template"),
    C::real("price", 0.0),
];

const PHARMACY_DRUG_CATALOG: &[C] = &[
    C::id(),
    C::text("drug_name"),
    C::text("active_ingredient"),
    C::text("barcode"),
    C::text("category"),
    C::text("unit"),
    C::real("selling_price", 0.0),
    C::real("cost_price", 0.0),
    C::integer("stock_qty", 0),
    C::integer("min_qty", 5),
    C::text("expiry_date"),
    C::integer("is_active", 1),
];

const MEDICAL_SERVICES: &[C] = &[
    C::id(),
    C::text("name_en"),
    C::text("name_ar"),
    C::text("specialty"),
    C::text("category"),
    C::real("price", 0.0),
    C::integer("is_active", 1),
];

const NURSING_VITALS: &[C] = &[
    C::id(),
    C::integer_nullable("patient_id"),
    C::text("patient_name"),
    C::text("bp"),
    C::real("temp", 0.0),
    C::real("weight", 0.0),
    C::integer("pulse", 0),
    C::integer("o2_sat", 0),
    C::text("notes"),
    C::created_at(),
];

const PATIENT_VISITS: &[C] = &[
    C::id(),
    C::integer_nullable("patient_id").not_null(),
    C::text_nullable("visit_number"),
    C::text_default("visit_type", "Walk-in"),
    C::text("department"),
    C::text("doctor"),
    C::text_default("status", "Registered"),
    C::text("chief_complaint"),
    C::text("created_by"),
    C::created_at(),
    C::timestamp("checkout_at"),
    C::text("notes"),
];

const PHARMACY_STOCK_LOG: &[C] = &[
    C::id(),
    C::integer_nullable("drug_id").not_null(),
    C::text("drug_name"),
    C::text_default("movement_type", "OUT"),
    C::integer("quantity", 0),
    C::integer("previous_qty", 0),
    C::integer("new_qty", 0),
    C::text("reason"),
    C::integer_nullable("patient_id"),
    C::integer_nullable("prescription_id"),
    C::text("performed_by"),
    C::created_at(),
];

const AUDIT_TRAIL: &[C] = &[
    C::id(),
    C::integer_nullable("user_id"),
    C::text("user_name"),
    C::text("action"),
    C::text("module"),
    C::text("record_type"),
    C::integer_nullable("record_id"),
    C::text("details"),
    C::text("old_values"),
    C::text("new_values"),
    C::text("ip_address"),
    C::created_at(),
];

const NOTIFICATIONS: &[C] = &[
    C::id(),
    C::integer_nullable("user_id"),
    C::text("target_role"),
    C::text("title"),
    C::text("message"),
    C::text_default("type", "info"),
    C::text("module"),
    C::integer_nullable("record_id"),
    C::integer("is_read", 0),
    C::created_at(),
];

pub const CLINIC_SCHEMA: &[SchemaChange] = &[
    // Core tables
    CreateTable { table: "company_settings", columns: COMPANY_SETTINGS },
    CreateTable { table: "system_users", columns: SYSTEM_USERS },
    CreateTable { table: "patients", columns: PATIENTS },
    CreateTable { table: "appointments", columns: APPOINTMENTS },
    CreateTable { table: "invoices", columns: INVOICES },
    CreateTable { table: "lab_tests_catalog", columns: LAB_TESTS_CATALOG },
    CreateTable { table: "radiology_catalog", columns: RADIOLOGY_CATALOG },
    CreateTable { table: "pharmacy_drug_catalog", columns: PHARMACY_DRUG_CATALOG },
    CreateTable { table: "medical_services", columns: MEDICAL_SERVICES },
    CreateTable { table: "nursing_vitals", columns: NURSING_VITALS },
    // Demographics
    AddColumn { table: "patients", column: C::text("dob") },
    AddColumn { table: "patients", column: C::text("dob_hijri") },
    AddColumn { table: "patients", column: C::integer("age", 0) },
    AddColumn { table: "patients", column: C::text("nationality") },
    AddColumn { table: "system_users", column: C::text("speciality") },
    AddColumn { table: "system_users", column: C::text("permissions") },
    // Nursing vitals expansion
    AddColumn { table: "nursing_vitals", column: C::real("height", 0.0) },
    AddColumn { table: "nursing_vitals", column: C::integer("respiratory_rate", 0) },
    AddColumn { table: "nursing_vitals", column: C::integer("blood_sugar", 0) },
    AddColumn { table: "nursing_vitals", column: C::text("chronic_diseases") },
    AddColumn { table: "nursing_vitals", column: C::text("current_medications") },
    AddColumn { table: "nursing_vitals", column: C::text("allergies") },
    AddColumn { table: "invoices", column: C::real("vat_amount", 0.0) },
    // Patient registry: clinical profile and medical record number
    AddColumn { table: "patients", column: C::text_nullable("blood_type") },
    AddColumn { table: "patients", column: C::text_nullable("allergies") },
    AddColumn { table: "patients", column: C::text_nullable("chronic_diseases") },
    AddColumn { table: "patients", column: C::text_nullable("emergency_contact_name") },
    AddColumn { table: "patients", column: C::text_nullable("emergency_contact_phone") },
    AddColumn { table: "patients", column: C::text_nullable("address") },
    AddColumn { table: "patients", column: C::text_nullable("insurance_company") },
    AddColumn { table: "patients", column: C::text_nullable("insurance_policy_number") },
    AddColumn { table: "patients", column: C::text_nullable("insurance_class") },
    AddColumn { table: "patients", column: C::text_nullable("mrn") },
    CreateIndex { name: "idx_patients_mrn", table: "patients", columns: &["mrn"], unique: false },
    CreateIndex { name: "idx_patients_national_id", table: "patients", columns: &["national_id"], unique: false },
    CreateIndex { name: "idx_patients_phone", table: "patients", columns: &["phone"], unique: false },
    CreateIndex { name: "idx_patients_name_ar", table: "patients", columns: &["name_ar"], unique: false },
    CreateIndex { name: "idx_invoices_patient_id", table: "invoices", columns: &["patient_id"], unique: false },
    CreateIndex { name: "idx_appointments_patient_id", table: "appointments", columns: &["patient_id"], unique: false },
    // Invoice discounts and pharmacy alerts
    AddColumn { table: "invoices", column: C::real("discount", 0.0) },
    AddColumn { table: "invoices", column: C::text_nullable("discount_reason") },
    AddColumn { table: "pharmacy_drug_catalog", column: C::integer("min_stock_level", 10) },
    // Visit tracking, invoice serials, stock movements, audit
    CreateTable { table: "patient_visits", columns: PATIENT_VISITS },
    AddColumn { table: "invoices", column: C::text("invoice_number") },
    AddColumn { table: "invoices", column: C::text("created_by") },
    AddColumn { table: "invoices", column: C::integer_nullable("visit_id") },
    AddColumn { table: "invoices", column: C::integer("cancelled", 0) },
    AddColumn { table: "invoices", column: C::text("cancel_reason") },
    AddColumn { table: "invoices", column: C::text("cancelled_by") },
    AddColumn { table: "invoices", column: C::timestamp("cancelled_at") },
    AddColumn { table: "invoices", column: C::real("original_amount", 0.0) },
    AddColumn { table: "patients", column: C::integer("is_deleted", 0) },
    AddColumn { table: "patients", column: C::timestamp("deleted_at") },
    AddColumn { table: "patients", column: C::text("deleted_by") },
    AddColumn { table: "patients", column: C::timestamp("last_visit_at") },
    AddColumn { table: "patients", column: C::integer("total_visits", 0) },
    AddColumn { table: "pharmacy_drug_catalog", column: C::text("batch_number") },
    AddColumn { table: "pharmacy_drug_catalog", column: C::text("supplier") },
    AddColumn { table: "pharmacy_drug_catalog", column: C::integer("reorder_level", 5) },
    AddColumn { table: "pharmacy_drug_catalog", column: C::timestamp("last_restocked_at") },
    CreateTable { table: "pharmacy_stock_log", columns: PHARMACY_STOCK_LOG },
    CreateTable { table: "audit_trail", columns: AUDIT_TRAIL },
    CreateTable { table: "notifications", columns: NOTIFICATIONS },
    AddColumn { table: "system_users", column: C::integer("force_password_change", 0) },
    AddColumn { table: "system_users", column: C::text_default("commission_type", "percentage") },
    AddColumn { table: "system_users", column: C::real("commission_value", 0.0) },
    AddColumn { table: "appointments", column: C::text("time_slot") },
    AddColumn { table: "appointments", column: C::integer("duration_minutes", 15) },
    CreateIndex { name: "idx_visits_patient", table: "patient_visits", columns: &["patient_id"], unique: false },
    CreateIndex { name: "idx_visits_date", table: "patient_visits", columns: &["created_at"], unique: false },
    CreateIndex { name: "idx_inv_number", table: "invoices", columns: &["invoice_number"], unique: false },
    CreateIndex { name: "idx_inv_visit", table: "invoices", columns: &["visit_id"], unique: false },
    CreateIndex { name: "idx_audit_user", table: "audit_trail", columns: &["user_id"], unique: false },
    CreateIndex { name: "idx_audit_module", table: "audit_trail", columns: &["module"], unique: false },
    CreateIndex { name: "idx_notif_user", table: "notifications", columns: &["user_id"], unique: false },
    CreateIndex { name: "idx_notif_role", table: "notifications", columns: &["target_role"], unique: false },
    CreateIndex { name: "idx_stock_drug", table: "pharmacy_stock_log", columns: &["drug_id"], unique: false },
    CreateIndex { name: "idx_appt_conflict", table: "appointments", columns: &["doctor_name", "appt_date", "time_slot"], unique: false },
    // Catalog natural keys
    CreateIndex { name: "idx_lab_tests_name", table: "lab_tests_catalog", columns: &["test_name"], unique: false },
    CreateIndex { name: "idx_radiology_name", table: "radiology_catalog", columns: &["exact_name"], unique: false },
    CreateIndex { name: "idx_drug_name", table: "pharmacy_drug_catalog", columns: &["drug_name"], unique: false },
    CreateIndex { name: "idx_services_name", table: "medical_services", columns: &["name_en", "specialty"], unique: false },
];

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::db::open_memory_database;
    use crate::schema::ensure_schema;

    #[test]
    fn tables_are_created_before_their_columns_and_indexes() {
        let mut created = HashSet::new();
        for declaration in CLINIC_SCHEMA {
            match declaration {
                CreateTable { table, .. } => {
                    assert!(created.insert(*table), "table {table} declared twice");
                }
                other => assert!(
                    created.contains(other.table()),
                    "{other} precedes its table declaration"
                ),
            }
        }
    }

    #[test]
    fn every_declaration_validates() {
        for declaration in CLINIC_SCHEMA {
            declaration
                .validate()
                .unwrap_or_else(|e| panic!("{declaration}: {e}"));
        }
    }

    #[test]
    fn index_names_are_unique() {
        let mut names = HashSet::new();
        for declaration in CLINIC_SCHEMA {
            if let CreateIndex { name, .. } = declaration {
                assert!(names.insert(*name), "index {name} declared twice");
            }
        }
    }

    #[test]
    fn older_users_table_gains_commission_columns() {
        let conn = open_memory_database().unwrap();
        conn.execute_batch(
            "CREATE TABLE system_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT DEFAULT ''
            );
            INSERT INTO system_users (username) VALUES ('reception');",
        )
        .unwrap();

        ensure_schema(&conn, CLINIC_SCHEMA).unwrap();

        let (kind, value): (String, f64) = conn
            .query_row(
                "SELECT commission_type, commission_value FROM system_users WHERE username = 'reception'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "percentage");
        assert_eq!(value, 0.0);
    }
}
