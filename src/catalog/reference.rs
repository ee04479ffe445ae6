//! Bundled reference catalogs: price list, lab panel, imaging, formulary.
//!
//! The JSON files under `resources/catalogs/` are compiled into the binary
//! and are not editable at runtime. Content corrections to rows that already
//! exist are made through the application, never by reseeding.

use std::collections::HashSet;

use rusqlite::types::Value;
use rusqlite::Connection;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{seed_catalog, Catalog, CatalogEntry, SeedOutcome};
use crate::db::DatabaseError;

const LAB_TESTS_JSON: &str = include_str!("../../resources/catalogs/lab_tests.json");
const RADIOLOGY_JSON: &str = include_str!("../../resources/catalogs/radiology.json");
const MEDICAL_SERVICES_JSON: &str = include_str!("../../resources/catalogs/medical_services.json");
const DRUGS_JSON: &str = include_str!("../../resources/catalogs/drugs.json");

pub const MEDICAL_SERVICES: Catalog = Catalog {
    name: "medical_services",
    table: "medical_services",
    key_columns: &["name_en", "specialty"],
    attribute_columns: &["name_ar", "category", "price"],
    threshold: None,
};

pub const LAB_TESTS: Catalog = Catalog {
    name: "lab_tests",
    table: "lab_tests_catalog",
    key_columns: &["test_name"],
    attribute_columns: &["category", "normal_range", "price"],
    threshold: None,
};

pub const RADIOLOGY: Catalog = Catalog {
    name: "radiology",
    table: "radiology_catalog",
    key_columns: &["exact_name"],
    attribute_columns: &["modality", "default_template", "price"],
    threshold: None,
};

pub const DRUG_FORMULARY: Catalog = Catalog {
    name: "drug_formulary",
    table: "pharmacy_drug_catalog",
    key_columns: &["drug_name"],
    attribute_columns: &["category", "selling_price", "stock_qty"],
    threshold: None,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalService {
    pub name_en: String,
    pub name_ar: String,
    pub specialty: String,
    pub category: String,
    pub price: f64,
}

impl CatalogEntry for MedicalService {
    fn natural_key(&self) -> Vec<Value> {
        vec![Value::Text(self.name_en.clone()), Value::Text(self.specialty.clone())]
    }

    fn attributes(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name_ar.clone()),
            Value::Text(self.category.clone()),
            Value::Real(self.price),
        ]
    }

    fn key_label(&self) -> String {
        format!("{} ({})", self.name_en, self.specialty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTest {
    pub test_name: String,
    pub category: String,
    pub normal_range: String,
    pub price: f64,
}

impl CatalogEntry for LabTest {
    fn natural_key(&self) -> Vec<Value> {
        vec![Value::Text(self.test_name.clone())]
    }

    fn attributes(&self) -> Vec<Value> {
        vec![
            Value::Text(self.category.clone()),
            Value::Text(self.normal_range.clone()),
            Value::Real(self.price),
        ]
    }

    fn key_label(&self) -> String {
        self.test_name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiologyExam {
    pub modality: String,
    pub exact_name: String,
    #[serde(default)]
    pub default_template: String,
    pub price: f64,
}

impl CatalogEntry for RadiologyExam {
    fn natural_key(&self) -> Vec<Value> {
        vec![Value::Text(self.exact_name.clone())]
    }

    fn attributes(&self) -> Vec<Value> {
        vec![
            Value::Text(self.modality.clone()),
            Value::Text(self.default_template.clone()),
            Value::Real(self.price),
        ]
    }

    fn key_label(&self) -> String {
        self.exact_name.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drug {
    pub drug_name: String,
    pub category: String,
    pub selling_price: f64,
    pub stock_qty: i64,
}

impl CatalogEntry for Drug {
    fn natural_key(&self) -> Vec<Value> {
        vec![Value::Text(self.drug_name.clone())]
    }

    fn attributes(&self) -> Vec<Value> {
        vec![
            Value::Text(self.category.clone()),
            Value::Real(self.selling_price),
            Value::Integer(self.stock_qty),
        ]
    }

    fn key_label(&self) -> String {
        self.drug_name.clone()
    }
}

/// All bundled catalogs, parsed.
#[derive(Debug, Clone)]
pub struct ReferenceCatalogs {
    pub medical_services: Vec<MedicalService>,
    pub lab_tests: Vec<LabTest>,
    pub radiology: Vec<RadiologyExam>,
    pub drugs: Vec<Drug>,
}

impl ReferenceCatalogs {
    /// Parse the catalogs compiled into the binary.
    pub fn bundled() -> Result<Self, DatabaseError> {
        Ok(Self {
            medical_services: parse(&MEDICAL_SERVICES, MEDICAL_SERVICES_JSON)?,
            lab_tests: parse(&LAB_TESTS, LAB_TESTS_JSON)?,
            radiology: parse(&RADIOLOGY, RADIOLOGY_JSON)?,
            drugs: parse(&DRUG_FORMULARY, DRUGS_JSON)?,
        })
    }

    /// Seed every catalog in a fixed order, stopping at the first failure.
    ///
    /// Each catalog's fast-path threshold is the number of distinct keys it
    /// bundles: a table holding at least that many rows was completed before.
    pub fn seed_all(
        &self,
        conn: &Connection,
    ) -> Result<Vec<(&'static str, SeedOutcome)>, DatabaseError> {
        Ok(vec![
            seed_bundle(conn, &MEDICAL_SERVICES, &self.medical_services)?,
            seed_bundle(conn, &LAB_TESTS, &self.lab_tests)?,
            seed_bundle(conn, &RADIOLOGY, &self.radiology)?,
            seed_bundle(conn, &DRUG_FORMULARY, &self.drugs)?,
        ])
    }
}

fn parse<E: DeserializeOwned>(catalog: &Catalog, json: &str) -> Result<Vec<E>, DatabaseError> {
    serde_json::from_str(json).map_err(|e| DatabaseError::ReferenceDataParse {
        catalog: catalog.name.to_string(),
        reason: e.to_string(),
    })
}

fn seed_bundle<E: CatalogEntry>(
    conn: &Connection,
    catalog: &Catalog,
    entries: &[E],
) -> Result<(&'static str, SeedOutcome), DatabaseError> {
    let catalog = catalog.with_threshold(distinct_keys(entries) as i64);
    let outcome = seed_catalog(conn, &catalog, entries)?;
    Ok((catalog.name, outcome))
}

/// Number of distinct natural keys in a bundle.
pub fn distinct_keys<E: CatalogEntry>(entries: &[E]) -> usize {
    entries
        .iter()
        .map(|e| format!("{:?}", e.natural_key()))
        .collect::<HashSet<_>>()
        .len()
}
