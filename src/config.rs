use std::path::PathBuf;

use thiserror::Error;

use crate::provision::ProvisionOptions;

/// Application-level constants
pub const APP_NAME: &str = "NamaClinic";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DB_PATH_VAR: &str = "NAMA_DB_PATH";
pub const SEED_SAMPLE_DATA_VAR: &str = "NAMA_SEED_SAMPLE_DATA";
pub const INVOICE_YEAR_VAR: &str = "NAMA_INVOICE_YEAR";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Cannot determine home directory; set NAMA_DB_PATH")]
    NoHomeDirectory,

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

/// Log filter used when RUST_LOG is unset.
pub fn default_log_filter() -> &'static str {
    "nama_provision=info,warn"
}

/// Get the application data directory
/// ~/NamaClinic/ on all platforms
pub fn app_data_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_NAME))
}

/// Database used when NAMA_DB_PATH is unset.
pub fn default_database_path() -> Option<PathBuf> {
    app_data_dir().map(|dir| dir.join("clinic.db"))
}

/// Resolved configuration for one provisioning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_path: PathBuf,
    pub options: ProvisionOptions,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let database_path = match get(DB_PATH_VAR) {
            Some(path) => PathBuf::from(path),
            None => default_database_path().ok_or(ConfigError::NoHomeDirectory)?,
        };

        let seed_sample_data = match get(SEED_SAMPLE_DATA_VAR) {
            Some(value) => parse_flag(SEED_SAMPLE_DATA_VAR, &value)?,
            None => false,
        };

        let invoice_year = match get(INVOICE_YEAR_VAR) {
            Some(value) => Some(parse_year(&value)?),
            None => None,
        };

        Ok(Self {
            database_path,
            options: ProvisionOptions {
                seed_sample_data,
                invoice_year,
            },
        })
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_year(value: &str) -> Result<i32, ConfigError> {
    value
        .trim()
        .parse::<i32>()
        .ok()
        .filter(|year| (1000..=9999).contains(year))
        .ok_or_else(|| ConfigError::InvalidValue {
            key: INVOICE_YEAR_VAR,
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir().unwrap();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("NamaClinic"));
    }

    #[test]
    fn default_database_under_app_data() {
        let path = default_database_path().unwrap();
        assert!(path.starts_with(app_data_dir().unwrap()));
        assert!(path.ends_with("clinic.db"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn explicit_values() {
        let settings = Settings::from_lookup(lookup(&[
            (DB_PATH_VAR, "/srv/clinic/test.db"),
            (SEED_SAMPLE_DATA_VAR, "yes"),
            (INVOICE_YEAR_VAR, "2025"),
        ]))
        .unwrap();
        assert_eq!(settings.database_path, PathBuf::from("/srv/clinic/test.db"));
        assert!(settings.options.seed_sample_data);
        assert_eq!(settings.options.invoice_year, Some(2025));
    }

    #[test]
    fn unset_and_empty_use_defaults() {
        let settings = Settings::from_lookup(lookup(&[(SEED_SAMPLE_DATA_VAR, "  ")])).unwrap();
        assert_eq!(settings.database_path, default_database_path().unwrap());
        assert_eq!(settings.options, ProvisionOptions::default());
    }

    #[test]
    fn bad_values_are_rejected() {
        assert_eq!(
            Settings::from_lookup(lookup(&[(SEED_SAMPLE_DATA_VAR, "maybe")])).unwrap_err(),
            ConfigError::InvalidValue {
                key: SEED_SAMPLE_DATA_VAR,
                value: "maybe".into()
            }
        );
        assert!(Settings::from_lookup(lookup(&[(INVOICE_YEAR_VAR, "25")])).is_err());
        assert!(Settings::from_lookup(lookup(&[(INVOICE_YEAR_VAR, "twenty")])).is_err());
    }
}
