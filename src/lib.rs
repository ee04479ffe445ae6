pub mod config;
pub mod db;
pub mod schema; // Schema evolution
pub mod catalog; // Reference catalogs and sample data
pub mod identifiers; // Identifier backfill
pub mod provision;

use tracing_subscriber::EnvFilter;

pub use provision::{provision, ProvisionError, ProvisionOptions, ProvisionReport};

/// Install the global tracing subscriber. RUST_LOG overrides the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
