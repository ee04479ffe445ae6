use std::process::ExitCode;

use nama_provision::config::{self, Settings};
use nama_provision::db::{open_database, AuditTrailSink};
use nama_provision::provision;

fn main() -> ExitCode {
    nama_provision::init_tracing();
    tracing::info!("{} provisioning v{}", config::APP_NAME, config::APP_VERSION);

    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Some(parent) = settings.database_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::error!(path = %parent.display(), error = %e, "Cannot create data directory");
            return ExitCode::FAILURE;
        }
    }

    let conn = match open_database(&settings.database_path) {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!(path = %settings.database_path.display(), error = %e, "Cannot open database");
            return ExitCode::FAILURE;
        }
    };

    match provision(&conn, &settings.options, &mut AuditTrailSink) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(phase = %e.phase, error = %e.source, "Provisioning failed; application must not start");
            ExitCode::FAILURE
        }
    }
}
