//! First login for a new installation.

use rusqlite::{params, Connection};

use crate::db::{count_rows, DatabaseError};

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";
const DEFAULT_ADMIN_DISPLAY_NAME: &str = "المدير العام";
const DEFAULT_ADMIN_ROLE: &str = "Admin";

/// Create the administrator account when `system_users` is empty.
///
/// Any existing user, including a renamed or deactivated admin, means the
/// installation is past first start. Returns true if the account was created.
pub fn ensure_default_admin(conn: &Connection) -> Result<bool, DatabaseError> {
    if count_rows(conn, "system_users")? > 0 {
        return Ok(false);
    }

    // Must be changed at first login.
    conn.execute(
        "INSERT INTO system_users (username, password_hash, display_name, role, force_password_change)
         VALUES (?1, ?2, ?3, ?4, 1)",
        params![
            DEFAULT_ADMIN_USERNAME,
            DEFAULT_ADMIN_PASSWORD,
            DEFAULT_ADMIN_DISPLAY_NAME,
            DEFAULT_ADMIN_ROLE
        ],
    )?;
    tracing::info!(username = DEFAULT_ADMIN_USERNAME, "Default administrator created");
    Ok(true)
}
