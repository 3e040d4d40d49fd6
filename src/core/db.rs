use crate::core::error::GovernanceError;
use crate::core::schemas;
use rusqlite::Connection;
use std::fs;
use std::path::Path;

pub fn db_connect(db_path: &Path) -> Result<Connection, GovernanceError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(GovernanceError::RusqliteError)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(GovernanceError::RusqliteError)?;
    Ok(conn)
}

/// Creates the parent directory and applies the audit schema.
pub fn initialize_audit_db(db_path: &Path) -> Result<(), GovernanceError> {
    if let Some(parent_dir) = db_path.parent()
        && !parent_dir.as_os_str().is_empty()
    {
        fs::create_dir_all(parent_dir).map_err(GovernanceError::IoError)?;
    }
    let conn = db_connect(db_path)?;
    for stmt in schemas::AUDIT_DB_SCHEMA {
        conn.execute_batch(stmt)?;
    }
    Ok(())
}
