use crate::core::error::ThreadError;
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension, params};
use std::time::Duration;

pub fn db_connect(db_path: &str, busy_timeout_secs: u32) -> Result<Connection, ThreadError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(u64::from(busy_timeout_secs)))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    Ok(conn)
}

/// Create the link table and its indexes. Safe to call on every open.
pub fn apply_link_schema(conn: &Connection) -> Result<(), ThreadError> {
    conn.execute_batch(schemas::META_SCHEMA)?;
    conn.execute_batch(schemas::LINKS_DB_SCHEMA)?;
    conn.execute_batch(schemas::LINKS_INDEX_UNIQUE)?;
    conn.execute_batch(schemas::LINKS_INDEX_SOURCE)?;
    conn.execute_batch(schemas::LINKS_INDEX_TARGET)?;
    conn.execute(
        "INSERT OR IGNORE INTO digital_thread_meta(key, value) VALUES('schema_version', ?1)",
        params![schemas::LINKS_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

/// Stand up the externally owned tables. Only used by `init --with-external-tables`
/// and test fixtures; production deployments get these from their owning tools.
pub fn apply_external_schema(conn: &Connection) -> Result<(), ThreadError> {
    for ddl in schemas::EXTERNAL_TABLES {
        conn.execute_batch(ddl)?;
    }
    Ok(())
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, ThreadError> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
