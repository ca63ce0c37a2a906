use crate::core::error::MemoryError;
use crate::core::schemas;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Open a connection with the store's standing pragmas: WAL for concurrent
/// readers alongside a single writer, a busy timeout for cross-process
/// contention, and foreign keys on.
pub fn db_connect(db_path: &Path) -> Result<Connection, MemoryError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

/// Create all relations (idempotent) and reconcile the stored schema version.
pub fn initialize_memory_db(conn: &Connection) -> Result<(), MemoryError> {
    conn.execute(schemas::MEMORY_DB_SCHEMA_META, [])?;
    conn.execute(schemas::MEMORY_DB_SCHEMA_DECISIONS, [])?;
    conn.execute(schemas::MEMORY_DB_INDEX_DECISIONS_CREATED, [])?;
    conn.execute(schemas::MEMORY_DB_SCHEMA_PATTERNS, [])?;
    conn.execute(schemas::MEMORY_DB_SCHEMA_CONTEXT, [])?;
    conn.execute(schemas::MEMORY_DB_SCHEMA_DECISIONS_FTS, [])?;
    ensure_schema_version(conn)
}

/// Write the schema version once at first initialization; afterwards an
/// incompatible stored version fails the open instead of silently corrupting
/// the store.
fn ensure_schema_version(conn: &Connection) -> Result<(), MemoryError> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match stored {
        None => {
            conn.execute(
                "INSERT INTO meta(key, value) VALUES('schema_version', ?1)",
                params![schemas::SCHEMA_VERSION.to_string()],
            )?;
            Ok(())
        }
        Some(value) => {
            let found: u32 = value.parse().unwrap_or(0);
            if found == schemas::SCHEMA_VERSION {
                Ok(())
            } else {
                Err(MemoryError::SchemaVersionMismatch {
                    found,
                    supported: schemas::SCHEMA_VERSION,
                })
            }
        }
    }
}
