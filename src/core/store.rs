//! Storage engine: row-level operations over the backing SQLite database.
//!
//! Every function here takes an explicit connection so the dispatcher can
//! compose operations inside a single pool acquisition, and so snapshot
//! import can run many of them inside one transaction. Functions ending in
//! `_at` accept a caller-supplied timestamp; their plain counterparts stamp
//! the current clock and wrap themselves in an immediate transaction.
//!
//! Write transactions BEGIN IMMEDIATE. Every write path reads first (capacity
//! check, exists check) and a deferred transaction would take the write lock
//! only at the first mutation; two connections upgrading at once then fail
//! with SQLITE_BUSY_SNAPSHOT, which `busy_timeout` does not retry. Taking the
//! lock at BEGIN makes concurrent writers queue instead.
//!
//! This is the embedded profile of the storage contract. A client/server
//! profile would replace this module and `db` behind the same operation set;
//! nothing above this layer knows which profile is active.

use crate::core::error::MemoryError;
use crate::core::search;
use crate::core::time;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::{Deserialize, Serialize};

/// An architectural decision. Immutable after creation except via eviction,
/// purge, or federation merge reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Row id in the local store. Not stable across stores: import assigns
    /// fresh ids on the destination side.
    #[serde(default)]
    pub id: i64,
    pub text: String,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: i64,
}

/// A reusable pattern, upsert-only, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub example: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub key: String,
    pub value: String,
    pub updated_at: i64,
}

/// Tags are stored as a sorted, deduplicated JSON array so that merge
/// unions and equality checks are deterministic.
pub(crate) fn encode_tags(tags: &[String]) -> String {
    let mut cleaned: Vec<&str> = tags
        .iter()
        .map(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .collect();
    cleaned.sort_unstable();
    cleaned.dedup();
    serde_json::to_string(&cleaned).unwrap_or_else(|_| "[]".to_string())
}

pub(crate) fn decode_tags(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

pub(crate) fn row_to_decision(row: &rusqlite::Row<'_>) -> rusqlite::Result<Decision> {
    Ok(Decision {
        id: row.get(0)?,
        text: row.get(1)?,
        rationale: row.get(2)?,
        tags: decode_tags(&row.get::<_, String>(3)?),
        created_at: row.get(4)?,
    })
}

fn row_to_pattern(row: &rusqlite::Row<'_>) -> rusqlite::Result<Pattern> {
    Ok(Pattern {
        name: row.get(0)?,
        description: row.get(1)?,
        example: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

// --- Decisions ---

/// Insert a decision, evicting oldest rows first when the store is at
/// capacity. Eviction, insert, and index maintenance commit together.
pub fn insert_decision(
    conn: &mut Connection,
    max_decisions: usize,
    text: &str,
    rationale: &str,
    tags: &[String],
) -> Result<i64, MemoryError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let id = insert_decision_at(&tx, max_decisions, text, rationale, tags, time::now_millis())?;
    tx.commit()?;
    Ok(id)
}

/// Transaction-free insert used by `insert_decision` and snapshot import.
pub(crate) fn insert_decision_at(
    conn: &Connection,
    max_decisions: usize,
    text: &str,
    rationale: &str,
    tags: &[String],
    created_at: i64,
) -> Result<i64, MemoryError> {
    // A zero ceiling would drain the table and then insert over it anyway;
    // clamp to one, like the pool clamps its size.
    let max_decisions = max_decisions.max(1);
    while count_decisions(conn)? as usize >= max_decisions {
        if delete_oldest_decision(conn)?.is_none() {
            break;
        }
    }
    conn.execute(
        "INSERT INTO decisions(text, rationale, tags, created_at) VALUES(?1, ?2, ?3, ?4)",
        params![text, rationale, encode_tags(tags), created_at],
    )?;
    let id = conn.last_insert_rowid();
    search::index_decision(conn, id, text, rationale)?;
    tracing::debug!(id, "decision stored");
    Ok(id)
}

/// Evict exactly one decision: lowest `created_at`, ties broken by lowest
/// `id` (insertion order). Silent and expected under load, not a failure.
pub fn delete_oldest_decision(conn: &Connection) -> Result<Option<i64>, MemoryError> {
    let oldest: Option<i64> = conn
        .query_row(
            "SELECT id FROM decisions ORDER BY created_at ASC, id ASC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = oldest {
        conn.execute("DELETE FROM decisions WHERE id = ?1", params![id])?;
        search::deindex_decision(conn, id)?;
        tracing::debug!(id, "evicted oldest decision at capacity");
    }
    Ok(oldest)
}

/// Newest first.
pub fn list_recent_decisions(
    conn: &Connection,
    limit: usize,
) -> Result<Vec<Decision>, MemoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, text, rationale, tags, created_at FROM decisions
         ORDER BY created_at DESC, id DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], row_to_decision)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(MemoryError::from)
}

/// Full scan in insertion order, for export and merge reconciliation.
pub fn list_all_decisions(conn: &Connection) -> Result<Vec<Decision>, MemoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, text, rationale, tags, created_at FROM decisions
         ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt.query_map([], row_to_decision)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(MemoryError::from)
}

pub fn count_decisions(conn: &Connection) -> Result<i64, MemoryError> {
    conn.query_row("SELECT COUNT(*) FROM decisions", [], |row| row.get(0))
        .map_err(MemoryError::from)
}

// --- Patterns ---

/// Upsert keyed by name. Updating an existing name never changes the count
/// and never triggers eviction; only a new name is checked against the
/// ceiling.
pub fn upsert_pattern(
    conn: &mut Connection,
    max_patterns: usize,
    name: &str,
    description: &str,
    example: &str,
) -> Result<(), MemoryError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    upsert_pattern_at(&tx, max_patterns, name, description, example, time::now_millis())?;
    tx.commit()?;
    Ok(())
}

pub(crate) fn upsert_pattern_at(
    conn: &Connection,
    max_patterns: usize,
    name: &str,
    description: &str,
    example: &str,
    updated_at: i64,
) -> Result<(), MemoryError> {
    let max_patterns = max_patterns.max(1);
    let exists = get_pattern(conn, name)?.is_some();
    if !exists {
        while count_patterns(conn)? as usize >= max_patterns {
            let stale: Option<String> = conn
                .query_row(
                    "SELECT name FROM patterns ORDER BY updated_at ASC, name ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            match stale {
                Some(evicted) => {
                    conn.execute("DELETE FROM patterns WHERE name = ?1", params![evicted])?;
                    tracing::debug!(name = %evicted, "evicted stalest pattern at capacity");
                }
                None => break,
            }
        }
    }
    conn.execute(
        "INSERT INTO patterns(name, description, example, updated_at) VALUES(?1, ?2, ?3, ?4)
         ON CONFLICT(name) DO UPDATE SET
             description = excluded.description,
             example = excluded.example,
             updated_at = excluded.updated_at",
        params![name, description, example, updated_at],
    )?;
    Ok(())
}

pub fn get_pattern(conn: &Connection, name: &str) -> Result<Option<Pattern>, MemoryError> {
    conn.query_row(
        "SELECT name, description, example, updated_at FROM patterns WHERE name = ?1",
        params![name],
        row_to_pattern,
    )
    .optional()
    .map_err(MemoryError::from)
}

pub fn list_patterns(conn: &Connection) -> Result<Vec<Pattern>, MemoryError> {
    let mut stmt = conn.prepare(
        "SELECT name, description, example, updated_at FROM patterns ORDER BY name ASC",
    )?;
    let rows = stmt.query_map([], row_to_pattern)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(MemoryError::from)
}

pub fn count_patterns(conn: &Connection) -> Result<i64, MemoryError> {
    conn.query_row("SELECT COUNT(*) FROM patterns", [], |row| row.get(0))
        .map_err(MemoryError::from)
}

// --- Context ---

pub fn upsert_context(
    conn: &mut Connection,
    max_context_keys: usize,
    key: &str,
    value: &str,
) -> Result<(), MemoryError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    upsert_context_at(&tx, max_context_keys, key, value, time::now_millis())?;
    tx.commit()?;
    Ok(())
}

pub(crate) fn upsert_context_at(
    conn: &Connection,
    max_context_keys: usize,
    key: &str,
    value: &str,
    updated_at: i64,
) -> Result<(), MemoryError> {
    let max_context_keys = max_context_keys.max(1);
    let exists = get_context_entry(conn, key)?.is_some();
    if !exists {
        while count_context_keys(conn)? as usize >= max_context_keys {
            let stale: Option<String> = conn
                .query_row(
                    "SELECT key FROM context ORDER BY updated_at ASC, key ASC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            match stale {
                Some(evicted) => {
                    conn.execute("DELETE FROM context WHERE key = ?1", params![evicted])?;
                    tracing::debug!(key = %evicted, "evicted stalest context entry at capacity");
                }
                None => break,
            }
        }
    }
    conn.execute(
        "INSERT INTO context(key, value, updated_at) VALUES(?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET
             value = excluded.value,
             updated_at = excluded.updated_at",
        params![key, value, updated_at],
    )?;
    Ok(())
}

pub fn get_context_entry(conn: &Connection, key: &str) -> Result<Option<ContextEntry>, MemoryError> {
    conn.query_row(
        "SELECT key, value, updated_at FROM context WHERE key = ?1",
        params![key],
        |row| {
            Ok(ContextEntry {
                key: row.get(0)?,
                value: row.get(1)?,
                updated_at: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(MemoryError::from)
}

pub fn list_context(conn: &Connection) -> Result<Vec<ContextEntry>, MemoryError> {
    let mut stmt =
        conn.prepare("SELECT key, value, updated_at FROM context ORDER BY key ASC")?;
    let rows = stmt.query_map([], |row| {
        Ok(ContextEntry {
            key: row.get(0)?,
            value: row.get(1)?,
            updated_at: row.get(2)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(MemoryError::from)
}

/// Delete one key, or every entry when `key` is `None`. Returns the number
/// of rows removed.
pub fn delete_context(conn: &Connection, key: Option<&str>) -> Result<usize, MemoryError> {
    let removed = match key {
        Some(key) => conn.execute("DELETE FROM context WHERE key = ?1", params![key])?,
        None => conn.execute("DELETE FROM context", [])?,
    };
    Ok(removed)
}

pub fn count_context_keys(conn: &Connection) -> Result<i64, MemoryError> {
    conn.query_row("SELECT COUNT(*) FROM context", [], |row| row.get(0))
        .map_err(MemoryError::from)
}

// --- Maintenance ---

/// `PRAGMA integrity_check` reduced to a boolean. Read-only.
pub fn integrity_check(conn: &Connection) -> Result<bool, MemoryError> {
    let verdict: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    Ok(verdict == "ok")
}

/// Reclaim space after large deletions. Must run outside a transaction.
pub fn vacuum(conn: &Connection) -> Result<(), MemoryError> {
    conn.execute_batch("VACUUM")?;
    Ok(())
}

/// Delete every decision, pattern, and context entry in one transaction.
/// The metadata row survives; the store returns to first-initialization
/// state.
pub fn purge_all(conn: &mut Connection) -> Result<(), MemoryError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    purge_all_tx(&tx)?;
    tx.commit()?;
    tracing::debug!("store purged");
    Ok(())
}

/// Purge body shared with replace-import, which supplies its own transaction.
pub(crate) fn purge_all_tx(conn: &Connection) -> Result<(), MemoryError> {
    conn.execute("DELETE FROM decisions", [])?;
    conn.execute("DELETE FROM patterns", [])?;
    conn.execute("DELETE FROM context", [])?;
    search::clear_index(conn)?;
    Ok(())
}
