//! Centralized schema definitions for the memory store.
//!
//! One SQLite database holds four relations plus a full-text index:
//! 1. decisions: append-only architectural decisions, evicted oldest-first
//! 2. patterns: reusable patterns, upsert-only, keyed by name
//! 3. context: arbitrary key/value entries, upsert-only
//! 4. meta: single schema_version row written at initialization
//! 5. decisions_fts: FTS5 index over decision text + rationale

/// Bumped on any incompatible layout change. Imports carrying a different
/// version are rejected before any row is applied.
pub const SCHEMA_VERSION: u32 = 1;

pub const MEMORY_DB_SCHEMA_META: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const MEMORY_DB_SCHEMA_DECISIONS: &str = "
    CREATE TABLE IF NOT EXISTS decisions (
        id INTEGER PRIMARY KEY,
        text TEXT NOT NULL,
        rationale TEXT NOT NULL DEFAULT '',
        tags TEXT NOT NULL DEFAULT '[]', -- JSON array, sorted + deduplicated
        created_at INTEGER NOT NULL -- epoch milliseconds
    )
";

/// Eviction scans by (created_at, id); the composite index keeps the
/// oldest-row lookup off a full table scan.
pub const MEMORY_DB_INDEX_DECISIONS_CREATED: &str =
    "CREATE INDEX IF NOT EXISTS idx_decisions_created ON decisions(created_at, id)";

pub const MEMORY_DB_SCHEMA_PATTERNS: &str = "
    CREATE TABLE IF NOT EXISTS patterns (
        name TEXT PRIMARY KEY,
        description TEXT NOT NULL,
        example TEXT NOT NULL DEFAULT '',
        updated_at INTEGER NOT NULL
    )
";

pub const MEMORY_DB_SCHEMA_CONTEXT: &str = "
    CREATE TABLE IF NOT EXISTS context (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
";

/// Rows are maintained manually (no triggers) so that eviction, purge, and
/// replace-import can prune the index inside the same transaction as the
/// table mutation.
pub const MEMORY_DB_SCHEMA_DECISIONS_FTS: &str =
    "CREATE VIRTUAL TABLE IF NOT EXISTS decisions_fts
     USING fts5(id UNINDEXED, content, tokenize='unicode61')";
