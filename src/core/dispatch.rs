//! Tool dispatcher: the single entry point over the memory store.
//!
//! Every operation follows the same path: validate arguments, count the call
//! against the rate limiter, acquire a pooled connection, delegate to the
//! engine, release the connection. Validation and rate-limit rejections are
//! resolved before any engine access and never produce partial side effects.
//!
//! The operation set is closed: a typed [`Operation`] enum matched
//! exhaustively. An unrecognized name at the string entry point yields a
//! typed `UnknownOperation` error rather than a silent no-op.

use crate::core::config::MemoryConfig;
use crate::core::db;
use crate::core::error::MemoryError;
use crate::core::limiter::RateLimiter;
use crate::core::pool::ConnectionPool;
use crate::core::sanitize::{self, DEFAULT_MAX_TEXT_LEN};
use crate::core::search;
use crate::core::snapshot::{self, ImportMode, Snapshot};
use crate::core::store;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

/// Exact literal a caller must supply to authorize a purge.
pub const PURGE_CONFIRM_TOKEN: &str = "CONFIRM_PURGE";

const DEFAULT_RECENT_LIMIT: usize = 10;

/// Closed set of operations exposed to the external transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "args", rename_all = "snake_case")]
pub enum Operation {
    StoreDecision {
        text: String,
        #[serde(default)]
        rationale: String,
        #[serde(default)]
        tags: Vec<String>,
    },
    SearchDecisions {
        query: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    GetRecentDecisions {
        #[serde(default)]
        limit: Option<usize>,
    },
    StorePattern {
        name: String,
        description: String,
        #[serde(default)]
        example: String,
    },
    GetPatterns {},
    SetContext {
        key: String,
        value: String,
    },
    GetContext {
        key: String,
    },
    GetAllContext {},
    ClearContext {
        #[serde(default)]
        key: Option<String>,
    },
    ExportMemory {},
    ImportMemory {
        snapshot: Snapshot,
        mode: ImportMode,
    },
    GetStats {},
    HealthCheck {},
    PurgeMemory {
        #[serde(default)]
        confirm: Option<String>,
    },
}

const OPERATION_NAMES: [&str; 14] = [
    "store_decision",
    "search_decisions",
    "get_recent_decisions",
    "store_pattern",
    "get_patterns",
    "set_context",
    "get_context",
    "get_all_context",
    "clear_context",
    "export_memory",
    "import_memory",
    "get_stats",
    "health_check",
    "purge_memory",
];

/// Envelope handed back to the transport: `{ok: true, data}` on success,
/// `{ok: false, code, message}` on failure.
#[derive(Debug, Clone, Serialize)]
pub struct ToolResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ToolResult {
    fn success(data: JsonValue) -> Self {
        Self {
            ok: true,
            data: Some(data),
            code: None,
            message: None,
        }
    }

    fn failure(err: &MemoryError) -> Self {
        Self {
            ok: false,
            data: None,
            code: Some(err.code().to_string()),
            message: Some(err.public_message()),
        }
    }
}

/// The memory store handle. Owns its pool, limiter, and configuration;
/// constructed explicitly at process start and passed by reference into
/// whatever serves the transport.
pub struct Memory {
    config: MemoryConfig,
    pool: ConnectionPool,
    limiter: RateLimiter,
}

impl Memory {
    /// Open (or create) the store at the configured location, reconcile the
    /// schema version, and pre-open the connection pool.
    pub fn open(config: MemoryConfig) -> Result<Self, MemoryError> {
        let pool = ConnectionPool::open(&config.db_path, config.pool_size)?;
        {
            let conn = pool.acquire(config.acquire_timeout)?;
            db::initialize_memory_db(&conn)?;
        }
        let limiter = RateLimiter::new(config.rate_limit_window, config.rate_limit_max_ops);
        tracing::debug!(db_path = %config.db_path.display(), "memory store opened");
        Ok(Self {
            config,
            pool,
            limiter,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// String-named entry point for the transport layer: operation name plus
    /// a JSON argument object, wrapped into the standard envelope. Never
    /// panics and never leaks internal failure detail.
    pub fn dispatch_value(&self, name: &str, args: JsonValue) -> ToolResult {
        match parse_operation(name, args).and_then(|op| self.dispatch(op)) {
            Ok(data) => ToolResult::success(data),
            Err(err) => {
                tracing::warn!(op = name, code = err.code(), "operation failed");
                ToolResult::failure(&err)
            }
        }
    }

    /// Typed entry point: validate, rate-limit, acquire, delegate, release.
    pub fn dispatch(&self, op: Operation) -> Result<JsonValue, MemoryError> {
        self.validate(&op)?;
        self.limiter.try_acquire()?;
        let mut conn = self.pool.acquire(self.config.acquire_timeout)?;
        self.execute(&mut conn, op)
    }

    /// Argument checks that need no connection. A failure here has consumed
    /// neither rate budget nor a pooled connection.
    fn validate(&self, op: &Operation) -> Result<(), MemoryError> {
        match op {
            Operation::StorePattern { name, .. } => {
                if !sanitize::validate_key(name) {
                    return Err(MemoryError::ValidationError(format!(
                        "invalid pattern name '{}': 1-100 characters from [A-Za-z0-9_.-]",
                        name
                    )));
                }
            }
            Operation::SetContext { key, .. } | Operation::GetContext { key } => {
                if !sanitize::validate_key(key) {
                    return Err(MemoryError::ValidationError(format!(
                        "invalid context key '{}': 1-100 characters from [A-Za-z0-9_.-]",
                        key
                    )));
                }
            }
            Operation::ClearContext { key: Some(key) } => {
                if !sanitize::validate_key(key) {
                    return Err(MemoryError::ValidationError(format!(
                        "invalid context key '{}': 1-100 characters from [A-Za-z0-9_.-]",
                        key
                    )));
                }
            }
            Operation::PurgeMemory { confirm } => {
                if confirm.as_deref() != Some(PURGE_CONFIRM_TOKEN) {
                    return Err(MemoryError::ConfirmationRequired(PURGE_CONFIRM_TOKEN));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn execute(&self, conn: &mut Connection, op: Operation) -> Result<JsonValue, MemoryError> {
        match op {
            Operation::StoreDecision {
                text,
                rationale,
                tags,
            } => {
                let text = sanitize::sanitize_text(&text, DEFAULT_MAX_TEXT_LEN);
                let rationale = sanitize::sanitize_text(&rationale, DEFAULT_MAX_TEXT_LEN);
                let tags = sanitize::sanitize_tags(&tags);
                let id = store::insert_decision(
                    conn,
                    self.config.max_decisions,
                    &text,
                    &rationale,
                    &tags,
                )?;
                Ok(json!({ "id": id }))
            }

            Operation::SearchDecisions { query, limit } => {
                let limit = limit.unwrap_or(search::DEFAULT_SEARCH_LIMIT);
                let results = search::search_decisions(conn, &query, limit)?;
                Ok(json!(results))
            }

            Operation::GetRecentDecisions { limit } => {
                let limit = limit.unwrap_or(DEFAULT_RECENT_LIMIT);
                let results = store::list_recent_decisions(conn, limit)?;
                Ok(json!(results))
            }

            Operation::StorePattern {
                name,
                description,
                example,
            } => {
                let description = sanitize::sanitize_text(&description, DEFAULT_MAX_TEXT_LEN);
                let example = sanitize::sanitize_text(&example, DEFAULT_MAX_TEXT_LEN);
                store::upsert_pattern(
                    conn,
                    self.config.max_patterns,
                    &name,
                    &description,
                    &example,
                )?;
                Ok(json!({ "stored": name }))
            }

            Operation::GetPatterns {} => {
                let patterns = store::list_patterns(conn)?;
                Ok(json!(patterns))
            }

            Operation::SetContext { key, value } => {
                let value = sanitize::sanitize_text(&value, DEFAULT_MAX_TEXT_LEN);
                store::upsert_context(conn, self.config.max_context_keys, &key, &value)?;
                Ok(json!({ "stored": key }))
            }

            Operation::GetContext { key } => match store::get_context_entry(conn, &key)? {
                Some(entry) => Ok(json!({ "key": entry.key, "value": entry.value })),
                None => Err(MemoryError::NotFound(format!("context key '{}'", key))),
            },

            Operation::GetAllContext {} => {
                let map: serde_json::Map<String, JsonValue> = store::list_context(conn)?
                    .into_iter()
                    .map(|entry| (entry.key, JsonValue::String(entry.value)))
                    .collect();
                Ok(JsonValue::Object(map))
            }

            Operation::ClearContext { key } => {
                let cleared = store::delete_context(conn, key.as_deref())?;
                Ok(json!({ "cleared": cleared }))
            }

            Operation::ExportMemory {} => {
                let snapshot = snapshot::export(conn)?;
                Ok(json!(snapshot))
            }

            Operation::ImportMemory { snapshot, mode } => {
                let summary = snapshot::import(conn, &self.config, &snapshot, mode)?;
                Ok(json!(summary))
            }

            Operation::GetStats {} => {
                let decision_count = store::count_decisions(conn)?;
                let pattern_count = store::count_patterns(conn)?;
                let context_key_count = store::count_context_keys(conn)?;
                let db_size_bytes = std::fs::metadata(&self.config.db_path)
                    .map(|meta| meta.len())
                    .unwrap_or(0);
                Ok(json!({
                    "decision_count": decision_count,
                    "pattern_count": pattern_count,
                    "context_key_count": context_key_count,
                    "db_size_bytes": db_size_bytes,
                }))
            }

            Operation::HealthCheck {} => {
                let integrity_check_passed = store::integrity_check(conn)?;
                Ok(json!({
                    "ok": integrity_check_passed,
                    "integrity_check_passed": integrity_check_passed,
                    "pool_idle": self.pool.idle_count(),
                    "pool_size": self.pool.size(),
                    "rate_limit_remaining": self.limiter.remaining(),
                }))
            }

            Operation::PurgeMemory { .. } => {
                // Token already checked in validate().
                store::purge_all(conn)?;
                store::vacuum(conn)?;
                Ok(json!({ "purged": true }))
            }
        }
    }

    /// Strict integrity probe: unlike `health_check`, a corrupt store
    /// surfaces as an error. Not rate-limited; intended for startup checks
    /// and operational tooling, not the dispatched operation set.
    pub fn verify_integrity(&self) -> Result<(), MemoryError> {
        let conn = self.pool.acquire(self.config.acquire_timeout)?;
        if store::integrity_check(&conn)? {
            Ok(())
        } else {
            Err(MemoryError::IntegrityError(
                "PRAGMA integrity_check reported corruption".to_string(),
            ))
        }
    }

    /// Reclaim file space after large deletions.
    pub fn vacuum(&self) -> Result<(), MemoryError> {
        let conn = self.pool.acquire(self.config.acquire_timeout)?;
        store::vacuum(&conn)
    }
}

fn parse_operation(name: &str, args: JsonValue) -> Result<Operation, MemoryError> {
    if !OPERATION_NAMES.contains(&name) {
        return Err(MemoryError::UnknownOperation(name.to_string()));
    }
    let args = if args.is_null() {
        JsonValue::Object(serde_json::Map::new())
    } else {
        args
    };
    serde_json::from_value(json!({ "op": name, "args": args }))
        .map_err(|e| MemoryError::ValidationError(format!("malformed arguments for '{}': {}", name, e)))
}
