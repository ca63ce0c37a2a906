//! Barnacle: persistent project memory for AI coding agents.
//!
//! **Barnacle is the memory store that survives the session.**
//!
//! AI-assisted coding sessions lose everything on restart. Barnacle gives them
//! a shared, durable place to record architectural decisions, reusable
//! patterns, and arbitrary key/value context, and to get it all back later on
//! another day or another teammate's machine.
//!
//! # Core Principles
//!
//! - **Local-first**: all state lives in a single SQLite file in WAL mode
//! - **Bounded**: per-entity capacity ceilings with silent oldest-first eviction
//! - **Agent-safe**: every input is sanitized or refused before it reaches the
//!   engine; operations are rate-limited per process
//! - **Mergeable**: two independently-evolved stores reconcile with
//!   deterministic conflict rules
//!
//! # Architecture
//!
//! The single entry point is [`Memory`]: it owns a bounded
//! [`ConnectionPool`](core::pool::ConnectionPool), a fixed-window
//! [`RateLimiter`](core::limiter::RateLimiter), and the store configuration.
//! Every dispatched operation follows the same path:
//!
//! ```text
//! validate -> rate limit -> pool acquire -> engine -> pool release
//! ```
//!
//! The transport that delivers operation calls (request parsing, protocol
//! framing) is an external collaborator; this crate exposes the typed
//! [`Operation`] set and a name + JSON-arguments entry point
//! ([`Memory::dispatch_value`]) returning the standard
//! `{ok, data}` / `{ok, code, message}` envelope.
//!
//! # Example
//!
//! ```no_run
//! use barnacle::{Memory, MemoryConfig, Operation};
//!
//! let memory = Memory::open(MemoryConfig::new("project-memory.db"))?;
//! let id = memory.dispatch(Operation::StoreDecision {
//!     text: "Use Redis for caching".to_string(),
//!     rationale: "sub-millisecond latency requirement".to_string(),
//!     tags: vec!["infra".to_string()],
//! })?;
//! # Ok::<(), barnacle::MemoryError>(())
//! ```

pub mod core;

pub use crate::core::config::MemoryConfig;
pub use crate::core::dispatch::{Memory, Operation, PURGE_CONFIRM_TOKEN, ToolResult};
pub use crate::core::error::MemoryError;
pub use crate::core::snapshot::{ContextValue, ImportMode, ImportSummary, Snapshot};
pub use crate::core::store::{ContextEntry, Decision, Pattern};
