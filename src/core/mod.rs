//! Core modules for the memory store engine.
//!
//! Leaves first: schema text, the SQLite connection layer, sanitization, the
//! rate limiter, and the connection pool. On top of those sit the storage
//! engine, full-text search, snapshot import/export, and the dispatcher that
//! ties them together.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod limiter;
pub mod pool;
pub mod sanitize;
pub mod schemas;
pub mod search;
pub mod snapshot;
pub mod store;
pub mod time;
