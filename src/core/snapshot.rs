//! Snapshot export/import and federation merge.
//!
//! A snapshot is the whole store as JSON, carrying an explicit
//! `schema_version` so a future layout change can reject an incompatible
//! import instead of silently corrupting data. Import runs in one
//! transaction: an unsupported version or a failing write leaves the
//! destination untouched.
//!
//! Merge reconciles two independently-evolved stores with deterministic
//! rules. Decisions deduplicate by a content hash of the decision text; when
//! both sides have one, the longer rationale wins (more context wins) and
//! tags become the union of both sides. Patterns merge by name with a
//! non-empty `example` winning (documentation completeness over recency).
//! Context entries merge last-write-wins by `updated_at`.

use crate::core::config::MemoryConfig;
use crate::core::error::MemoryError;
use crate::core::sanitize::{self, DEFAULT_MAX_TEXT_LEN};
use crate::core::schemas;
use crate::core::search;
use crate::core::store::{self, Decision, Pattern};
use rusqlite::{Connection, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextValue {
    pub value: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema_version: u32,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
    #[serde(default)]
    pub context: BTreeMap<String, ContextValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Purge the destination, then insert everything from the snapshot under
    /// the normal capacity/eviction rules. No confirmation token: the caller
    /// already explicitly chose replacement.
    Replace,
    /// Reconcile the snapshot into the destination.
    Merge,
}

/// `imported` counts rows inserted or records where the incoming side won a
/// conflict; `skipped` counts invalid entries and records where the
/// destination side won; `conflicts` counts every collision regardless of
/// winner (each conflict also lands in `imported` or `skipped`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub conflicts: usize,
}

pub fn export(conn: &Connection) -> Result<Snapshot, MemoryError> {
    let decisions = store::list_all_decisions(conn)?;
    let patterns = store::list_patterns(conn)?;
    let context = store::list_context(conn)?
        .into_iter()
        .map(|entry| {
            (
                entry.key,
                ContextValue {
                    value: entry.value,
                    updated_at: entry.updated_at,
                },
            )
        })
        .collect();

    Ok(Snapshot {
        schema_version: schemas::SCHEMA_VERSION,
        decisions,
        patterns,
        context,
    })
}

pub fn import(
    conn: &mut Connection,
    config: &MemoryConfig,
    snapshot: &Snapshot,
    mode: ImportMode,
) -> Result<ImportSummary, MemoryError> {
    if snapshot.schema_version != schemas::SCHEMA_VERSION {
        return Err(MemoryError::SchemaVersionMismatch {
            found: snapshot.schema_version,
            supported: schemas::SCHEMA_VERSION,
        });
    }

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let summary = match mode {
        ImportMode::Replace => import_replace(&tx, config, snapshot)?,
        ImportMode::Merge => import_merge(&tx, config, snapshot)?,
    };
    tx.commit()?;
    tracing::debug!(?mode, ?summary, "snapshot imported");
    Ok(summary)
}

/// Dedup key for federation merge. Hashing the text alone lets two stores
/// that recorded the same decision with different levels of rationale detail
/// reconcile to a single record.
fn decision_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Snapshot rows went through some sanitizer once, but a snapshot is caller
/// input like any other: clean again on the way in.
fn clean_decision(decision: &Decision) -> (String, String, Vec<String>) {
    (
        sanitize::sanitize_text(&decision.text, DEFAULT_MAX_TEXT_LEN),
        sanitize::sanitize_text(&decision.rationale, DEFAULT_MAX_TEXT_LEN),
        sanitize::sanitize_tags(&decision.tags),
    )
}

fn import_replace(
    conn: &Connection,
    config: &MemoryConfig,
    snapshot: &Snapshot,
) -> Result<ImportSummary, MemoryError> {
    store::purge_all_tx(conn)?;
    let mut summary = ImportSummary::default();

    for decision in &snapshot.decisions {
        let (text, rationale, tags) = clean_decision(decision);
        if text.is_empty() {
            summary.skipped += 1;
            continue;
        }
        store::insert_decision_at(
            conn,
            config.max_decisions,
            &text,
            &rationale,
            &tags,
            decision.created_at,
        )?;
        summary.imported += 1;
    }

    for pattern in &snapshot.patterns {
        if !sanitize::validate_key(&pattern.name) {
            summary.skipped += 1;
            continue;
        }
        store::upsert_pattern_at(
            conn,
            config.max_patterns,
            &pattern.name,
            &sanitize::sanitize_text(&pattern.description, DEFAULT_MAX_TEXT_LEN),
            &sanitize::sanitize_text(&pattern.example, DEFAULT_MAX_TEXT_LEN),
            pattern.updated_at,
        )?;
        summary.imported += 1;
    }

    for (key, entry) in &snapshot.context {
        if !sanitize::validate_key(key) {
            summary.skipped += 1;
            continue;
        }
        store::upsert_context_at(
            conn,
            config.max_context_keys,
            key,
            &sanitize::sanitize_text(&entry.value, DEFAULT_MAX_TEXT_LEN),
            entry.updated_at,
        )?;
        summary.imported += 1;
    }

    Ok(summary)
}

fn import_merge(
    conn: &Connection,
    config: &MemoryConfig,
    snapshot: &Snapshot,
) -> Result<ImportSummary, MemoryError> {
    let mut summary = ImportSummary::default();

    // Decisions: dedup by content hash of the text.
    let mut by_hash: HashMap<String, Decision> = store::list_all_decisions(conn)?
        .into_iter()
        .map(|d| (decision_hash(&d.text), d))
        .collect();

    for decision in &snapshot.decisions {
        let (text, rationale, tags) = clean_decision(decision);
        if text.is_empty() {
            summary.skipped += 1;
            continue;
        }
        let hash = decision_hash(&text);
        match by_hash.get(&hash) {
            None => {
                let id = store::insert_decision_at(
                    conn,
                    config.max_decisions,
                    &text,
                    &rationale,
                    &tags,
                    decision.created_at,
                )?;
                summary.imported += 1;
                by_hash.insert(
                    hash,
                    Decision {
                        id,
                        text,
                        rationale,
                        tags,
                        created_at: decision.created_at,
                    },
                );
            }
            Some(ours) => {
                summary.conflicts += 1;
                let mut union: Vec<String> = ours.tags.clone();
                union.extend(tags);
                union.sort_unstable();
                union.dedup();

                // Longer rationale wins; the destination row keeps its
                // identity either way.
                let incoming_wins = rationale.len() > ours.rationale.len();
                let merged_rationale = if incoming_wins {
                    rationale.clone()
                } else {
                    ours.rationale.clone()
                };

                conn.execute(
                    "UPDATE decisions SET rationale = ?1, tags = ?2 WHERE id = ?3",
                    params![merged_rationale, store::encode_tags(&union), ours.id],
                )?;
                search::deindex_decision(conn, ours.id)?;
                search::index_decision(conn, ours.id, &ours.text, &merged_rationale)?;

                if incoming_wins {
                    summary.imported += 1;
                } else {
                    summary.skipped += 1;
                }

                let id = ours.id;
                let created_at = ours.created_at;
                let text = ours.text.clone();
                by_hash.insert(
                    hash,
                    Decision {
                        id,
                        text,
                        rationale: merged_rationale,
                        tags: union,
                        created_at,
                    },
                );
            }
        }
    }

    // Patterns: merged by name; a non-empty example wins, destination wins
    // the tie when both or neither side has one.
    for pattern in &snapshot.patterns {
        if !sanitize::validate_key(&pattern.name) {
            summary.skipped += 1;
            continue;
        }
        let description = sanitize::sanitize_text(&pattern.description, DEFAULT_MAX_TEXT_LEN);
        let example = sanitize::sanitize_text(&pattern.example, DEFAULT_MAX_TEXT_LEN);

        match store::get_pattern(conn, &pattern.name)? {
            None => {
                store::upsert_pattern_at(
                    conn,
                    config.max_patterns,
                    &pattern.name,
                    &description,
                    &example,
                    pattern.updated_at,
                )?;
                summary.imported += 1;
            }
            Some(ours) => {
                summary.conflicts += 1;
                if !example.is_empty() && ours.example.is_empty() {
                    store::upsert_pattern_at(
                        conn,
                        config.max_patterns,
                        &pattern.name,
                        &description,
                        &example,
                        pattern.updated_at,
                    )?;
                    summary.imported += 1;
                } else {
                    summary.skipped += 1;
                }
            }
        }
    }

    // Context: last write wins by updated_at; destination wins exact ties.
    for (key, entry) in &snapshot.context {
        if !sanitize::validate_key(key) {
            summary.skipped += 1;
            continue;
        }
        let value = sanitize::sanitize_text(&entry.value, DEFAULT_MAX_TEXT_LEN);

        match store::get_context_entry(conn, key)? {
            None => {
                store::upsert_context_at(
                    conn,
                    config.max_context_keys,
                    key,
                    &value,
                    entry.updated_at,
                )?;
                summary.imported += 1;
            }
            Some(ours) => {
                summary.conflicts += 1;
                if entry.updated_at > ours.updated_at {
                    store::upsert_context_at(
                        conn,
                        config.max_context_keys,
                        key,
                        &value,
                        entry.updated_at,
                    )?;
                    summary.imported += 1;
                } else {
                    summary.skipped += 1;
                }
            }
        }
    }

    Ok(summary)
}
