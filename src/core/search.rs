//! Full-text search over decisions.
//!
//! The FTS5 index covers each decision's text plus rationale and is updated
//! synchronously with the owning row: no background indexing lag, and a
//! search immediately after a store sees the new decision. Ranking is bm25
//! relevance first, recency second.

use crate::core::error::MemoryError;
use crate::core::store::{self, Decision};
use rusqlite::{Connection, params};

pub const DEFAULT_SEARCH_LIMIT: usize = 20;

pub(crate) fn index_decision(
    conn: &Connection,
    id: i64,
    text: &str,
    rationale: &str,
) -> Result<(), MemoryError> {
    let content = if rationale.is_empty() {
        text.to_string()
    } else {
        format!("{} {}", text, rationale)
    };
    conn.execute(
        "INSERT INTO decisions_fts(id, content) VALUES(?1, ?2)",
        params![id, content],
    )?;
    Ok(())
}

pub(crate) fn deindex_decision(conn: &Connection, id: i64) -> Result<(), MemoryError> {
    conn.execute("DELETE FROM decisions_fts WHERE id = ?1", params![id])?;
    Ok(())
}

pub(crate) fn clear_index(conn: &Connection) -> Result<(), MemoryError> {
    conn.execute("DELETE FROM decisions_fts", [])?;
    Ok(())
}

/// Reduce raw query text to OR-joined quoted terms. Quoting keeps FTS5
/// operators in adversarial input (AND, NOT, NEAR, parens) from changing
/// query semantics.
fn fts_match_expr(query: &str) -> Option<String> {
    let bare: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let terms: Vec<String> = bare
        .split_whitespace()
        .map(|t| format!("\"{}\"", t))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Ranked search. An empty or whitespace-only query returns an empty list
/// rather than matching everything.
pub fn search_decisions(
    conn: &Connection,
    query: &str,
    limit: usize,
) -> Result<Vec<Decision>, MemoryError> {
    let Some(match_expr) = fts_match_expr(query) else {
        return Ok(Vec::new());
    };

    let mut stmt = conn.prepare(
        "SELECT d.id, d.text, d.rationale, d.tags, d.created_at
         FROM decisions_fts
         JOIN decisions d ON d.id = decisions_fts.id
         WHERE decisions_fts MATCH ?1
         ORDER BY decisions_fts.rank ASC, d.created_at DESC, d.id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![match_expr, limit as i64], store::row_to_decision)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(MemoryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_expr_quotes_and_strips_fts_operators() {
        assert_eq!(
            fts_match_expr(r#"redis NOT("*"#).as_deref(),
            Some(r#""redis" OR "NOT""#)
        );
        assert_eq!(
            fts_match_expr("cache latency").as_deref(),
            Some(r#""cache" OR "latency""#)
        );
    }

    #[test]
    fn test_match_expr_empty_for_blank_queries() {
        assert!(fts_match_expr("").is_none());
        assert!(fts_match_expr("   \t ").is_none());
        assert!(fts_match_expr("()\"*-").is_none());
    }
}
