use barnacle::{Memory, MemoryConfig, MemoryError, Operation};
use serde_json::json;
use std::time::Duration;
use tempfile::tempdir;

fn test_memory(tune: impl FnOnce(&mut MemoryConfig)) -> (tempfile::TempDir, Memory) {
    let tmp = tempdir().unwrap();
    let mut config = MemoryConfig::new(tmp.path().join("memory.db"));
    // Generous budget so ordinary test traffic never trips the limiter.
    config.rate_limit_max_ops = 10_000;
    tune(&mut config);
    let memory = Memory::open(config).unwrap();
    (tmp, memory)
}

fn store_decision(memory: &Memory, text: &str) -> i64 {
    memory
        .dispatch(Operation::StoreDecision {
            text: text.to_string(),
            rationale: String::new(),
            tags: vec![],
        })
        .unwrap()["id"]
        .as_i64()
        .unwrap()
}

fn stats(memory: &Memory) -> serde_json::Value {
    memory.dispatch(Operation::GetStats {}).unwrap()
}

#[test]
fn test_decision_count_tracks_inserts() {
    let (_tmp, memory) = test_memory(|_| {});
    for i in 0..7 {
        store_decision(&memory, &format!("decision {}", i));
    }
    assert_eq!(stats(&memory)["decision_count"], 7);
}

#[test]
fn test_decision_ids_are_monotonic() {
    let (_tmp, memory) = test_memory(|_| {});
    let first = store_decision(&memory, "first");
    let second = store_decision(&memory, "second");
    assert_eq!(first, 1);
    assert_eq!(second, 2);
}

#[test]
fn test_capacity_evicts_exactly_the_oldest() {
    let (_tmp, memory) = test_memory(|c| c.max_decisions = 3);
    for i in 0..3 {
        store_decision(&memory, &format!("decision {}", i));
    }
    // One over capacity: the oldest (lowest created_at, ties by lowest id)
    // goes, silently.
    store_decision(&memory, "decision 3");

    assert_eq!(stats(&memory)["decision_count"], 3);
    let recent = memory
        .dispatch(Operation::GetRecentDecisions { limit: Some(10) })
        .unwrap();
    let texts: Vec<&str> = recent
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["decision 3", "decision 2", "decision 1"]);
}

#[test]
fn test_zero_ceiling_behaves_as_one() {
    let (_tmp, memory) = test_memory(|c| c.max_decisions = 0);
    store_decision(&memory, "first");
    store_decision(&memory, "second");

    // The ceiling clamps to one, so each insert replaces the previous row
    // instead of piling up past a ceiling of zero.
    assert_eq!(stats(&memory)["decision_count"], 1);
    let recent = memory
        .dispatch(Operation::GetRecentDecisions { limit: Some(10) })
        .unwrap();
    assert_eq!(recent[0]["text"], "second");
}

#[test]
fn test_recent_decisions_newest_first() {
    let (_tmp, memory) = test_memory(|_| {});
    store_decision(&memory, "older");
    store_decision(&memory, "newer");

    let recent = memory
        .dispatch(Operation::GetRecentDecisions { limit: Some(1) })
        .unwrap();
    assert_eq!(recent.as_array().unwrap().len(), 1);
    assert_eq!(recent[0]["text"], "newer");
}

#[test]
fn test_decision_text_is_sanitized_not_rejected() {
    let (_tmp, memory) = test_memory(|_| {});
    let id = store_decision(&memory, "  use\u{0} postgres  ");
    let recent = memory
        .dispatch(Operation::GetRecentDecisions { limit: Some(1) })
        .unwrap();
    assert_eq!(recent[0]["id"], id);
    assert_eq!(recent[0]["text"], "use postgres");
}

#[test]
fn test_decision_tags_are_deduplicated_and_sorted() {
    let (_tmp, memory) = test_memory(|_| {});
    memory
        .dispatch(Operation::StoreDecision {
            text: "tagged".to_string(),
            rationale: String::new(),
            tags: vec!["infra".to_string(), "cache".to_string(), "infra".to_string()],
        })
        .unwrap();
    let recent = memory
        .dispatch(Operation::GetRecentDecisions { limit: Some(1) })
        .unwrap();
    assert_eq!(recent[0]["tags"], json!(["cache", "infra"]));
}

#[test]
fn test_pattern_upsert_keeps_one_row_with_latest_description() {
    let (_tmp, memory) = test_memory(|_| {});
    for description in ["first draft", "second draft"] {
        memory
            .dispatch(Operation::StorePattern {
                name: "repo-layout".to_string(),
                description: description.to_string(),
                example: String::new(),
            })
            .unwrap();
    }

    let patterns = memory.dispatch(Operation::GetPatterns {}).unwrap();
    let patterns = patterns.as_array().unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0]["name"], "repo-layout");
    assert_eq!(patterns[0]["description"], "second draft");
}

#[test]
fn test_pattern_name_rejected_by_allowlist() {
    let (_tmp, memory) = test_memory(|_| {});
    let err = memory
        .dispatch(Operation::StorePattern {
            name: "bad name!".to_string(),
            description: "d".to_string(),
            example: String::new(),
        })
        .unwrap_err();
    assert!(matches!(err, MemoryError::ValidationError(_)));
    assert_eq!(stats(&memory)["pattern_count"], 0);
}

#[test]
fn test_context_roundtrip() {
    let (_tmp, memory) = test_memory(|_| {});
    memory
        .dispatch(Operation::SetContext {
            key: "api.base-url".to_string(),
            value: "https://internal.example".to_string(),
        })
        .unwrap();

    let got = memory
        .dispatch(Operation::GetContext {
            key: "api.base-url".to_string(),
        })
        .unwrap();
    assert_eq!(got["value"], "https://internal.example");

    let all = memory.dispatch(Operation::GetAllContext {}).unwrap();
    assert_eq!(all["api.base-url"], "https://internal.example");
}

#[test]
fn test_missing_context_key_is_not_found() {
    let (_tmp, memory) = test_memory(|_| {});
    let err = memory
        .dispatch(Operation::GetContext {
            key: "absent".to_string(),
        })
        .unwrap_err();
    assert!(matches!(err, MemoryError::NotFound(_)));
}

#[test]
fn test_invalid_context_key_leaves_count_unchanged() {
    let (_tmp, memory) = test_memory(|_| {});
    memory
        .dispatch(Operation::SetContext {
            key: "good".to_string(),
            value: "v".to_string(),
        })
        .unwrap();

    for bad in [&"k".repeat(101), &"path/to/thing".to_string()] {
        let err = memory
            .dispatch(Operation::SetContext {
                key: bad.clone(),
                value: "v".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, MemoryError::ValidationError(_)));
    }
    assert_eq!(stats(&memory)["context_key_count"], 1);
}

#[test]
fn test_clear_context_one_key_and_all() {
    let (_tmp, memory) = test_memory(|_| {});
    for key in ["a", "b", "c"] {
        memory
            .dispatch(Operation::SetContext {
                key: key.to_string(),
                value: "v".to_string(),
            })
            .unwrap();
    }

    let cleared = memory
        .dispatch(Operation::ClearContext {
            key: Some("b".to_string()),
        })
        .unwrap();
    assert_eq!(cleared["cleared"], 1);
    assert_eq!(stats(&memory)["context_key_count"], 2);

    let cleared = memory.dispatch(Operation::ClearContext { key: None }).unwrap();
    assert_eq!(cleared["cleared"], 2);
    assert_eq!(stats(&memory)["context_key_count"], 0);
}

#[test]
fn test_new_context_key_at_capacity_evicts_stalest() {
    let (_tmp, memory) = test_memory(|c| c.max_context_keys = 2);
    memory
        .dispatch(Operation::SetContext {
            key: "old".to_string(),
            value: "1".to_string(),
        })
        .unwrap();
    std::thread::sleep(Duration::from_millis(5));
    memory
        .dispatch(Operation::SetContext {
            key: "mid".to_string(),
            value: "2".to_string(),
        })
        .unwrap();
    std::thread::sleep(Duration::from_millis(5));

    // Updating an existing key never changes the count.
    memory
        .dispatch(Operation::SetContext {
            key: "old".to_string(),
            value: "1b".to_string(),
        })
        .unwrap();
    assert_eq!(stats(&memory)["context_key_count"], 2);

    // A new key at capacity evicts the least recently written ("mid").
    std::thread::sleep(Duration::from_millis(5));
    memory
        .dispatch(Operation::SetContext {
            key: "new".to_string(),
            value: "3".to_string(),
        })
        .unwrap();
    assert_eq!(stats(&memory)["context_key_count"], 2);
    let all = memory.dispatch(Operation::GetAllContext {}).unwrap();
    assert!(all.get("mid").is_none());
    assert_eq!(all["old"], "1b");
    assert_eq!(all["new"], "3");
}

#[test]
fn test_store_survives_reopen() {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("memory.db");

    {
        let memory = Memory::open(MemoryConfig::new(&path)).unwrap();
        memory
            .dispatch(Operation::StoreDecision {
                text: "persisted".to_string(),
                rationale: String::new(),
                tags: vec![],
            })
            .unwrap();
    }

    let memory = Memory::open(MemoryConfig::new(&path)).unwrap();
    let recent = memory
        .dispatch(Operation::GetRecentDecisions { limit: Some(1) })
        .unwrap();
    assert_eq!(recent[0]["text"], "persisted");
}
