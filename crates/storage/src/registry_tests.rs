// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

fn store() -> (tempfile::TempDir, RegistryStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = RegistryStore::new(dir.path());
    (dir, store)
}

fn provider_entry(pane: &str) -> Map<String, Value> {
    let mut entry = Map::new();
    entry.insert("pane_id".to_string(), json!(pane));
    entry.insert("pane_title_marker".to_string(), json!("CCB-codex-x"));
    entry
}

fn upsert_basic(store: &RegistryStore, session_id: &str, work_dir: &str, pane: &str) {
    let ok = store.upsert(&RegistryUpsert {
        ccb_session_id: session_id.to_string(),
        work_dir: Some(work_dir.to_string()),
        terminal: Some("tmux".to_string()),
        provider: Some((ccb_core::ProviderKind::Codex, provider_entry(pane))),
        ..Default::default()
    });
    assert!(ok);
}

#[test]
fn upsert_then_load_by_session_id() {
    let (_dir, store) = store();
    upsert_basic(&store, "s1", "/proj/a", "%1");

    let record = store.load_by_session_id("s1", None).unwrap();
    assert_eq!(record.ccb_session_id(), "s1");
    assert_eq!(record.session_name(), "default");
    let binding = record.pane_binding(ccb_core::ProviderKind::Codex).unwrap();
    assert_eq!(binding.pane_id, "%1");
    assert!(!record.effective_project_id().is_empty());
}

#[test]
fn load_by_session_id_filters_on_session_name() {
    let (_dir, store) = store();
    store.upsert(&RegistryUpsert {
        ccb_session_id: "s1".to_string(),
        ccb_session_name: Some("alt".to_string()),
        work_dir: Some("/proj/a".to_string()),
        provider: Some((ccb_core::ProviderKind::Codex, provider_entry("%1"))),
        ..Default::default()
    });
    assert!(store.load_by_session_id("s1", Some("alt")).is_some());
    assert!(store.load_by_session_id("s1", Some("other")).is_none());
    assert!(store.load_by_session_id("s1", None).is_some());
}

#[test]
fn stale_records_are_ignored() {
    let (dir, store) = store();
    upsert_basic(&store, "old", "/proj/a", "%1");

    // Rewrite updated_at beyond the TTL.
    let path = registry_path_for_session(dir.path(), "old");
    let raw = std::fs::read_to_string(&path).unwrap();
    let mut data: Value = serde_json::from_str(&raw).unwrap();
    data["updated_at"] = json!(1);
    std::fs::write(&path, serde_json::to_string(&data).unwrap()).unwrap();

    assert!(store.load_by_session_id("old", None).is_none());
    let project_id = ccb_core::compute_project_id(std::path::Path::new("/proj/a"));
    assert!(store
        .candidates_by_project(&project_id, ccb_core::ProviderKind::Codex, None)
        .is_empty());
}

#[test]
fn candidates_match_project_and_provider_newest_first() {
    let (dir, store) = store();
    upsert_basic(&store, "a", "/proj/one", "%1");
    upsert_basic(&store, "b", "/proj/one", "%2");
    upsert_basic(&store, "other", "/proj/two", "%9");

    // Force distinct timestamps so ordering is deterministic.
    for (id, ts) in [("a", 1_700_000_100i64), ("b", 1_700_000_200)] {
        let path = registry_path_for_session(dir.path(), id);
        let mut data: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        data["updated_at"] = json!(ts + now_offset());
        std::fs::write(&path, serde_json::to_string(&data).unwrap()).unwrap();
    }

    let project_id = ccb_core::compute_project_id(std::path::Path::new("/proj/one"));
    let candidates = store.candidates_by_project(&project_id, ccb_core::ProviderKind::Codex, None);
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].ccb_session_id(), "b");
    assert_eq!(candidates[1].ccb_session_id(), "a");

    // No entry for another provider.
    assert!(store
        .candidates_by_project(&project_id, ccb_core::ProviderKind::Gemini, None)
        .is_empty());
}

/// Keep synthetic timestamps within the TTL window relative to now.
fn now_offset() -> i64 {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    now - 1_700_000_300
}

#[test]
fn legacy_flat_fields_are_visible_and_migrated_on_upsert() {
    let (dir, store) = store();
    let path = registry_path_for_session(dir.path(), "legacy");
    std::fs::create_dir_all(dir.path()).unwrap();
    std::fs::write(
        &path,
        serde_json::to_string(&json!({
            "ccb_session_id": "legacy",
            "work_dir": "/proj/a",
            "codex_pane_id": "%5",
            "pane_title_marker": "CCB-codex-y",
            "updated_at": recent_ts(),
        }))
        .unwrap(),
    )
    .unwrap();

    let record = store.load_by_session_id("legacy", None).unwrap();
    let binding = record.pane_binding(ccb_core::ProviderKind::Codex).unwrap();
    assert_eq!(binding.pane_id, "%5");

    // Upserting a claude entry folds legacy codex fields into providers.
    store.upsert(&RegistryUpsert {
        ccb_session_id: "legacy".to_string(),
        provider: Some((ccb_core::ProviderKind::Claude, provider_entry("%6"))),
        ..Default::default()
    });
    let record = store.load_by_session_id("legacy", None).unwrap();
    let providers = record.data.get("providers").unwrap();
    assert_eq!(providers["codex"]["pane_id"], "%5");
    assert_eq!(providers["claude"]["pane_id"], "%6");
}

fn recent_ts() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

#[test]
fn upsert_skips_null_provider_fields_and_keeps_existing() {
    let (_dir, store) = store();
    upsert_basic(&store, "s1", "/proj/a", "%1");

    let mut entry = Map::new();
    entry.insert("pane_id".to_string(), Value::Null);
    entry.insert("codex_session_id".to_string(), json!("sess-9"));
    store.upsert(&RegistryUpsert {
        ccb_session_id: "s1".to_string(),
        provider: Some((ccb_core::ProviderKind::Codex, entry)),
        ..Default::default()
    });

    let record = store.load_by_session_id("s1", None).unwrap();
    let codex = record.provider_entry(ccb_core::ProviderKind::Codex).unwrap();
    assert_eq!(codex["pane_id"], "%1");
    assert_eq!(codex["codex_session_id"], "sess-9");
}

#[test]
fn upsert_without_session_id_is_rejected() {
    let (_dir, store) = store();
    assert!(!store.upsert(&RegistryUpsert::default()));
}
