// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session resolution: project session file first, registry second.
//!
//! Registry candidates come pre-filtered (fresh, project-matching, provider
//! entry present) and sorted newest-first; this module applies pane-liveness
//! asynchronously and falls back to the newest record when every pane is
//! transiently dead. Without a `.ccb_config/` anchor and without the
//! cross-project opt-in, the registry is never consulted.

use std::path::Path;

use serde_json::Value;

use ccb_adapters::TerminalBackend;
use ccb_core::{compute_project_id, find_config_root, ProviderKind};
use ccb_storage::{load_project_session, RegistryRecord, RegistryStore, SessionFile};

use crate::engine::BackendFactory;
use crate::env;

/// Resolve the session for `(work_dir, provider)`.
pub async fn resolve_session<F: BackendFactory>(
    factory: &F,
    registry: &RegistryStore,
    work_dir: &Path,
    kind: ProviderKind,
    session_name: &str,
) -> Option<SessionFile> {
    if let Some(session) = load_project_session(work_dir, kind, session_name) {
        if session.is_active() {
            return Some(session);
        }
        return None;
    }

    if find_config_root(work_dir).is_none() && !env::cross_project_allowed() {
        return None;
    }

    let project_id = compute_project_id(work_dir);
    let mut candidates = registry.candidates_by_project(&project_id, kind, Some(session_name));
    if candidates.is_empty() && env::cross_project_allowed() {
        candidates = registry.candidates_any_project(kind, Some(session_name));
    }
    if candidates.is_empty() {
        return None;
    }

    let chosen = pick_alive(factory, &candidates, kind).await;
    let record = chosen.or_else(|| candidates.first().cloned())?;

    // Persist a recomputed project id onto the winning record only.
    if record.needs_project_id_migration() {
        let _ = registry.upsert(&ccb_storage::RegistryUpsert {
            ccb_session_id: record.ccb_session_id(),
            ccb_project_id: Some(project_id.clone()),
            work_dir: Some(record.work_dir()),
            ..Default::default()
        });
    }

    session_from_record(&record, kind, work_dir)
}

/// First candidate whose pane the backend reports alive, either directly or
/// after marker re-resolution.
async fn pick_alive<F: BackendFactory>(
    factory: &F,
    candidates: &[RegistryRecord],
    kind: ProviderKind,
) -> Option<RegistryRecord> {
    for record in candidates {
        let Some(binding) = record.pane_binding(kind) else {
            continue;
        };
        let Some(backend) = factory.backend_for(&record.terminal()) else {
            continue;
        };

        let mut pane_id = binding.pane_id.clone();
        if pane_id.is_empty() && !binding.pane_title_marker.is_empty() {
            pane_id = backend
                .find_pane_by_title_marker(&binding.pane_title_marker)
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
        }
        if pane_id.is_empty() {
            continue;
        }
        if backend.is_alive(&pane_id).await.unwrap_or(false) {
            return Some(record.clone());
        }
        if !binding.pane_title_marker.is_empty() {
            if let Ok(Some(found)) = backend
                .find_pane_by_title_marker(&binding.pane_title_marker)
                .await
            {
                if backend.is_alive(&found).await.unwrap_or(false) {
                    return Some(record.clone());
                }
            }
        }
    }
    None
}

/// Materialize a session from a registry record: prefer the recorded session
/// file, else synthesize one from the record's provider entry.
fn session_from_record(
    record: &RegistryRecord,
    kind: ProviderKind,
    work_dir: &Path,
) -> Option<SessionFile> {
    let entry = record.provider_entry(kind)?;

    if let Some(path) = entry.get("session_file").and_then(Value::as_str) {
        let path = Path::new(path.trim());
        if path.exists() {
            let session = SessionFile::read(path);
            if !session.data.is_empty() && session.is_active() {
                return Some(session);
            }
        }
    }

    let mut data = serde_json::Map::new();
    data.insert("terminal".to_string(), Value::String(record.terminal()));
    let record_wd = record.work_dir();
    let wd = if record_wd.is_empty() {
        work_dir.to_string_lossy().into_owned()
    } else {
        record_wd
    };
    data.insert("work_dir".to_string(), Value::String(wd.clone()));
    data.insert(
        "ccb_project_id".to_string(),
        Value::String(record.effective_project_id()),
    );
    data.insert(
        "ccb_session_id".to_string(),
        Value::String(record.ccb_session_id()),
    );
    let sid_key = format!("{}_session_id", kind.key());
    let spath_key = format!("{}_session_path", kind.key());
    for key in ["pane_id", "pane_title_marker", sid_key.as_str(), spath_key.as_str()] {
        if let Some(value) = entry.get(key).filter(|v| !v.is_null()) {
            data.insert(key.to_string(), value.clone());
        }
    }
    if data.get("pane_id").is_none() && data.get("pane_title_marker").is_none() {
        return None;
    }

    let path = Path::new(&wd)
        .join(ccb_core::PROJECT_CONFIG_DIRNAME)
        .join(kind.spec().session_file_name);
    Some(SessionFile { path, data })
}

/// Session key for routing: provider plus project id.
pub fn session_key_for(session: Option<&SessionFile>, work_dir: &Path, kind: ProviderKind) -> String {
    let project_id = session
        .map(|s| s.project_id())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| {
            let wd = session.map(|s| s.work_dir()).unwrap_or_else(|| work_dir.to_path_buf());
            compute_project_id(&wd)
        });
    kind.session_key(&project_id)
}

#[cfg(test)]
#[path = "route_tests.rs"]
mod tests;
