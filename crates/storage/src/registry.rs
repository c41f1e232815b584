// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-project pane registry.
//!
//! One JSON record per multiplexer-level session under `$HOME/.ccb/run/`,
//! indexing live sessions by project id and provider. Records older than the
//! TTL are ignored; merges are last-writer-wins per field. Liveness filtering
//! happens in the engine: this module returns fresh candidates sorted
//! newest-first and the engine probes panes asynchronously.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use ccb_core::{compute_project_id, normalize_session_name, ProviderKind, DEFAULT_SESSION};

use crate::atomic::atomic_write_json;

pub const REGISTRY_PREFIX: &str = "ccb-session-";
pub const REGISTRY_SUFFIX: &str = ".json";
pub const REGISTRY_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Default registry directory: `$HOME/.ccb/run`.
pub fn registry_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_default().join(".ccb").join("run")
}

pub fn registry_path_for_session(dir: &Path, session_id: &str) -> PathBuf {
    dir.join(format!("{REGISTRY_PREFIX}{session_id}{REGISTRY_SUFFIX}"))
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn normalize_name(raw: Option<&str>) -> String {
    raw.and_then(|s| normalize_session_name(s).ok())
        .unwrap_or_else(|| DEFAULT_SESSION.to_string())
}

/// Pane fields a provider entry carries for re-binding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneBinding {
    pub pane_id: String,
    pub pane_title_marker: String,
}

/// One registry record, as loaded from disk.
#[derive(Debug, Clone)]
pub struct RegistryRecord {
    pub path: PathBuf,
    pub data: Map<String, Value>,
    pub updated_at: i64,
}

impl RegistryRecord {
    fn load(path: &Path) -> Option<RegistryRecord> {
        let raw = std::fs::read_to_string(path).ok()?;
        let data = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                tracing::debug!(path = %path.display(), "unreadable registry record");
                return None;
            }
        };
        let updated_at = coerce_updated_at(data.get("updated_at"), path);
        Some(RegistryRecord {
            path: path.to_path_buf(),
            data,
            updated_at,
        })
    }

    pub fn is_stale(&self, now: i64) -> bool {
        self.updated_at <= 0 || (now - self.updated_at) > REGISTRY_TTL_SECONDS
    }

    fn str_field(&self, key: &str) -> String {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    pub fn ccb_session_id(&self) -> String {
        self.str_field("ccb_session_id")
    }

    pub fn session_name(&self) -> String {
        normalize_name(self.data.get("ccb_session_name").and_then(Value::as_str))
    }

    pub fn work_dir(&self) -> String {
        self.str_field("work_dir")
    }

    pub fn terminal(&self) -> String {
        let t = self.str_field("terminal");
        if t.is_empty() {
            "tmux".to_string()
        } else {
            t
        }
    }

    /// Recorded project id, or one recomputed from `work_dir` for records
    /// written before the field existed.
    pub fn effective_project_id(&self) -> String {
        let existing = self.str_field("ccb_project_id");
        if !existing.is_empty() {
            return existing;
        }
        let wd = self.work_dir();
        if wd.is_empty() {
            String::new()
        } else {
            compute_project_id(Path::new(&wd))
        }
    }

    /// True when the record had no recorded project id and routing had to
    /// recompute it; the winning record gets the id persisted.
    pub fn needs_project_id_migration(&self) -> bool {
        self.str_field("ccb_project_id").is_empty() && !self.work_dir().is_empty()
    }

    /// Provider map view with legacy flat fields migrated in (read-only).
    pub fn providers(&self) -> Map<String, Value> {
        let mut out = match self.data.get("providers") {
            Some(Value::Object(map)) => map
                .iter()
                .filter(|(_, v)| v.is_object())
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.clone()))
                .collect(),
            _ => Map::new(),
        };
        for (provider, entry) in legacy_provider_entries(&self.data) {
            out.entry(provider).or_insert(Value::Object(entry));
        }
        out
    }

    pub fn provider_entry(&self, kind: ProviderKind) -> Option<Map<String, Value>> {
        match self.providers().remove(kind.key()) {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        }
    }

    pub fn pane_binding(&self, kind: ProviderKind) -> Option<PaneBinding> {
        let entry = self.provider_entry(kind)?;
        let field = |key: &str| {
            entry
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim()
                .to_string()
        };
        Some(PaneBinding {
            pane_id: field("pane_id"),
            pane_title_marker: field("pane_title_marker"),
        })
    }
}

fn coerce_updated_at(value: Option<&Value>, fallback_path: &Path) -> i64 {
    match value {
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(Value::String(s)) if s.trim().bytes().all(|b| b.is_ascii_digit()) => {
            s.trim().parse().unwrap_or(0)
        }
        _ => std::fs::metadata(fallback_path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0),
    }
}

/// Best-effort migration of legacy flat keys into `providers.<p>.*`.
fn legacy_provider_entries(data: &Map<String, Value>) -> Vec<(String, Map<String, Value>)> {
    let mut out = Vec::new();

    let mut codex = Map::new();
    for (src, dst) in [
        ("codex_pane_id", "pane_id"),
        ("pane_title_marker", "pane_title_marker"),
        ("codex_session_id", "codex_session_id"),
        ("codex_session_path", "codex_session_path"),
    ] {
        if let Some(v) = data.get(src).filter(|v| !v.is_null()) {
            codex.insert(dst.to_string(), v.clone());
        }
    }
    if codex.contains_key("pane_id") {
        out.push(("codex".to_string(), codex));
    }

    if let Some(v) = data.get("claude_pane_id").filter(|v| !v.is_null()) {
        let mut claude = Map::new();
        claude.insert("pane_id".to_string(), v.clone());
        out.push(("claude".to_string(), claude));
    }

    out
}

/// Fields to merge into a registry record.
#[derive(Debug, Clone, Default)]
pub struct RegistryUpsert {
    pub ccb_session_id: String,
    pub ccb_session_name: Option<String>,
    pub ccb_project_id: Option<String>,
    pub work_dir: Option<String>,
    pub terminal: Option<String>,
    /// Provider entry to upsert; `null` values are skipped during the merge.
    pub provider: Option<(ProviderKind, Map<String, Value>)>,
}

/// Registry access rooted at one directory.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    dir: PathBuf,
}

impl RegistryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the default `$HOME/.ccb/run` location.
    pub fn open_default() -> Self {
        Self::new(registry_dir())
    }

    pub fn record_path(&self, session_id: &str) -> PathBuf {
        registry_path_for_session(&self.dir, session_id)
    }

    fn iter_records(&self) -> Vec<RegistryRecord> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(REGISTRY_PREFIX) && n.ends_with(REGISTRY_SUFFIX))
            })
            .collect();
        paths.sort();
        paths.iter().filter_map(|p| RegistryRecord::load(p)).collect()
    }

    /// Direct lookup by multiplexer-level session id.
    pub fn load_by_session_id(
        &self,
        session_id: &str,
        session_name: Option<&str>,
    ) -> Option<RegistryRecord> {
        if session_id.is_empty() {
            return None;
        }
        let record = RegistryRecord::load(&self.record_path(session_id))?;
        if let Some(want) = session_name {
            if record.session_name() != normalize_name(Some(want)) {
                return None;
            }
        }
        if record.is_stale(now_unix()) {
            tracing::debug!(session_id, "registry record is stale");
            return None;
        }
        Some(record)
    }

    /// Fresh records matching `(project_id, provider, session_name)`, newest
    /// first. The caller applies pane-liveness filtering; the
    /// liveness-agnostic fallback is simply the first element.
    pub fn candidates_by_project(
        &self,
        project_id: &str,
        kind: ProviderKind,
        session_name: Option<&str>,
    ) -> Vec<RegistryRecord> {
        let project_id = project_id.trim();
        if project_id.is_empty() {
            return Vec::new();
        }
        let want_name = session_name.map(|s| normalize_name(Some(s)));
        let now = now_unix();

        let mut matches: Vec<RegistryRecord> = self
            .iter_records()
            .into_iter()
            .filter(|r| !r.is_stale(now))
            .filter(|r| want_name.as_ref().is_none_or(|w| &r.session_name() == w))
            .filter(|r| r.effective_project_id() == project_id)
            .filter(|r| r.provider_entry(kind).is_some())
            .collect();
        matches.sort_by_key(|r| std::cmp::Reverse(r.updated_at));
        matches
    }

    /// Fresh records carrying a `provider` entry regardless of project id,
    /// newest first. Only for callers that hold the explicit cross-project
    /// opt-in.
    pub fn candidates_any_project(
        &self,
        kind: ProviderKind,
        session_name: Option<&str>,
    ) -> Vec<RegistryRecord> {
        let want_name = session_name.map(|s| normalize_name(Some(s)));
        let now = now_unix();
        let mut matches: Vec<RegistryRecord> = self
            .iter_records()
            .into_iter()
            .filter(|r| !r.is_stale(now))
            .filter(|r| want_name.as_ref().is_none_or(|w| &r.session_name() == w))
            .filter(|r| r.provider_entry(kind).is_some())
            .collect();
        matches.sort_by_key(|r| std::cmp::Reverse(r.updated_at));
        matches
    }

    /// Merge `update` into the record for its session id (creating it if
    /// absent) and stamp `updated_at`. Legacy flat fields already on disk are
    /// folded into `providers` on the way through.
    pub fn upsert(&self, update: &RegistryUpsert) -> bool {
        let session_id = update.ccb_session_id.trim();
        if session_id.is_empty() {
            tracing::debug!("registry upsert skipped: missing ccb_session_id");
            return false;
        }
        let path = self.record_path(session_id);
        if std::fs::create_dir_all(&self.dir).is_err() {
            return false;
        }
        restrict_dir_mode(&self.dir);

        let mut data = RegistryRecord::load(&path).map(|r| r.data).unwrap_or_default();

        let mut providers = match data.remove("providers") {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        for (provider, entry) in legacy_provider_entries(&data) {
            providers.entry(provider).or_insert(Value::Object(entry));
        }
        if let Some((kind, entry)) = &update.provider {
            let slot = providers
                .entry(kind.key().to_string())
                .or_insert(Value::Object(Map::new()));
            if let Value::Object(slot) = slot {
                for (k, v) in entry {
                    if !v.is_null() {
                        slot.insert(k.clone(), v.clone());
                    }
                }
            }
        }

        data.insert(
            "ccb_session_id".to_string(),
            Value::String(session_id.to_string()),
        );
        data.insert(
            "ccb_session_name".to_string(),
            Value::String(normalize_name(update.ccb_session_name.as_deref())),
        );
        for (key, value) in [
            ("ccb_project_id", &update.ccb_project_id),
            ("work_dir", &update.work_dir),
            ("terminal", &update.terminal),
        ] {
            if let Some(v) = value.as_deref().filter(|v| !v.trim().is_empty()) {
                data.insert(key.to_string(), Value::String(v.to_string()));
            }
        }
        data.insert("providers".to_string(), Value::Object(providers));

        // Ensure a project id exists (best effort from work_dir).
        let has_project_id = data
            .get("ccb_project_id")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !has_project_id {
            if let Some(wd) = data.get("work_dir").and_then(Value::as_str) {
                let wd = wd.trim();
                if !wd.is_empty() {
                    data.insert(
                        "ccb_project_id".to_string(),
                        Value::String(compute_project_id(Path::new(wd))),
                    );
                }
            }
        }

        data.insert("updated_at".to_string(), Value::Number(now_unix().into()));

        match atomic_write_json(&path, &Value::Object(data)) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "registry write failed");
                false
            }
        }
    }
}

#[cfg(unix)]
fn restrict_dir_mode(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700));
}

#[cfg(not(unix))]
fn restrict_dir_mode(_dir: &Path) {}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
