// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-project session files.
//!
//! One JSON file per project, per provider, per session name, describing the
//! provider's pane and log bindings. Reads tolerate a UTF-8 BOM and treat
//! corrupt JSON as "no binding" without deleting the file; writes always go
//! through the atomic-write primitive.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

use ccb_core::{find_project_session_file, ProviderKind, DEFAULT_SESSION};

use crate::atomic::atomic_write_json;

#[derive(Debug, Error)]
pub enum SessionStoreError {
    #[error("session write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// A loaded session file plus its on-disk location.
#[derive(Debug, Clone)]
pub struct SessionFile {
    pub path: PathBuf,
    pub data: Map<String, Value>,
}

impl SessionFile {
    /// Read `path`, tolerating a BOM. Corrupt or non-object JSON yields an
    /// empty map; the file itself is never removed.
    pub fn read(path: &Path) -> SessionFile {
        let data = std::fs::read_to_string(path)
            .ok()
            .map(|raw| {
                let trimmed = raw.trim_start_matches('\u{feff}');
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(Value::Object(map)) => map,
                    _ => Map::new(),
                }
            })
            .unwrap_or_default();
        SessionFile {
            path: path.to_path_buf(),
            data,
        }
    }

    fn str_field(&self, key: &str) -> String {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Terminal kind, defaulting to tmux.
    pub fn terminal(&self) -> String {
        let t = self.str_field("terminal");
        if t.is_empty() {
            "tmux".to_string()
        } else {
            t
        }
    }

    /// Pane id, falling back to the legacy `tmux_session` field under tmux.
    pub fn pane_id(&self) -> String {
        let pane = self.str_field("pane_id");
        if pane.is_empty() && self.terminal() == "tmux" {
            return self.str_field("tmux_session");
        }
        pane
    }

    pub fn pane_title_marker(&self) -> String {
        self.str_field("pane_title_marker")
    }

    pub fn work_dir(&self) -> PathBuf {
        let wd = self.str_field("work_dir");
        if wd.is_empty() {
            self.path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        } else {
            PathBuf::from(wd)
        }
    }

    /// Directory for crash logs and other session-scoped runtime files.
    pub fn runtime_dir(&self) -> PathBuf {
        let dir = self.str_field("runtime_dir");
        if dir.is_empty() {
            self.path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        } else {
            PathBuf::from(dir)
        }
    }

    /// Command used to respawn a dead tmux pane. A provider-specific
    /// `<key>_start_cmd` wins over the generic `start_cmd`.
    pub fn start_cmd(&self, kind: ProviderKind) -> String {
        let specific = self.str_field(&format!("{}_start_cmd", kind.key()));
        if specific.is_empty() {
            self.str_field("start_cmd")
        } else {
            specific
        }
    }

    /// Tri-state `active`: only an explicit `false` deactivates.
    pub fn is_active(&self) -> bool {
        !matches!(self.data.get("active"), Some(Value::Bool(false)))
    }

    pub fn project_id(&self) -> String {
        self.str_field("ccb_project_id")
    }

    pub fn ccb_session_id(&self) -> String {
        self.str_field("ccb_session_id")
    }

    /// Provider log binding: `(<key>_session_id, <key>_session_path)`.
    pub fn log_binding(&self, kind: ProviderKind) -> (Option<String>, Option<PathBuf>) {
        let id = self.str_field(&format!("{}_session_id", kind.key()));
        let path = self.str_field(&format!("{}_session_path", kind.key()));
        (
            (!id.is_empty()).then_some(id),
            (!path.is_empty()).then(|| PathBuf::from(path)),
        )
    }

    pub fn set_pane_id(&mut self, pane_id: &str) {
        self.data
            .insert("pane_id".to_string(), Value::String(pane_id.to_string()));
        self.touch();
    }

    /// Record a newly-observed provider log binding. Returns true when a
    /// field actually changed (callers skip the write-back otherwise).
    pub fn update_log_binding(
        &mut self,
        kind: ProviderKind,
        log_path: Option<&Path>,
        session_id: Option<&str>,
    ) -> bool {
        let mut updated = false;
        if let Some(path) = log_path {
            let key = format!("{}_session_path", kind.key());
            let value = path.to_string_lossy().into_owned();
            if self.data.get(&key).and_then(Value::as_str) != Some(value.as_str()) {
                self.data.insert(key, Value::String(value));
                updated = true;
            }
        }
        if let Some(id) = session_id.filter(|s| !s.is_empty()) {
            let key = format!("{}_session_id", kind.key());
            if self.data.get(&key).and_then(Value::as_str) != Some(id) {
                self.data.insert(key, Value::String(id.to_string()));
                if kind == ProviderKind::Codex {
                    self.data.insert(
                        "codex_start_cmd".to_string(),
                        Value::String(format!("codex resume {id}")),
                    );
                }
                updated = true;
            }
        }
        if updated {
            if matches!(self.data.get("active"), Some(Value::Bool(false))) {
                self.data.insert("active".to_string(), Value::Bool(true));
            }
            self.touch();
        }
        updated
    }

    /// Refresh the informational `updated_at` timestamp.
    pub fn touch(&mut self) {
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        self.data
            .insert("updated_at".to_string(), Value::String(now));
    }

    /// Persist through the atomic-write primitive.
    pub fn write_back(&self) -> Result<(), SessionStoreError> {
        atomic_write_json(&self.path, &Value::Object(self.data.clone()))?;
        Ok(())
    }
}

/// Load the session file for `(work_dir, provider)` under the given session
/// name. Returns `None` when no file exists or it decodes to nothing.
pub fn load_project_session(
    work_dir: &Path,
    kind: ProviderKind,
    session_name: &str,
) -> Option<SessionFile> {
    let name = if session_name.is_empty() {
        DEFAULT_SESSION
    } else {
        session_name
    };
    let path = find_project_session_file(work_dir, name, kind.spec().session_file_name, false)?;
    let session = SessionFile::read(&path);
    (!session.data.is_empty()).then_some(session)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
