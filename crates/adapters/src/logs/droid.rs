// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Droid session-log reader.
//!
//! Droid appends JSONL session files under `~/.factory/sessions/`. Each file
//! opens with a `session_start` record naming the working directory and the
//! session id; message entries use the common role/content shape.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::cursor::FileCursor;
use super::entry::parse_log_entry;
use super::{LogEvent, LogReader};
use crate::env;

/// Read `(cwd, session id)` from a session's `session_start` record.
pub fn read_droid_session_start(path: &Path) -> (Option<String>, Option<String>) {
    let Ok(file) = std::fs::File::open(path) else {
        return (None, None);
    };
    let reader = std::io::BufReader::new(file);
    for line in reader.lines().map_while(Result::ok).take(30) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<Value>(trimmed) else {
            continue;
        };
        if entry.get("type").and_then(Value::as_str) != Some("session_start") {
            continue;
        }
        let field = |keys: &[&str]| {
            keys.iter().find_map(|k| {
                entry
                    .get(*k)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            })
        };
        return (
            field(&["cwd", "workingDirectory"]),
            field(&["session_id", "sessionId", "id"]),
        );
    }
    (None, None)
}

pub struct DroidLogReader {
    root: PathBuf,
    work_dir: PathBuf,
    preferred_session: Option<PathBuf>,
    session_id_hint: Option<String>,
    cursor: FileCursor,
    poll: Duration,
}

impl DroidLogReader {
    pub fn new(work_dir: &Path) -> DroidLogReader {
        Self::with_root(env::droid_sessions_root(), work_dir)
    }

    pub fn with_root(root: PathBuf, work_dir: &Path) -> DroidLogReader {
        DroidLogReader {
            root,
            work_dir: work_dir.to_path_buf(),
            preferred_session: None,
            session_id_hint: None,
            cursor: FileCursor::default(),
            poll: env::log_poll_interval(),
        }
    }

    pub fn set_preferred_session(&mut self, path: &Path) {
        if path.exists() {
            self.preferred_session = Some(path.to_path_buf());
        }
    }

    pub fn set_session_id_hint(&mut self, session_id: &str) {
        if !session_id.trim().is_empty() {
            self.session_id_hint = Some(session_id.trim().to_string());
        }
    }

    fn list_sessions(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == "jsonl"))
            .collect();
        files.sort_by_key(|p| {
            std::cmp::Reverse(
                std::fs::metadata(p)
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::UNIX_EPOCH),
            )
        });
        files
    }

    /// Selection order: recorded path, id hint, then newest session whose
    /// `session_start.cwd` lies within the work dir.
    fn select_session(&self) -> Option<PathBuf> {
        if let Some(preferred) = self.preferred_session.as_ref().filter(|p| p.exists()) {
            return Some(preferred.clone());
        }
        let sessions = self.list_sessions();
        if let Some(hint) = &self.session_id_hint {
            if let Some(hit) = sessions.iter().find(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains(hint.as_str()))
            }) {
                return Some(hit.clone());
            }
        }
        sessions
            .iter()
            .find(|p| {
                let (cwd, _) = read_droid_session_start(p);
                cwd.is_some_and(|c| {
                    let child = Path::new(&c);
                    child == self.work_dir || child.starts_with(&self.work_dir)
                })
            })
            .cloned()
            .or_else(|| sessions.first().cloned())
    }
}

#[async_trait]
impl LogReader for DroidLogReader {
    fn capture(&mut self) {
        let session = self.select_session();
        self.cursor = FileCursor::at_end(session);
    }

    async fn wait_for_events(&mut self, timeout: Duration) -> Vec<LogEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(session) = self.select_session() {
                self.cursor.follow(&session);
                let events: Vec<LogEvent> = self
                    .cursor
                    .read_new_lines()
                    .iter()
                    .filter_map(|l| parse_log_entry(l))
                    .collect();
                if !events.is_empty() {
                    return events;
                }
            }
            if Instant::now() >= deadline {
                return Vec::new();
            }
            tokio::time::sleep(self.poll.min(deadline - Instant::now())).await;
        }
    }

    fn current_log_path(&self) -> Option<PathBuf> {
        self.cursor.path.clone()
    }

    fn rebind_to_tail(&mut self, tail_bytes: u64) {
        self.preferred_session = None;
        self.session_id_hint = None;
        let session = self.select_session();
        self.cursor = FileCursor::at_tail(session, tail_bytes);
    }
}

#[cfg(test)]
#[path = "droid_tests.rs"]
mod tests;
