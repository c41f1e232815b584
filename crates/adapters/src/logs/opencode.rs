// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenCode storage reader.
//!
//! OpenCode persists conversations as one JSON document per message under
//! `storage/session/message/<session-id>/`, with reply text in part files
//! under `storage/session/part/<message-id>/` (or inline `parts`). Message
//! ids sort chronologically, so the cursor is a count over the sorted
//! listing rather than a byte offset.
//!
//! Cancellation (`CCB_OASKD_CANCEL_DETECT`, off by default) watches two
//! signals: an aborted assistant message in storage attributable to our
//! req id, and a `session.abort`/`session.cancel` line in the server log
//! newer than the request start. The storage baseline never advances on a
//! non-cancelled scan, since OpenCode can mark an already-streamed message as
//! aborted after the fact.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::cursor::FileCursor;
use super::{LogEvent, LogReader, Role};
use crate::env;

pub struct OpenCodeLogReader {
    storage_root: PathBuf,
    log_root: PathBuf,
    session_filter: Option<String>,
    session_id: Option<String>,
    seen: usize,
    baseline: usize,
    cancel_enabled: bool,
    cancel_log: Option<FileCursor>,
    poll: Duration,
}

impl OpenCodeLogReader {
    pub fn new(session_filter: Option<String>) -> OpenCodeLogReader {
        Self::with_roots(
            env::opencode_storage_root(),
            env::opencode_log_root(),
            session_filter,
        )
    }

    pub fn with_roots(
        storage_root: PathBuf,
        log_root: PathBuf,
        session_filter: Option<String>,
    ) -> OpenCodeLogReader {
        OpenCodeLogReader {
            storage_root,
            log_root,
            session_filter: session_filter.filter(|s| !s.is_empty()),
            session_id: None,
            seen: 0,
            baseline: 0,
            cancel_enabled: env::opencode_cancel_detect(),
            cancel_log: None,
            poll: env::log_poll_interval(),
        }
    }

    /// Session id the reader is currently bound to (persisted back into the
    /// project session file by the adapter).
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn message_root(&self) -> PathBuf {
        self.storage_root.join("session").join("message")
    }

    fn part_root(&self) -> PathBuf {
        self.storage_root.join("session").join("part")
    }

    /// The bound session, or the most recently active one.
    fn select_session(&self) -> Option<String> {
        if let Some(filter) = &self.session_filter {
            if self.message_root().join(filter).is_dir() {
                return Some(filter.clone());
            }
        }
        let Ok(entries) = std::fs::read_dir(self.message_root()) else {
            return None;
        };
        let mut best: Option<(std::time::SystemTime, String)> = None;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let modified = newest_mtime_in(&path);
            if best.as_ref().is_none_or(|(b, _)| modified > *b) {
                best = Some((modified, name.to_string()));
            }
        }
        best.map(|(_, name)| name)
    }

    fn message_files(&self, session_id: &str) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(self.message_root().join(session_id)) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == "json"))
            .collect();
        files.sort();
        files
    }

    fn read_message(&self, path: &Path) -> Option<Value> {
        let raw = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    /// Reply text for one message: inline parts, else the part directory.
    fn message_text(&self, message: &Value) -> String {
        if let Some(parts) = message.get("parts").and_then(Value::as_array) {
            return join_text_parts(parts.iter());
        }
        let Some(message_id) = message.get("id").and_then(Value::as_str) else {
            return String::new();
        };
        let Ok(entries) = std::fs::read_dir(self.part_root().join(message_id)) else {
            return String::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|x| x == "json"))
            .collect();
        files.sort();
        let parts: Vec<Value> = files
            .iter()
            .filter_map(|p| self.read_message(p))
            .collect();
        join_text_parts(parts.iter())
    }

    fn message_event(&self, message: &Value) -> Option<LogEvent> {
        let role = match message.get("role").and_then(Value::as_str)? {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            _ => return None,
        };
        let text = self.message_text(message);
        (!text.is_empty()).then(|| LogEvent::new(role, text))
    }

    fn follow(&mut self, session_id: &str) {
        if self.session_id.as_deref() != Some(session_id) {
            self.session_id = Some(session_id.to_string());
            self.seen = 0;
            self.baseline = 0;
        }
    }

    /// Aborted assistant message in storage, attributable to `req_id` via
    /// the nearest preceding user message.
    fn storage_cancel(&self, req_id: &str) -> bool {
        let Some(session_id) = self.session_id.as_deref() else {
            return false;
        };
        let files = self.message_files(session_id);
        let messages: Vec<Value> = files
            .iter()
            .filter_map(|p| self.read_message(p))
            .collect();
        let needle = format!("CCB_REQ_ID: {req_id}");
        for (i, message) in messages.iter().enumerate().skip(self.baseline) {
            if message.get("role").and_then(Value::as_str) != Some("assistant") {
                continue;
            }
            if !is_aborted_message(message) {
                continue;
            }
            let attributed = messages[..i].iter().rev().find_map(|m| {
                (m.get("role").and_then(Value::as_str) == Some("user"))
                    .then(|| self.message_text(m).contains(&needle))
            });
            if attributed == Some(true) {
                return true;
            }
        }
        false
    }

    /// `session.abort` / `session.cancel` line for our session in the
    /// newest server log, past the capture-time offset.
    fn server_log_cancel(&mut self) -> bool {
        let Some(session_id) = self.session_id.clone() else {
            return false;
        };
        let Some(cursor) = self.cancel_log.as_mut() else {
            return false;
        };
        cursor.read_new_lines().iter().any(|line| {
            line.contains(&session_id)
                && (line.contains("session.abort") || line.contains("session.cancel"))
        })
    }

    fn newest_server_log(&self) -> Option<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.log_root) else {
            return None;
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|x| x == "log"))
            .max_by_key(|p| std::fs::metadata(p).and_then(|m| m.modified()).ok())
    }
}

fn newest_mtime_in(dir: &Path) -> std::time::SystemTime {
    let own = std::fs::metadata(dir)
        .and_then(|m| m.modified())
        .unwrap_or(std::time::UNIX_EPOCH);
    let Ok(entries) = std::fs::read_dir(dir) else {
        return own;
    };
    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok().and_then(|m| m.modified().ok()))
        .fold(own, |acc, t| acc.max(t))
}

fn join_text_parts<'a>(parts: impl Iterator<Item = &'a Value>) -> String {
    let texts: Vec<&str> = parts
        .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    texts.join("\n")
}

fn is_aborted_message(message: &Value) -> bool {
    let error = message.get("error");
    let name = error
        .and_then(|e| e.get("name"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    name.contains("MessageAborted")
        || error
            .and_then(Value::as_str)
            .is_some_and(|e| e.contains("MessageAborted"))
}

#[async_trait]
impl LogReader for OpenCodeLogReader {
    fn capture(&mut self) {
        if let Some(session_id) = self.select_session() {
            self.session_id = Some(session_id.clone());
            self.seen = self.message_files(&session_id).len();
        } else {
            self.session_id = None;
            self.seen = 0;
        }
        self.baseline = self.seen;
        if self.cancel_enabled {
            self.cancel_log = Some(FileCursor::at_end(self.newest_server_log()));
        }
    }

    async fn wait_for_events(&mut self, timeout: Duration) -> Vec<LogEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(session_id) = self.select_session() {
                self.follow(&session_id);
                let files = self.message_files(&session_id);
                if files.len() < self.seen {
                    self.seen = 0;
                    self.baseline = 0;
                }
                let events: Vec<LogEvent> = files[self.seen.min(files.len())..]
                    .iter()
                    .filter_map(|p| self.read_message(p))
                    .filter_map(|m| self.message_event(&m))
                    .collect();
                self.seen = files.len();
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
        self.session_id
            .as_deref()
            .map(|sid| self.message_root().join(sid))
    }

    fn rebind_to_tail(&mut self, _tail_bytes: u64) {
        // Storage is message-granular; rebinding drops the session filter
        // and re-scans the active session from its baseline.
        self.session_filter = None;
        self.session_id = None;
        if let Some(session_id) = self.select_session() {
            self.follow(&session_id);
        }
    }

    fn check_cancelled(&mut self, req_id: &str) -> bool {
        if !self.cancel_enabled {
            return false;
        }
        self.server_log_cancel() || self.storage_cancel(req_id)
    }
}

#[cfg(test)]
#[path = "opencode_tests.rs"]
mod tests;
