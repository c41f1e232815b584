// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude session-log reader.
//!
//! Claude writes one JSONL file per session under
//! `~/.claude/projects/<project-key>/`, where the project key is the work
//! directory with every non-alphanumeric character replaced by `-`. A
//! `sessions-index.json` is preferred when present but always cross-checked
//! against a filesystem scan: in practice the index can lag and would
//! otherwise pin an outdated log. Sidechain sessions never carry replies.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::cursor::FileCursor;
use super::entry::parse_log_entry;
use super::{LogEvent, LogReader};
use crate::env;

pub struct ClaudeLogReader {
    root: PathBuf,
    work_dir: PathBuf,
    preferred_session: Option<PathBuf>,
    use_sessions_index: bool,
    cursor: FileCursor,
    poll: Duration,
}

impl ClaudeLogReader {
    pub fn new(work_dir: &Path) -> ClaudeLogReader {
        Self::with_root(env::claude_projects_root(), work_dir)
    }

    pub fn with_root(root: PathBuf, work_dir: &Path) -> ClaudeLogReader {
        ClaudeLogReader {
            root,
            work_dir: work_dir.to_path_buf(),
            preferred_session: None,
            use_sessions_index: true,
            cursor: FileCursor::default(),
            poll: env::log_poll_interval(),
        }
    }

    /// Pin the session recorded in the project's session file.
    pub fn set_preferred_session(&mut self, path: &Path) {
        if path.exists() {
            self.preferred_session = Some(path.to_path_buf());
        }
    }

    fn project_key(path: &Path) -> String {
        path.to_string_lossy()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect()
    }

    fn candidate_dirs(&self) -> Vec<PathBuf> {
        let mut candidates = vec![self.work_dir.clone()];
        if let Ok(resolved) = std::fs::canonicalize(&self.work_dir) {
            if resolved != self.work_dir {
                candidates.push(resolved);
            }
        }
        let mut out = Vec::new();
        for dir in candidates {
            let key = Self::project_key(&dir);
            let path = self.root.join(key);
            if !out.contains(&path) {
                out.push(path);
            }
        }
        out
    }

    fn project_dir(&self) -> PathBuf {
        let candidates = self.candidate_dirs();
        candidates
            .iter()
            .find(|c| c.exists())
            .cloned()
            .or_else(|| candidates.last().cloned())
            .unwrap_or_else(|| self.root.join(Self::project_key(&self.work_dir)))
    }

    /// `Some(true)` when an early entry marks the session as a sidechain.
    fn session_is_sidechain(path: &Path) -> Option<bool> {
        let file = std::fs::File::open(path).ok()?;
        let reader = std::io::BufReader::new(file);
        for line in reader.lines().map_while(Result::ok).take(20) {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(entry) = serde_json::from_str::<Value>(trimmed) else {
                continue;
            };
            if let Some(flag) = entry.get("isSidechain") {
                return flag.as_bool();
            }
        }
        None
    }

    fn parse_sessions_index(&self) -> Option<PathBuf> {
        if !self.use_sessions_index {
            return None;
        }
        let project_dir = self.project_dir();
        let raw = std::fs::read_to_string(project_dir.join("sessions-index.json")).ok()?;
        let payload: Value = serde_json::from_str(&raw).ok()?;
        let entries = payload.get("entries")?.as_array()?;

        let candidates: Vec<String> = candidate_project_paths(&self.work_dir);
        let mut best: Option<(i64, PathBuf)> = None;
        for entry in entries {
            if entry.get("isSidechain").and_then(Value::as_bool) == Some(true) {
                continue;
            }
            match entry.get("projectPath").and_then(Value::as_str) {
                Some(project_path) if !project_path.trim().is_empty() => {
                    let normalized = normalize_project_path(project_path);
                    if !candidates.is_empty() && !candidates.contains(&normalized) {
                        continue;
                    }
                }
                _ if !candidates.is_empty() => continue,
                _ => {}
            }
            let Some(full_path) = entry.get("fullPath").and_then(Value::as_str) else {
                continue;
            };
            let mut session_path = PathBuf::from(full_path.trim());
            if !session_path.is_absolute() {
                session_path = project_dir.join(session_path);
            }
            if !session_path.exists() {
                continue;
            }
            let mtime = entry
                .get("fileMtime")
                .and_then(Value::as_i64)
                .or_else(|| mtime_millis(&session_path));
            let Some(mtime) = mtime else { continue };
            if best.as_ref().is_none_or(|(b, _)| mtime > *b) {
                best = Some((mtime, session_path));
            }
        }
        best.map(|(_, path)| path)
    }

    fn scan_dir(dir: &Path) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.is_file()
                    && p.extension().is_some_and(|x| x == "jsonl")
                    && p.file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| !n.starts_with('.'))
            })
            .collect()
    }

    fn scan_latest_session(&self) -> Option<PathBuf> {
        let project_dir = self.project_dir();
        let mut sessions = Self::scan_dir(&project_dir);

        // When the project dir is empty, also look beside the preferred
        // session (a registry hit may live under a different project key).
        if sessions.is_empty() {
            if let Some(preferred_dir) = self.preferred_session.as_ref().and_then(|p| p.parent()) {
                if preferred_dir != project_dir {
                    sessions = Self::scan_dir(preferred_dir);
                }
            }
        }
        if sessions.is_empty() {
            return None;
        }

        sessions.sort_by_key(|p| std::cmp::Reverse(mtime_millis(p).unwrap_or(-1)));

        // Prefer confirmed non-sidechain, then unknown, then anything.
        let mut first_unknown: Option<PathBuf> = None;
        for session in &sessions {
            match Self::session_is_sidechain(session) {
                Some(false) => return Some(session.clone()),
                None if first_unknown.is_none() => first_unknown = Some(session.clone()),
                _ => {}
            }
        }
        first_unknown.or_else(|| sessions.first().cloned())
    }

    fn latest_session(&mut self) -> Option<PathBuf> {
        let index_session = self.parse_sessions_index();
        let scanned = self.scan_latest_session();
        let preferred = self
            .preferred_session
            .clone()
            .filter(|p| p.exists());

        let newest = match &preferred {
            Some(pref) => {
                // Only race preferred against a scan from the same directory;
                // a scan from the project dir wins outright so a stale
                // cross-project preference cannot pin us elsewhere.
                let cross_dir = scanned
                    .as_ref()
                    .is_some_and(|s| s.parent() != pref.parent());
                if cross_dir {
                    pick_newest([index_session.clone(), scanned.clone()])
                } else {
                    pick_newest([Some(pref.clone()), index_session.clone(), scanned.clone()])
                }
            }
            None => pick_newest([index_session.clone(), scanned.clone()]),
        };

        let winner = newest.or(preferred);
        if let Some(path) = &winner {
            self.preferred_session = Some(path.clone());
        }
        winner
    }
}

#[async_trait]
impl LogReader for ClaudeLogReader {
    fn capture(&mut self) {
        let session = self.latest_session();
        self.cursor = FileCursor::at_end(session);
    }

    async fn wait_for_events(&mut self, timeout: Duration) -> Vec<LogEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(session) = self.latest_session() {
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
        let session = self.latest_session();
        self.cursor = FileCursor::at_tail(session, tail_bytes);
    }
}

fn mtime_millis(path: &Path) -> Option<i64> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok()?;
    let since = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(since.as_millis() as i64)
}

fn pick_newest<const N: usize>(paths: [Option<PathBuf>; N]) -> Option<PathBuf> {
    let mut best: Option<(i64, PathBuf)> = None;
    for path in paths.into_iter().flatten() {
        if !path.exists() {
            continue;
        }
        let mtime = mtime_millis(&path).unwrap_or(-1);
        if best.as_ref().is_none_or(|(b, _)| mtime > *b) {
            best = Some((mtime, path));
        }
    }
    best.map(|(_, p)| p)
}

fn normalize_project_path(value: &str) -> String {
    let trimmed = value.trim();
    let resolved = std::fs::canonicalize(trimmed)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| trimmed.to_string());
    resolved.replace('\\', "/").trim_end_matches('/').to_string()
}

fn candidate_project_paths(work_dir: &Path) -> Vec<String> {
    let mut out = Vec::new();
    for candidate in [
        Some(work_dir.to_path_buf()),
        std::fs::canonicalize(work_dir).ok(),
    ]
    .into_iter()
    .flatten()
    {
        let normalized = normalize_project_path(&candidate.to_string_lossy());
        if !normalized.is_empty() && !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
