// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex rollout-log reader.
//!
//! Codex appends JSONL rollout files under `~/.codex/sessions/` (nested by
//! date). Each log opens with a `session_meta` entry carrying the session
//! uuid and the working directory. The reader binds to a specific session id
//! when the project session file records one; dropping that filter and
//! rebinding to the newest log for the work dir is the anchor-grace escape
//! hatch.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::cursor::FileCursor;
use super::entry::{parse_log_entry, read_session_meta};
use super::{LogEvent, LogReader};
use crate::env;

/// Default rollout root (`$CODEX_SESSIONS_ROOT` or `~/.codex/sessions`).
pub fn default_sessions_root() -> PathBuf {
    env::codex_sessions_root()
}

/// Upper bound for the newest-N directory scan (`CCB_CODEX_SCAN_LIMIT`).
pub fn codex_scan_limit() -> usize {
    std::env::var("CCB_CODEX_SCAN_LIMIT")
        .ok()
        .and_then(|s| s.trim().parse::<usize>().ok())
        .unwrap_or(400)
        .clamp(50, 20_000)
}

/// Extract the first uuid-shaped substring (Codex session ids).
pub fn find_uuid(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let widths = [8usize, 4, 4, 4, 12];
    let total = 36;
    if bytes.len() < total {
        return None;
    }
    'outer: for start in 0..=(bytes.len() - total) {
        let mut pos = start;
        for (i, width) in widths.iter().enumerate() {
            for _ in 0..*width {
                if !bytes[pos].is_ascii_hexdigit() {
                    continue 'outer;
                }
                pos += 1;
            }
            if i < widths.len() - 1 {
                if bytes[pos] != b'-' {
                    continue 'outer;
                }
                pos += 1;
            }
        }
        return Some(text[start..start + total].to_ascii_lowercase());
    }
    None
}

/// Newest log whose filename contains `session_id`.
pub fn find_latest_log_for_session_id(root: &Path, session_id: &str) -> Option<PathBuf> {
    if session_id.is_empty() {
        return None;
    }
    walk_jsonl(root, usize::MAX)
        .into_iter()
        .filter(|(_, p)| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(session_id))
        })
        .max_by_key(|(mtime, _)| *mtime)
        .map(|(_, p)| p)
}

/// Newest log (bounded to the `limit` most recent) whose `session_meta.cwd`
/// lies within `work_dir`.
pub fn scan_latest_log_for_work_dir(
    root: &Path,
    work_dir: &Path,
    limit: usize,
) -> Option<(PathBuf, Option<String>)> {
    let mut logs = walk_jsonl(root, usize::MAX);
    logs.sort_by_key(|(mtime, _)| std::cmp::Reverse(*mtime));
    for (_, path) in logs.into_iter().take(limit) {
        let (cwd, sid) = read_session_meta(&path);
        let Some(cwd) = cwd else { continue };
        if path_within(Path::new(&cwd), work_dir) {
            return Some((path, sid));
        }
    }
    None
}

/// All `.jsonl` files under `root` with mtimes, recursion bounded.
fn walk_jsonl(root: &Path, limit: usize) -> Vec<(i64, PathBuf)> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|x| x == "jsonl") {
                let mtime = std::fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(-1);
                out.push((mtime, path));
                if out.len() >= limit {
                    return out;
                }
            }
        }
    }
    out
}

fn path_within(child: &Path, parent: &Path) -> bool {
    let resolve = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    let child = resolve(child);
    let parent = resolve(parent);
    child == parent || child.starts_with(&parent)
}

pub struct CodexLogReader {
    root: PathBuf,
    work_dir: PathBuf,
    preferred_log: Option<PathBuf>,
    session_id_filter: Option<String>,
    cursor: FileCursor,
    poll: Duration,
}

impl CodexLogReader {
    pub fn new(
        work_dir: &Path,
        preferred_log: Option<PathBuf>,
        session_id_filter: Option<String>,
    ) -> CodexLogReader {
        Self::with_root(
            env::codex_sessions_root(),
            work_dir,
            preferred_log,
            session_id_filter,
        )
    }

    pub fn with_root(
        root: PathBuf,
        work_dir: &Path,
        preferred_log: Option<PathBuf>,
        session_id_filter: Option<String>,
    ) -> CodexLogReader {
        CodexLogReader {
            root,
            work_dir: work_dir.to_path_buf(),
            preferred_log,
            session_id_filter: session_id_filter.filter(|s| !s.is_empty()),
            cursor: FileCursor::default(),
            poll: env::log_poll_interval(),
        }
    }

    /// Pick the log to read: the id filter wins, then the recorded binding,
    /// then a bounded scan by work dir.
    fn select_log(&self) -> Option<PathBuf> {
        if let Some(sid) = &self.session_id_filter {
            if let Some(path) = find_latest_log_for_session_id(&self.root, sid) {
                return Some(path);
            }
        }
        if let Some(preferred) = self.preferred_log.as_ref().filter(|p| p.exists()) {
            return Some(preferred.clone());
        }
        scan_latest_log_for_work_dir(&self.root, &self.work_dir, codex_scan_limit())
            .map(|(path, _)| path)
    }
}

#[async_trait]
impl LogReader for CodexLogReader {
    fn capture(&mut self) {
        let log = self.select_log();
        self.cursor = FileCursor::at_end(log);
    }

    async fn wait_for_events(&mut self, timeout: Duration) -> Vec<LogEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(log) = self.select_log() {
                self.cursor.follow(&log);
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
        self.session_id_filter = None;
        self.preferred_log = None;
        let log = self.select_log();
        self.cursor = FileCursor::at_tail(log, tail_bytes);
    }
}

#[cfg(test)]
#[path = "codex_tests.rs"]
mod tests;
