// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider session-log readers.
//!
//! Each provider ships a small typed adapter over its opaque on-disk log.
//! A reader owns its cursor: `capture` snapshots the current log and seeks
//! to its end, `wait_for_events` blocks up to a timeout and decodes anything
//! appended since. Logs are written by an external process, so readers swallow
//! transient I/O errors and re-discover the current file when it rotates.

mod claude;
mod codex;
mod cursor;
mod droid;
mod entry;
mod gemini;
mod opencode;

pub use claude::ClaudeLogReader;
pub use codex::{
    codex_scan_limit, default_sessions_root, find_latest_log_for_session_id, find_uuid,
    scan_latest_log_for_work_dir, CodexLogReader,
};
pub use cursor::FileCursor;
pub use droid::{read_droid_session_start, DroidLogReader};
pub use entry::{parse_log_entry, read_session_meta};
pub use gemini::GeminiLogReader;
pub use opencode::OpenCodeLogReader;

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Who produced a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    Info,
}

/// One decoded log event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub role: Role,
    pub text: String,
}

impl LogEvent {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Capability set over one provider's session log.
#[async_trait]
pub trait LogReader: Send {
    /// Bind to the current log and move the cursor to its end. Events from
    /// before the snapshot are never reported.
    fn capture(&mut self);

    /// Block up to `timeout`; return events appended since the cursor.
    /// Returns early as soon as at least one event decodes.
    async fn wait_for_events(&mut self, timeout: Duration) -> Vec<LogEvent>;

    /// The log file events are currently read from.
    fn current_log_path(&self) -> Option<PathBuf>;

    /// Drop any session-id filter, rebind to the newest log, and restart
    /// from `len - tail_bytes` so an in-flight reply is not missed.
    fn rebind_to_tail(&mut self, tail_bytes: u64);

    /// Provider-side cancellation attributable to `req_id`. Readers without
    /// a cancel signal report false.
    fn check_cancelled(&mut self, _req_id: &str) -> bool {
        false
    }
}
