// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental line cursor over an append-only file.
//!
//! Tracks a byte offset plus a carry buffer for the trailing partial line,
//! so lines are never split across reads or rotations. A shrinking file
//! resets the cursor to zero (truncate-and-rewrite rotation).

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct FileCursor {
    pub path: Option<PathBuf>,
    pub offset: u64,
    carry: Vec<u8>,
}

impl FileCursor {
    /// Cursor at the end of `path` (nothing already on disk is reported).
    pub fn at_end(path: Option<PathBuf>) -> FileCursor {
        let offset = path
            .as_deref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);
        FileCursor {
            path,
            offset,
            carry: Vec::new(),
        }
    }

    /// Cursor `tail_bytes` before the end of `path`.
    pub fn at_tail(path: Option<PathBuf>, tail_bytes: u64) -> FileCursor {
        let size = path
            .as_deref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);
        FileCursor {
            path,
            offset: size.saturating_sub(tail_bytes),
            carry: Vec::new(),
        }
    }

    /// Point at a (possibly different) file, resetting to offset zero when
    /// the file changed.
    pub fn follow(&mut self, path: &Path) {
        if self.path.as_deref() != Some(path) {
            self.path = Some(path.to_path_buf());
            self.offset = 0;
            self.carry.clear();
        }
    }

    /// Read complete lines appended since the last call. Transient I/O
    /// errors yield no lines and leave the cursor unchanged.
    pub fn read_new_lines(&mut self) -> Vec<String> {
        let Some(path) = self.path.clone() else {
            return Vec::new();
        };
        let Ok(size) = std::fs::metadata(&path).map(|m| m.len()) else {
            return Vec::new();
        };
        if size < self.offset {
            self.offset = 0;
            self.carry.clear();
        }
        if size == self.offset {
            return Vec::new();
        }

        let Ok(mut file) = std::fs::File::open(&path) else {
            return Vec::new();
        };
        if file.seek(SeekFrom::Start(self.offset)).is_err() {
            return Vec::new();
        }
        let mut data = Vec::new();
        if file.read_to_end(&mut data).is_err() {
            return Vec::new();
        }
        self.offset += data.len() as u64;

        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(&data);

        let mut lines: Vec<String> = Vec::new();
        let mut start = 0usize;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' {
                lines.push(String::from_utf8_lossy(&buf[start..i]).into_owned());
                start = i + 1;
            }
        }
        if start < buf.len() {
            self.carry = buf[start..].to_vec();
        }
        lines
    }
}

#[cfg(test)]
#[path = "cursor_tests.rs"]
mod tests;
