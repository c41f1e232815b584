// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared atomic-write primitive.
//!
//! Writes go to a temp file in the destination directory, then rename into
//! place so readers only ever observe the previous or the new content. File
//! mode is tightened to 0600 on POSIX (best effort).

use std::io::Write;
use std::path::Path;

/// Atomically replace `path` with `text`.
pub fn atomic_write_text(path: &Path, text: &str) -> std::io::Result<()> {
    atomic_write_bytes(path, text.as_bytes())
}

/// Atomically replace `path` with a pretty-printed JSON document plus a
/// trailing newline.
pub fn atomic_write_json(path: &Path, value: &serde_json::Value) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec_pretty(value)?;
    payload.push(b'\n');
    atomic_write_bytes(path, &payload)
}

fn atomic_write_bytes(path: &Path, payload: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name_of(path)))
        .suffix(".tmp")
        .tempfile_in(parent)?;
    tmp.write_all(payload)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;

    restrict_mode(path);
    Ok(())
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string())
}

#[cfg(unix)]
fn restrict_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_mode(_path: &Path) {}

#[cfg(test)]
#[path = "atomic_tests.rs"]
mod tests;
