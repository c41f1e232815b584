// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user runtime directory: daemon state files, logs, and locks.
//!
//! Resolution: `$CCB_RUN_DIR`, else `$XDG_CACHE_HOME/ccb`, else
//! `$HOME/.cache/ccb`. Logs are capped by rewriting the file in place with
//! only the trailing bytes kept, rate-limited so the size check does not run
//! on every line.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::RngCore;

const DEFAULT_LOG_MAX_BYTES: u64 = 2 * 1024 * 1024;
const DEFAULT_SHRINK_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Resolve the runtime directory.
pub fn run_dir() -> PathBuf {
    if let Some(dir) = env_path("CCB_RUN_DIR") {
        return dir;
    }
    if let Some(cache) = env_path("XDG_CACHE_HOME") {
        return cache.join("ccb");
    }
    dirs::home_dir().unwrap_or_default().join(".cache").join("ccb")
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Daemon state file path under `dir` (`caskd` → `caskd.json`).
pub fn state_file_path(dir: &Path, name: &str) -> PathBuf {
    if name.ends_with(".json") {
        dir.join(name)
    } else {
        dir.join(format!("{name}.json"))
    }
}

/// Daemon log path under `dir` (`caskd` → `caskd.log`).
pub fn log_path(dir: &Path, name: &str) -> PathBuf {
    if name.ends_with(".log") {
        dir.join(name)
    } else {
        dir.join(format!("{name}.log"))
    }
}

/// 16 random bytes, hex-encoded: the per-daemon shared secret.
pub fn random_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Map wildcard bind addresses to a connectable loopback host.
pub fn normalize_connect_host(host: &str) -> String {
    match host.trim() {
        "" | "0.0.0.0" => "127.0.0.1".to_string(),
        "::" | "[::]" => "::1".to_string(),
        other => other.to_string(),
    }
}

/// Append-only daemon log with a size cap.
///
/// Writes create the file privately (dir 0700, file 0600, best effort) and
/// shrink it to the trailing `CCB_LOG_MAX_BYTES` when it grows past the cap.
/// The size check is rate-limited to once per
/// `CCB_LOG_SHRINK_CHECK_INTERVAL_S`.
#[derive(Debug)]
pub struct RuntimeLog {
    path: PathBuf,
    last_shrink_check: Mutex<Option<Instant>>,
}

impl RuntimeLog {
    pub fn new(path: impl Into<PathBuf>) -> RuntimeLog {
        RuntimeLog {
            path: path.into(),
            last_shrink_check: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the log for appending, applying the shrink policy and secure
    /// creation first. Used both directly and as a tracing writer.
    pub fn open_append(&self) -> std::io::Result<std::fs::File> {
        self.maybe_shrink();
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
            restrict_dir_mode(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        restrict_file_mode(&self.path);
        Ok(file)
    }

    /// Append one line (trailing whitespace trimmed, newline added).
    /// Best effort: logging must never take the daemon down.
    pub fn write_line(&self, msg: &str) {
        if let Ok(mut file) = self.open_append() {
            let _ = writeln!(file, "{}", msg.trim_end());
        }
    }

    fn maybe_shrink(&self) {
        let max_bytes = env_u64("CCB_LOG_MAX_BYTES").unwrap_or(DEFAULT_LOG_MAX_BYTES);
        if max_bytes == 0 {
            return;
        }
        let interval = env_u64("CCB_LOG_SHRINK_CHECK_INTERVAL_S")
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SHRINK_CHECK_INTERVAL);

        {
            let mut last = self.last_shrink_check.lock();
            if !interval.is_zero() {
                if let Some(prev) = *last {
                    if prev.elapsed() < interval {
                        return;
                    }
                }
            }
            *last = Some(Instant::now());
        }

        let _ = self.shrink_to_tail(max_bytes);
    }

    /// Rewrite the log keeping only the trailing `max_bytes`.
    fn shrink_to_tail(&self, max_bytes: u64) -> std::io::Result<()> {
        let size = std::fs::metadata(&self.path)?.len();
        if size <= max_bytes {
            return Ok(());
        }

        let mut file = std::fs::File::open(&self.path)?;
        file.seek(SeekFrom::End(-(max_bytes as i64)))?;
        let mut tail = Vec::with_capacity(max_bytes as usize);
        file.read_to_end(&mut tail)?;

        let parent = self.path.parent().unwrap_or(Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!(".{}.", self.file_name()))
            .suffix(".tmp")
            .tempfile_in(parent)?;
        tmp.write_all(&tail)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        restrict_file_mode(&self.path);
        Ok(())
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "daemon.log".to_string())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(unix)]
fn restrict_dir_mode(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700));
}

#[cfg(unix)]
fn restrict_file_mode(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_dir_mode(_dir: &Path) {}

#[cfg(not(unix))]
fn restrict_file_mode(_path: &Path) {}

#[cfg(test)]
#[path = "runtime_tests.rs"]
mod tests;
