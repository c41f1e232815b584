// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cross-process advisory file locks.
//!
//! Keyed by `(provider, scope)` so a daemon and a direct-mode client cannot
//! interleave requests in the same pane. Locks record the holder pid; a lock
//! whose holder is gone is taken over. Non-blocking acquisition only: waits
//! are the caller's loop so async callers never park a runtime thread here.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a lock serializes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockScope {
    /// One instance per provider per user (the daemon singleton).
    Global,
    /// One in-flight request per session key.
    Session(String),
    /// One in-flight request per directory.
    Dir(PathBuf),
}

impl LockScope {
    fn file_name(&self, provider_key: &str) -> String {
        match self {
            LockScope::Global => format!("{provider_key}-daemon.lock"),
            LockScope::Session(key) => {
                format!("{provider_key}-{}.lock", short_hash(&format!("session:{key}")))
            }
            LockScope::Dir(path) => {
                format!("{provider_key}-{}.lock", short_hash(&path.to_string_lossy()))
            }
        }
    }
}

fn short_hash(value: &str) -> String {
    let digest = Sha256::digest(value.as_bytes());
    let hex = format!("{digest:x}");
    hex[..8].to_string()
}

/// An advisory file lock under the runtime directory.
#[derive(Debug)]
pub struct ProcessLock {
    path: PathBuf,
    file: Option<File>,
    acquired: bool,
}

impl ProcessLock {
    pub fn new(run_dir: &Path, provider_key: &str, scope: &LockScope) -> ProcessLock {
        ProcessLock {
            path: run_dir.join(scope.file_name(provider_key)),
            file: None,
            acquired: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Try to acquire without blocking. A lock held by a dead process is
    /// removed and re-acquired.
    pub fn try_acquire(&mut self) -> Result<bool, LockError> {
        if self.acquired {
            return Ok(true);
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if self.lock_once()? {
            return Ok(true);
        }

        if self.holder_is_dead() {
            let _ = std::fs::remove_file(&self.path);
            self.file = None;
            if self.lock_once()? {
                return Ok(true);
            }
        }

        self.file = None;
        Ok(false)
    }

    fn lock_once(&mut self) -> Result<bool, LockError> {
        let file = match self.file.take() {
            Some(f) => f,
            None => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?,
        };
        match file.try_lock_exclusive() {
            Ok(()) => {
                self.write_pid(&file)?;
                self.file = Some(file);
                self.acquired = true;
                Ok(true)
            }
            Err(_) => {
                self.file = Some(file);
                Ok(false)
            }
        }
    }

    fn write_pid(&self, mut file: &File) -> Result<(), LockError> {
        let pid_line = format!("{}\n", std::process::id());
        file.seek(SeekFrom::Start(0))?;
        file.write_all(pid_line.as_bytes())?;
        file.set_len(pid_line.len() as u64)?;
        Ok(())
    }

    /// Read the recorded pid and probe it. Unreadable contents count as a
    /// live holder (never steal a lock we cannot attribute).
    fn holder_is_dead(&self) -> bool {
        let mut content = String::new();
        let readable = File::open(&self.path)
            .and_then(|mut f| f.read_to_string(&mut content))
            .is_ok();
        if !readable {
            return false;
        }
        match content.trim().parse::<u32>() {
            Ok(pid) => !pid_alive(pid),
            Err(_) => false,
        }
    }

    /// Release on every exit path; dropping also releases.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if self.acquired {
                let _ = fs2::FileExt::unlock(&file);
            }
        }
        self.acquired = false;
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Probe a pid with `ps -p`; assume alive when the probe itself fails.
fn pid_alive(pid: u32) -> bool {
    let pid = pid.to_string();
    match std::process::Command::new("ps")
        .args(["-p", pid.as_str()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(_) => true,
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
