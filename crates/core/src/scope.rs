// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named-session scoping for per-project config files.
//!
//! Session files live under `.ccb_config/` for the default session and under
//! `.ccb_config/sessions/<name>/` for named sessions. Lookup never walks up
//! the directory tree.

use std::path::{Path, PathBuf};

use thiserror::Error;

pub const DEFAULT_SESSION: &str = "default";
pub const SESSION_ENV_VAR: &str = "CCB_SESSION";
pub const SESSION_DIRNAME: &str = "sessions";
pub const PROJECT_CONFIG_DIRNAME: &str = ".ccb_config";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeError {
    #[error("session name is empty")]
    Empty,
    #[error("session name must not be '.' or '..'")]
    DotSegment,
    #[error("session name must not contain path separators")]
    PathSeparator,
    #[error("invalid session name; use 1-64 chars: [a-z0-9][a-z0-9._-]*")]
    InvalidChars,
}

/// Normalize a session name: lower-case, `[a-z0-9][a-z0-9._-]{0,63}`.
pub fn normalize_session_name(raw: &str) -> Result<String, ScopeError> {
    let name = raw.trim().to_ascii_lowercase();
    if name.is_empty() {
        return Err(ScopeError::Empty);
    }
    if name == "." || name == ".." {
        return Err(ScopeError::DotSegment);
    }
    if name.contains('/') || name.contains('\\') {
        return Err(ScopeError::PathSeparator);
    }
    let mut bytes = name.bytes();
    let head_ok = bytes
        .next()
        .is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    let tail_ok =
        bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'.' | b'_' | b'-'));
    if !head_ok || !tail_ok || name.len() > 64 {
        return Err(ScopeError::InvalidChars);
    }
    Ok(name)
}

/// Resolve the active session name.
///
/// Precedence: explicit value, then `CCB_SESSION`, then `default`. A corrupt
/// env value falls back to `default`; a corrupt explicit value is an error.
pub fn resolve_session_name(explicit: Option<&str>) -> Result<String, ScopeError> {
    if let Some(name) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        return normalize_session_name(name);
    }
    let from_env = std::env::var(SESSION_ENV_VAR).unwrap_or_default();
    let candidate = from_env.trim();
    if candidate.is_empty() {
        return Ok(DEFAULT_SESSION.to_string());
    }
    Ok(normalize_session_name(candidate).unwrap_or_else(|_| DEFAULT_SESSION.to_string()))
}

/// Directory holding session-scoped config files.
///
/// - default session: `<work_dir>/.ccb_config/`
/// - named session:   `<work_dir>/.ccb_config/sessions/<name>/`
pub fn project_session_dir(work_dir: &Path, session: &str) -> PathBuf {
    let cfg = work_dir.join(PROJECT_CONFIG_DIRNAME);
    if session == DEFAULT_SESSION {
        cfg
    } else {
        cfg.join(SESSION_DIRNAME).join(session)
    }
}

/// Find a session file for `session` in `work_dir`.
///
/// Lookup is local-only and backward compatible:
/// 1. `<work_dir>/.ccb_config/sessions/<session>/<filename>` (named sessions)
/// 2. `<work_dir>/.ccb_config/<filename>` (default/legacy)
/// 3. `<work_dir>/<filename>` (legacy root dotfile)
///
/// With `strict` and a named session, only (1) is checked so an explicit
/// session never silently routes to the default session's files.
pub fn find_project_session_file(
    work_dir: &Path,
    session: &str,
    filename: &str,
    strict: bool,
) -> Option<PathBuf> {
    let filename = filename.trim();
    if filename.is_empty() {
        return None;
    }

    if session != DEFAULT_SESSION {
        let candidate = project_session_dir(work_dir, session).join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        if strict {
            return None;
        }
    }

    let default_candidate = project_session_dir(work_dir, DEFAULT_SESSION).join(filename);
    if default_candidate.exists() {
        return Some(default_candidate);
    }

    let legacy = work_dir.join(filename);
    legacy.exists().then_some(legacy)
}

#[cfg(test)]
#[path = "scope_tests.rs"]
mod tests;
