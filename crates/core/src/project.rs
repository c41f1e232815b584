// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stable project ids for request routing.
//!
//! A project id is a SHA-256 over the normalized absolute path of the nearest
//! anchor directory containing `.ccb_config/` (the work_dir itself when no
//! anchor exists). Ids are stable within one environment only; never compare
//! them across machines.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::scope::PROJECT_CONFIG_DIRNAME;

/// Normalize a work_dir into a stable string for hashing and matching:
/// expand `~`, absolutize, force `/` separators, collapse `.`/`..` segments
/// and redundant separators.
pub fn normalize_work_dir(value: &str) -> String {
    let raw = value.trim();
    if raw.is_empty() {
        return String::new();
    }

    let expanded = expand_home(raw);
    let absolute = if Path::new(&expanded).is_absolute() {
        expanded
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(&expanded).to_string_lossy().into_owned(),
            Err(_) => expanded,
        }
    };

    let forward = absolute.replace('\\', "/");
    // POSIX normpath semantics; a leading "//" prefix is preserved.
    if let Some(rest) = forward.strip_prefix("//").filter(|r| !r.starts_with('/')) {
        format!("//{}", normpath(rest).trim_start_matches('/'))
    } else {
        normpath(&forward)
    }
}

fn expand_home(raw: &str) -> String {
    if raw == "~" {
        if let Some(home) = dirs_home() {
            return home;
        }
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return format!("{}/{}", home.trim_end_matches('/'), rest);
        }
    }
    raw.to_string()
}

fn dirs_home() -> Option<String> {
    std::env::var_os("HOME").map(|h| h.to_string_lossy().into_owned())
}

/// Collapse `.`/`..` segments and duplicate slashes (pure string transform).
fn normpath(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(&p) if p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Find the project anchor: the work_dir itself when it contains
/// `.ccb_config/`. Lookup is local-only; ancestors are never consulted, so
/// sibling projects cannot pollute each other.
pub fn find_config_root(work_dir: &Path) -> Option<PathBuf> {
    let cfg = work_dir.join(PROJECT_CONFIG_DIRNAME);
    cfg.is_dir().then(|| work_dir.to_path_buf())
}

/// Compute the routing project id for `work_dir`.
pub fn compute_project_id(work_dir: &Path) -> String {
    let base = find_config_root(work_dir).unwrap_or_else(|| work_dir.to_path_buf());
    let mut norm = normalize_work_dir(&base.to_string_lossy());
    if norm.is_empty() {
        norm = normalize_work_dir(&work_dir.to_string_lossy());
    }
    let digest = Sha256::digest(norm.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
