// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the adapters crate.

use std::path::PathBuf;
use std::time::Duration;

pub(crate) fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => default,
            "0" | "false" | "no" | "off" => false,
            _ => true,
        },
        Err(_) => default,
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_default()
}

/// Claude session logs: `$CLAUDE_PROJECTS_ROOT` or `~/.claude/projects`.
pub(crate) fn claude_projects_root() -> PathBuf {
    env_path("CLAUDE_PROJECTS_ROOT").unwrap_or_else(|| home().join(".claude").join("projects"))
}

/// Codex rollout logs: `$CODEX_SESSIONS_ROOT` or `~/.codex/sessions`.
pub(crate) fn codex_sessions_root() -> PathBuf {
    env_path("CODEX_SESSIONS_ROOT").unwrap_or_else(|| home().join(".codex").join("sessions"))
}

/// Gemini chat files: `$GEMINI_CHATS_ROOT` or `~/.gemini/tmp`.
pub(crate) fn gemini_chats_root() -> PathBuf {
    env_path("GEMINI_CHATS_ROOT").unwrap_or_else(|| home().join(".gemini").join("tmp"))
}

/// OpenCode storage: `$OPENCODE_STORAGE_ROOT` or
/// `~/.local/share/opencode/storage`.
pub(crate) fn opencode_storage_root() -> PathBuf {
    env_path("OPENCODE_STORAGE_ROOT").unwrap_or_else(|| {
        home()
            .join(".local")
            .join("share")
            .join("opencode")
            .join("storage")
    })
}

/// OpenCode server logs: `$OPENCODE_LOG_ROOT` or `~/.local/share/opencode/log`.
pub(crate) fn opencode_log_root() -> PathBuf {
    env_path("OPENCODE_LOG_ROOT")
        .unwrap_or_else(|| home().join(".local").join("share").join("opencode").join("log"))
}

/// Droid session logs: `$DROID_SESSIONS_ROOT` or `~/.factory/sessions`.
pub(crate) fn droid_sessions_root() -> PathBuf {
    env_path("DROID_SESSIONS_ROOT").unwrap_or_else(|| home().join(".factory").join("sessions"))
}

/// Log poll interval, clamped to 20–500 ms (default 50 ms).
pub(crate) fn log_poll_interval() -> Duration {
    let ms = std::env::var("CCB_LOG_POLL_MS")
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(50);
    Duration::from_millis(ms.clamp(20, 500))
}

/// WezTerm binary override (`CCB_WEZTERM_BIN`, default `wezterm`).
pub(crate) fn wezterm_bin() -> String {
    std::env::var("CCB_WEZTERM_BIN")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "wezterm".to_string())
}

/// WezTerm Enter key strategy: `auto` (key then CR), `key` (strict), `text`.
pub(crate) fn wezterm_enter_method() -> String {
    let raw = std::env::var("CCB_WEZTERM_ENTER_METHOD").unwrap_or_default();
    let method = raw.trim().to_ascii_lowercase();
    match method.as_str() {
        "key" | "text" => method,
        _ => "auto".to_string(),
    }
}

/// Codex pane-text interrupt detection (see the provider adapter docs).
pub(crate) fn codex_interrupt_detect() -> bool {
    env_bool("CCB_CASKD_INTERRUPT_DETECT", true)
}

/// OpenCode cancellation detection (disabled by default; attribution of a
/// session-scoped cancel to one queued task is heuristic).
pub(crate) fn opencode_cancel_detect() -> bool {
    env_bool("CCB_OASKD_CANCEL_DETECT", false)
}
