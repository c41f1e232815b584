// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal detection for the process that mounts a session.
//!
//! Inside a tmux client the `TMUX` variable is set; `WEZTERM_PANE` marks a
//! WezTerm pane. Detection only matters at pane-creation time; requests
//! always follow the session file's recorded `terminal` field.

/// Detect the surrounding multiplexer: `"tmux"`, `"wezterm"`, or `None`.
pub fn detect_terminal() -> Option<&'static str> {
    let has = |name: &str| std::env::var(name).is_ok_and(|v| !v.trim().is_empty());
    if has("TMUX") {
        return Some("tmux");
    }
    if has("WEZTERM_PANE") {
        return Some("wezterm");
    }
    None
}
