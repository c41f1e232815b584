// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal multiplexer backends.
//!
//! A backend can check pane liveness, inject text, and re-find a pane by its
//! title marker. The tmux backend additionally respawns dead panes in place.
//! Pane ids churn; the title marker is the authoritative way to re-find a
//! pane before declaring it dead.

mod detect;
mod tmux;
mod wezterm;

pub use detect::detect_terminal;
pub use tmux::TmuxBackend;
pub use wezterm::WeztermBackend;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBackend, FakePane, TerminalCall};

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors from backend operations
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("pane not found: {0}")]
    PaneNotFound(String),
    #[error("command failed: {0}")]
    CommandFailed(String),
    #[error("{0} does not support {1}")]
    Unsupported(&'static str, &'static str),
}

/// Capability set over a terminal multiplexer.
#[async_trait]
pub trait TerminalBackend: Clone + Send + Sync + 'static {
    /// Whether the pane exists and its process has not exited.
    async fn is_alive(&self, pane_id: &str) -> Result<bool, TerminalError>;

    /// Atomically place `text` into the pane and press Enter.
    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), TerminalError>;

    /// Re-find a pane whose title contains `marker`.
    async fn find_pane_by_title_marker(
        &self,
        marker: &str,
    ) -> Result<Option<String>, TerminalError>;

    /// Visible pane text, last `lines` rows.
    async fn capture_text(&self, pane_id: &str, lines: u32) -> Result<String, TerminalError>;

    /// Restart a dead pane in place (tmux only).
    async fn respawn_pane(
        &self,
        pane_id: &str,
        cmd: &str,
        cwd: &Path,
        remain_on_exit: bool,
    ) -> Result<(), TerminalError>;

    /// Dump recent pane scrollback to a file before a respawn (tmux only).
    async fn save_crash_log(
        &self,
        pane_id: &str,
        path: &Path,
        lines: u32,
    ) -> Result<(), TerminalError>;

    /// Set the pane title (tmux only).
    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<(), TerminalError>;
}

/// Backend selected per session from the session file's `terminal` field.
#[derive(Debug, Clone)]
pub enum MuxBackend {
    Tmux(TmuxBackend),
    Wezterm(WeztermBackend),
}

/// Resolve a backend for a session's `terminal` field.
pub fn backend_for_terminal(terminal: &str) -> Option<MuxBackend> {
    match terminal.trim().to_ascii_lowercase().as_str() {
        "" | "tmux" => Some(MuxBackend::Tmux(TmuxBackend::new())),
        "wezterm" => Some(MuxBackend::Wezterm(WeztermBackend::new())),
        _ => None,
    }
}

macro_rules! delegate {
    ($self:ident, $method:ident ( $($arg:expr),* )) => {
        match $self {
            MuxBackend::Tmux(b) => b.$method($($arg),*).await,
            MuxBackend::Wezterm(b) => b.$method($($arg),*).await,
        }
    };
}

#[async_trait]
impl TerminalBackend for MuxBackend {
    async fn is_alive(&self, pane_id: &str) -> Result<bool, TerminalError> {
        delegate!(self, is_alive(pane_id))
    }

    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), TerminalError> {
        delegate!(self, send_text(pane_id, text))
    }

    async fn find_pane_by_title_marker(
        &self,
        marker: &str,
    ) -> Result<Option<String>, TerminalError> {
        delegate!(self, find_pane_by_title_marker(marker))
    }

    async fn capture_text(&self, pane_id: &str, lines: u32) -> Result<String, TerminalError> {
        delegate!(self, capture_text(pane_id, lines))
    }

    async fn respawn_pane(
        &self,
        pane_id: &str,
        cmd: &str,
        cwd: &Path,
        remain_on_exit: bool,
    ) -> Result<(), TerminalError> {
        delegate!(self, respawn_pane(pane_id, cmd, cwd, remain_on_exit))
    }

    async fn save_crash_log(
        &self,
        pane_id: &str,
        path: &Path,
        lines: u32,
    ) -> Result<(), TerminalError> {
        delegate!(self, save_crash_log(pane_id, path, lines))
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<(), TerminalError> {
        delegate!(self, set_pane_title(pane_id, title))
    }
}
