// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WezTerm backend.
//!
//! Pane discovery goes through `wezterm cli list --format json`. Enter is
//! pressed as a real key event (`send-key Enter`) with a CR-injection
//! fallback; the strategy is tunable via `CCB_WEZTERM_ENTER_METHOD`
//! (`auto` / `key` / `text`), and the binary via `CCB_WEZTERM_BIN`.

use super::{TerminalBackend, TerminalError};
use crate::env;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct WeztermBackend {
    bin: String,
}

impl Default for WeztermBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl WeztermBackend {
    pub fn new() -> Self {
        Self::with_bin(env::wezterm_bin())
    }

    /// Backend over a specific `wezterm` binary.
    pub fn with_bin(bin: impl Into<String>) -> Self {
        WeztermBackend { bin: bin.into() }
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, TerminalError> {
        Command::new(&self.bin)
            .args(args)
            .output()
            .await
            .map_err(|e| TerminalError::CommandFailed(e.to_string()))
    }

    async fn run_with_stdin(
        &self,
        args: &[&str],
        input: &[u8],
    ) -> Result<std::process::Output, TerminalError> {
        let mut child = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TerminalError::CommandFailed(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input)
                .await
                .map_err(|e| TerminalError::CommandFailed(e.to_string()))?;
        }
        child
            .wait_with_output()
            .await
            .map_err(|e| TerminalError::CommandFailed(e.to_string()))
    }

    async fn list_panes(&self) -> Result<Vec<serde_json::Value>, TerminalError> {
        let output = self.run(&["cli", "list", "--format", "json"]).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TerminalError::CommandFailed(format!(
                "wezterm cli list: {}",
                stderr.trim()
            )));
        }
        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| TerminalError::CommandFailed(e.to_string()))?;
        Ok(parsed.as_array().cloned().unwrap_or_default())
    }

    async fn send_enter(&self, pane_id: &str) -> Result<(), TerminalError> {
        let method = env::wezterm_enter_method();

        if method != "text" {
            let key = self
                .run(&["cli", "send-key", "--pane-id", pane_id, "Enter"])
                .await?;
            if key.status.success() {
                return Ok(());
            }
            if method == "key" {
                let stderr = String::from_utf8_lossy(&key.stderr);
                return Err(TerminalError::CommandFailed(format!(
                    "wezterm cli send-key: {}",
                    stderr.trim()
                )));
            }
        }

        // CR injection: older wezterm builds without send-key support.
        let cr = self
            .run_with_stdin(&["cli", "send-text", "--no-paste", "--pane-id", pane_id], b"\r")
            .await?;
        if !cr.status.success() {
            let stderr = String::from_utf8_lossy(&cr.stderr);
            return Err(TerminalError::CommandFailed(format!(
                "wezterm cli send-text: {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TerminalBackend for WeztermBackend {
    async fn is_alive(&self, pane_id: &str) -> Result<bool, TerminalError> {
        let panes = self.list_panes().await?;
        Ok(panes
            .iter()
            .any(|p| pane_id_matches(p.get("pane_id"), pane_id)))
    }

    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), TerminalError> {
        let output = self
            .run_with_stdin(&["cli", "send-text", "--pane-id", pane_id], text.as_bytes())
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TerminalError::CommandFailed(format!(
                "wezterm cli send-text: {}",
                stderr.trim()
            )));
        }
        self.send_enter(pane_id).await
    }

    async fn find_pane_by_title_marker(
        &self,
        marker: &str,
    ) -> Result<Option<String>, TerminalError> {
        if marker.is_empty() {
            return Ok(None);
        }
        let panes = self.list_panes().await?;
        for pane in panes {
            let title = pane.get("title").and_then(|t| t.as_str()).unwrap_or("");
            if title.contains(marker) {
                if let Some(id) = pane.get("pane_id") {
                    return Ok(Some(render_pane_id(id)));
                }
            }
        }
        Ok(None)
    }

    async fn capture_text(&self, pane_id: &str, _lines: u32) -> Result<String, TerminalError> {
        let output = self
            .run(&["cli", "get-text", "--pane-id", pane_id])
            .await?;
        if !output.status.success() {
            return Err(TerminalError::PaneNotFound(pane_id.to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn respawn_pane(
        &self,
        _pane_id: &str,
        _cmd: &str,
        _cwd: &Path,
        _remain_on_exit: bool,
    ) -> Result<(), TerminalError> {
        Err(TerminalError::Unsupported("wezterm", "respawn_pane"))
    }

    async fn save_crash_log(
        &self,
        _pane_id: &str,
        _path: &Path,
        _lines: u32,
    ) -> Result<(), TerminalError> {
        Err(TerminalError::Unsupported("wezterm", "save_crash_log"))
    }

    async fn set_pane_title(&self, _pane_id: &str, _title: &str) -> Result<(), TerminalError> {
        Err(TerminalError::Unsupported("wezterm", "set_pane_title"))
    }
}

fn pane_id_matches(value: Option<&serde_json::Value>, pane_id: &str) -> bool {
    value.is_some_and(|v| render_pane_id(v) == pane_id.trim())
}

/// WezTerm pane ids are numeric in JSON but strings in session files.
fn render_pane_id(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "wezterm_tests.rs"]
mod tests;
