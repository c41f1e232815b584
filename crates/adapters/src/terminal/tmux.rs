// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tmux backend.
//!
//! Pane liveness uses `#{pane_dead}` so a pane kept open by `remain-on-exit`
//! reports dead. Text injection goes through a named buffer
//! (load-buffer / paste-buffer / delete-buffer); the delete always runs, even
//! when the paste fails, so buffers never leak.

use super::{TerminalBackend, TerminalError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Clone, Default)]
pub struct TmuxBackend;

impl TmuxBackend {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, args: &[&str]) -> Result<std::process::Output, TerminalError> {
        Command::new("tmux")
            .args(args)
            .output()
            .await
            .map_err(|e| TerminalError::CommandFailed(e.to_string()))
    }

    async fn run_checked(&self, args: &[&str]) -> Result<String, TerminalError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TerminalError::CommandFailed(format!(
                "tmux {}: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn load_buffer(&self, name: &str, text: &str) -> Result<(), TerminalError> {
        let mut child = Command::new("tmux")
            .args(["load-buffer", "-b", name, "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TerminalError::CommandFailed(e.to_string()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| TerminalError::CommandFailed(e.to_string()))?;
        }
        let status = child
            .wait()
            .await
            .map_err(|e| TerminalError::CommandFailed(e.to_string()))?;
        if !status.success() {
            return Err(TerminalError::CommandFailed("tmux load-buffer".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TerminalBackend for TmuxBackend {
    async fn is_alive(&self, pane_id: &str) -> Result<bool, TerminalError> {
        let output = self
            .run(&["display-message", "-p", "-t", pane_id, "#{pane_dead}"])
            .await?;
        if !output.status.success() {
            return Ok(false);
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim() == "0")
    }

    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), TerminalError> {
        let buffer = format!("ccb-{}", std::process::id());
        self.load_buffer(&buffer, text).await?;

        let paste = self
            .run_checked(&["paste-buffer", "-p", "-t", pane_id, "-b", buffer.as_str()])
            .await;
        // The buffer must go away even when the paste failed.
        let _ = self.run(&["delete-buffer", "-b", buffer.as_str()]).await;
        paste?;

        self.run_checked(&["send-keys", "-t", pane_id, "Enter"])
            .await?;
        Ok(())
    }

    async fn find_pane_by_title_marker(
        &self,
        marker: &str,
    ) -> Result<Option<String>, TerminalError> {
        if marker.is_empty() {
            return Ok(None);
        }
        let listing = self
            .run_checked(&["list-panes", "-a", "-F", "#{pane_id}\t#{pane_title}"])
            .await?;
        for line in listing.lines() {
            if let Some((pane_id, title)) = line.split_once('\t') {
                if title.contains(marker) {
                    return Ok(Some(pane_id.to_string()));
                }
            }
        }
        Ok(None)
    }

    async fn capture_text(&self, pane_id: &str, lines: u32) -> Result<String, TerminalError> {
        let start = format!("-{lines}");
        self.run_checked(&["capture-pane", "-p", "-t", pane_id, "-S", start.as_str()])
            .await
    }

    async fn respawn_pane(
        &self,
        pane_id: &str,
        cmd: &str,
        cwd: &Path,
        remain_on_exit: bool,
    ) -> Result<(), TerminalError> {
        if remain_on_exit {
            let _ = self
                .run(&["set-option", "-p", "-t", pane_id, "remain-on-exit", "on"])
                .await;
        }
        let cwd = cwd.to_string_lossy();
        self.run_checked(&["respawn-pane", "-k", "-t", pane_id, "-c", cwd.as_ref(), cmd])
            .await?;
        Ok(())
    }

    async fn save_crash_log(
        &self,
        pane_id: &str,
        path: &Path,
        lines: u32,
    ) -> Result<(), TerminalError> {
        let text = self.capture_text(pane_id, lines).await?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TerminalError::CommandFailed(e.to_string()))?;
        }
        std::fs::write(path, text).map_err(|e| TerminalError::CommandFailed(e.to_string()))
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<(), TerminalError> {
        self.run_checked(&["select-pane", "-t", pane_id, "-T", title])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tmux_tests.rs"]
mod tests;
