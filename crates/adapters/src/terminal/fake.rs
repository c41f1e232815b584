// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory backend for tests: scripted panes, recorded calls.

use super::{TerminalBackend, TerminalError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One scripted pane.
#[derive(Debug, Clone, Default)]
pub struct FakePane {
    pub alive: bool,
    pub title: String,
    pub text: String,
}

/// A recorded backend call, in invocation order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalCall {
    IsAlive(String),
    SendText { pane_id: String, text: String },
    FindByMarker(String),
    CaptureText(String),
    Respawn { pane_id: String, cmd: String },
    SaveCrashLog(String),
    SetTitle { pane_id: String, title: String },
}

#[derive(Debug, Default)]
struct FakeState {
    panes: HashMap<String, FakePane>,
    calls: Vec<TerminalCall>,
    fail_send: bool,
}

/// Shared-handle fake backend (clones observe the same state).
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pane(&self, pane_id: &str, pane: FakePane) {
        self.state.lock().panes.insert(pane_id.to_string(), pane);
    }

    pub fn kill_pane(&self, pane_id: &str) {
        if let Some(pane) = self.state.lock().panes.get_mut(pane_id) {
            pane.alive = false;
        }
    }

    pub fn set_pane_text(&self, pane_id: &str, text: &str) {
        if let Some(pane) = self.state.lock().panes.get_mut(pane_id) {
            pane.text = text.to_string();
        }
    }

    pub fn fail_next_send(&self) {
        self.state.lock().fail_send = true;
    }

    pub fn calls(&self) -> Vec<TerminalCall> {
        self.state.lock().calls.clone()
    }

    pub fn sent_texts(&self, pane_id: &str) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                TerminalCall::SendText { pane_id: p, text } if p == pane_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl TerminalBackend for FakeBackend {
    async fn is_alive(&self, pane_id: &str) -> Result<bool, TerminalError> {
        let mut state = self.state.lock();
        state.calls.push(TerminalCall::IsAlive(pane_id.to_string()));
        Ok(state.panes.get(pane_id).is_some_and(|p| p.alive))
    }

    async fn send_text(&self, pane_id: &str, text: &str) -> Result<(), TerminalError> {
        let mut state = self.state.lock();
        state.calls.push(TerminalCall::SendText {
            pane_id: pane_id.to_string(),
            text: text.to_string(),
        });
        if state.fail_send {
            state.fail_send = false;
            return Err(TerminalError::CommandFailed("injected send failure".to_string()));
        }
        if !state.panes.get(pane_id).is_some_and(|p| p.alive) {
            return Err(TerminalError::PaneNotFound(pane_id.to_string()));
        }
        Ok(())
    }

    async fn find_pane_by_title_marker(
        &self,
        marker: &str,
    ) -> Result<Option<String>, TerminalError> {
        let mut state = self.state.lock();
        state.calls.push(TerminalCall::FindByMarker(marker.to_string()));
        if marker.is_empty() {
            return Ok(None);
        }
        Ok(state
            .panes
            .iter()
            .find(|(_, pane)| pane.title.contains(marker))
            .map(|(id, _)| id.clone()))
    }

    async fn capture_text(&self, pane_id: &str, _lines: u32) -> Result<String, TerminalError> {
        let mut state = self.state.lock();
        state.calls.push(TerminalCall::CaptureText(pane_id.to_string()));
        state
            .panes
            .get(pane_id)
            .map(|p| p.text.clone())
            .ok_or_else(|| TerminalError::PaneNotFound(pane_id.to_string()))
    }

    async fn respawn_pane(
        &self,
        pane_id: &str,
        cmd: &str,
        _cwd: &Path,
        _remain_on_exit: bool,
    ) -> Result<(), TerminalError> {
        let mut state = self.state.lock();
        state.calls.push(TerminalCall::Respawn {
            pane_id: pane_id.to_string(),
            cmd: cmd.to_string(),
        });
        match state.panes.get_mut(pane_id) {
            Some(pane) => {
                pane.alive = true;
                Ok(())
            }
            None => Err(TerminalError::PaneNotFound(pane_id.to_string())),
        }
    }

    async fn save_crash_log(
        &self,
        pane_id: &str,
        path: &Path,
        _lines: u32,
    ) -> Result<(), TerminalError> {
        let text = {
            let mut state = self.state.lock();
            state.calls.push(TerminalCall::SaveCrashLog(pane_id.to_string()));
            state.panes.get(pane_id).map(|p| p.text.clone())
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        std::fs::write(path, text.unwrap_or_default())
            .map_err(|e| TerminalError::CommandFailed(e.to_string()))
    }

    async fn set_pane_title(&self, pane_id: &str, title: &str) -> Result<(), TerminalError> {
        let mut state = self.state.lock();
        state.calls.push(TerminalCall::SetTitle {
            pane_id: pane_id.to_string(),
            title: title.to_string(),
        });
        match state.panes.get_mut(pane_id) {
            Some(pane) => {
                pane.title = title.to_string();
                Ok(())
            }
            None => Err(TerminalError::PaneNotFound(pane_id.to_string())),
        }
    }
}
