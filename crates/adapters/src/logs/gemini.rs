// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gemini chat-file reader.
//!
//! Gemini keeps a whole-file JSON document per chat
//! (`{"messages": [{"type": "user"|"assistant"|"info", "content": ...}]}`)
//! and rewrites it as the conversation grows, so the cursor is a message
//! index rather than a byte offset. The file may be mid-rewrite when read;
//! decode failures are retried on the next poll.
//!
//! A user-initiated cancel shows up as an `info` message whose content says
//! "request cancelled"; it belongs to our request when the nearest preceding
//! user message carries our `CCB_REQ_ID`.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::{LogEvent, LogReader, Role};
use crate::env;

pub struct GeminiLogReader {
    root: PathBuf,
    preferred_session: Option<PathBuf>,
    session_path: Option<PathBuf>,
    msg_index: usize,
    /// Message index captured before injection; cancel scans start here.
    baseline_index: usize,
    poll: Duration,
}

impl GeminiLogReader {
    pub fn new(_work_dir: &Path) -> GeminiLogReader {
        Self::with_root(env::gemini_chats_root())
    }

    pub fn with_root(root: PathBuf) -> GeminiLogReader {
        GeminiLogReader {
            root,
            preferred_session: None,
            session_path: None,
            msg_index: 0,
            baseline_index: 0,
            poll: env::log_poll_interval(),
        }
    }

    pub fn set_preferred_session(&mut self, path: &Path) {
        if path.exists() {
            self.preferred_session = Some(path.to_path_buf());
        }
    }

    fn latest_session(&self) -> Option<PathBuf> {
        if let Some(preferred) = self.preferred_session.as_ref().filter(|p| p.exists()) {
            return Some(preferred.clone());
        }
        // Fallback: newest chat file anywhere under the root.
        let mut best: Option<(std::time::SystemTime, PathBuf)> = None;
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else if path.extension().is_some_and(|x| x == "json") {
                    let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
                        continue;
                    };
                    if best.as_ref().is_none_or(|(b, _)| modified > *b) {
                        best = Some((modified, path));
                    }
                }
            }
        }
        best.map(|(_, p)| p)
    }

    /// Decode the messages array, retrying briefly: the provider rewrites
    /// the whole file and a read can land mid-write.
    fn read_messages(path: &Path) -> Option<Vec<Value>> {
        for attempt in 0..10 {
            match std::fs::read_to_string(path) {
                Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                    Ok(doc) => {
                        let messages = doc
                            .get("messages")
                            .and_then(Value::as_array)
                            .cloned()
                            .unwrap_or_default();
                        return Some(messages);
                    }
                    Err(_) if attempt < 9 => {
                        std::thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => return None,
                },
                Err(_) => return None,
            }
        }
        None
    }

    fn message_event(message: &Value) -> Option<LogEvent> {
        let role = match message.get("type").and_then(Value::as_str)? {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            "info" => Role::Info,
            _ => return None,
        };
        let content = match message.get("content") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => other.to_string(),
            None => return None,
        };
        (!content.is_empty()).then(|| LogEvent::new(role, content))
    }

    fn follow(&mut self, path: &Path) {
        if self.session_path.as_deref() != Some(path) {
            self.session_path = Some(path.to_path_buf());
            self.msg_index = 0;
            self.baseline_index = 0;
        }
    }
}

fn is_cancel_text(text: &str) -> bool {
    let lower = text.trim().to_ascii_lowercase();
    lower.contains("request cancelled") || lower.contains("request canceled")
}

/// Whether the cancel at `cancel_index` belongs to `req_id`: the nearest
/// preceding user message decides.
fn cancel_applies_to_req(messages: &[Value], cancel_index: usize, req_id: &str) -> bool {
    let needle = format!("CCB_REQ_ID: {req_id}");
    for message in messages[..cancel_index].iter().rev() {
        if message.get("type").and_then(Value::as_str) != Some("user") {
            continue;
        }
        let content = match message.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        return content.contains(&needle);
    }
    false
}

#[async_trait]
impl LogReader for GeminiLogReader {
    fn capture(&mut self) {
        let session = self.latest_session();
        self.session_path = session;
        self.msg_index = self
            .session_path
            .as_deref()
            .and_then(Self::read_messages)
            .map(|m| m.len())
            .unwrap_or(0);
        self.baseline_index = self.msg_index;
    }

    async fn wait_for_events(&mut self, timeout: Duration) -> Vec<LogEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(session) = self.latest_session() {
                self.follow(&session);
                if let Some(messages) = Self::read_messages(&session) {
                    if messages.len() < self.msg_index {
                        // Rewritten shorter: the chat was reset.
                        self.msg_index = 0;
                        self.baseline_index = 0;
                    }
                    let events: Vec<LogEvent> = messages[self.msg_index..]
                        .iter()
                        .filter_map(Self::message_event)
                        .collect();
                    self.msg_index = messages.len();
                    if !events.is_empty() {
                        return events;
                    }
                }
            }
            if Instant::now() >= deadline {
                return Vec::new();
            }
            tokio::time::sleep(self.poll.min(deadline - Instant::now())).await;
        }
    }

    fn current_log_path(&self) -> Option<PathBuf> {
        self.session_path.clone()
    }

    fn rebind_to_tail(&mut self, _tail_bytes: u64) {
        // No byte offsets here; rebinding means re-discovering the newest
        // chat file and scanning its fresh messages from the start.
        self.preferred_session = None;
        self.session_path = None;
        if let Some(session) = self.latest_session() {
            self.follow(&session);
        }
    }

    fn check_cancelled(&mut self, req_id: &str) -> bool {
        let Some(session) = self.session_path.clone() else {
            return false;
        };
        let Some(messages) = Self::read_messages(&session) else {
            return false;
        };
        for (i, message) in messages.iter().enumerate().skip(self.baseline_index) {
            if message.get("type").and_then(Value::as_str) != Some("info") {
                continue;
            }
            let content = match message.get("content") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => continue,
            };
            if is_cancel_text(&content) && cancel_applies_to_req(&messages, i, req_id) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
#[path = "gemini_tests.rs"]
mod tests;
