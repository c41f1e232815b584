// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared JSONL entry decoding.
//!
//! The Claude/Codex/Droid log families share three entry shapes:
//! `response_item` (rollout payloads), `event_msg` (streamed agent
//! messages), and the plain `{"type": role, "message": {...}}` form.
//! Thinking blocks never contribute reply text.

use std::path::Path;

use serde_json::Value;

use super::{LogEvent, Role};

/// Decode one JSONL line into a log event, if it carries user or assistant
/// text.
pub fn parse_log_entry(line: &str) -> Option<LogEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let entry: Value = serde_json::from_str(trimmed).ok()?;
    for role in [Role::User, Role::Assistant] {
        if let Some(text) = extract_message(&entry, role) {
            return Some(LogEvent::new(role, text));
        }
    }
    None
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Info => "info",
    }
}

/// Extract message text for `role` from one decoded entry.
pub(crate) fn extract_message(entry: &Value, role: Role) -> Option<String> {
    let entry_type = entry
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let want = role_name(role);

    // 1. response_item entries
    if entry_type == "response_item" {
        let payload = entry.get("payload")?;
        if payload.get("type").and_then(Value::as_str) != Some("message") {
            return None;
        }
        let payload_role = payload.get("role").and_then(Value::as_str)?.to_ascii_lowercase();
        if payload_role != want {
            return None;
        }
        return extract_content_text(payload.get("content"));
    }

    // 2. event_msg entries
    if entry_type == "event_msg" {
        let payload = entry.get("payload")?;
        let payload_type = payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_ascii_lowercase();
        if matches!(
            payload_type.as_str(),
            "agent_message" | "assistant_message" | "assistant"
        ) {
            let payload_role = payload
                .get("role")
                .and_then(Value::as_str)?
                .to_ascii_lowercase();
            if payload_role != want {
                return None;
            }
            let msg = payload
                .get("message")
                .or_else(|| payload.get("content"))
                .or_else(|| payload.get("text"))
                .and_then(Value::as_str)?;
            let msg = msg.trim();
            return (!msg.is_empty()).then(|| msg.to_string());
        }
        return None;
    }

    // 3. default log shape
    if let Some(message) = entry.get("message").filter(|m| m.is_object()) {
        let msg_role = message
            .get("role")
            .and_then(Value::as_str)
            .unwrap_or(&entry_type)
            .trim()
            .to_ascii_lowercase();
        if msg_role != want {
            return None;
        }
        return extract_content_text(message.get("content"));
    }
    if entry_type != want {
        return None;
    }
    extract_content_text(entry.get("content"))
}

/// Flatten a content value (string or block array) into text, skipping
/// thinking blocks.
fn extract_content_text(content: Option<&Value>) -> Option<String> {
    match content? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Array(items) => {
            let mut texts: Vec<String> = Vec::new();
            for item in items {
                let item_type = item
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .trim()
                    .to_ascii_lowercase();
                if matches!(item_type.as_str(), "thinking" | "thinking_delta") {
                    continue;
                }
                let text = item
                    .get("text")
                    .and_then(Value::as_str)
                    .or_else(|| {
                        (item_type == "text")
                            .then(|| item.get("content").and_then(Value::as_str))
                            .flatten()
                    })
                    .unwrap_or_default()
                    .trim();
                if !text.is_empty() {
                    texts.push(text.to_string());
                }
            }
            (!texts.is_empty()).then(|| texts.join("\n"))
        }
        _ => None,
    }
}

/// Read a log's `session_meta` entry for `(cwd, session id)`. The entry is
/// usually on the first line but the first 30 lines are scanned to be
/// robust against preamble records.
pub fn read_session_meta(log_path: &Path) -> (Option<String>, Option<String>) {
    use std::io::BufRead;
    let Ok(file) = std::fs::File::open(log_path) else {
        return (None, None);
    };
    let reader = std::io::BufReader::new(file);
    for line in reader.lines().map_while(Result::ok).take(30) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(entry) = serde_json::from_str::<Value>(trimmed) else {
            continue;
        };
        if entry.get("type").and_then(Value::as_str) != Some("session_meta") {
            continue;
        }
        let payload = entry.get("payload");
        let field = |key: &str| {
            payload
                .and_then(|p| p.get(key))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        return (field("cwd"), field("id"));
    }
    (None, None)
}

#[cfg(test)]
#[path = "entry_tests.rs"]
mod tests;
