// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire messages: one JSON object per line, UTF-8.
//!
//! Types are `<prefix>.ping` / `<prefix>.shutdown` / `<prefix>.request` in,
//! `<prefix>.pong` / `<prefix>.response` out; the prefix is the only
//! provider-specific part of the format.

use serde_json::{json, Value};

use ccb_core::{ProviderRequest, ProviderResult};

pub const WIRE_VERSION: u64 = 1;

/// Default request timeout when the client omits one (seconds).
pub const DEFAULT_TIMEOUT_S: f64 = 300.0;

/// Incoming message kind, by type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Ping,
    Shutdown,
    Request,
    Unknown,
}

pub fn classify(msg: &Value, prefix: &str) -> MessageKind {
    match msg.get("type").and_then(Value::as_str) {
        Some(t) if t == format!("{prefix}.ping") => MessageKind::Ping,
        Some(t) if t == format!("{prefix}.shutdown") => MessageKind::Shutdown,
        Some(t) if t == format!("{prefix}.request") => MessageKind::Request,
        _ => MessageKind::Unknown,
    }
}

/// Whether the message carries the daemon's shared token.
pub fn token_matches(msg: &Value, token: &str) -> bool {
    msg.get("token").and_then(Value::as_str) == Some(token)
}

/// Decode a `<prefix>.request` payload into a [`ProviderRequest`].
pub fn request_from_value(msg: &Value) -> Result<ProviderRequest, String> {
    let field_str = |key: &str| {
        msg.get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let work_dir = field_str("work_dir");
    if work_dir.trim().is_empty() {
        return Err("missing work_dir".to_string());
    }

    let timeout_s = match msg.get("timeout_s") {
        None | Some(Value::Null) => DEFAULT_TIMEOUT_S,
        Some(value) => value
            .as_f64()
            .ok_or_else(|| "timeout_s must be a number".to_string())?,
    };

    let caller = {
        let raw = field_str("caller");
        if raw.trim().is_empty() {
            "claude".to_string()
        } else {
            raw
        }
    };

    Ok(ProviderRequest {
        client_id: match msg.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => String::new(),
        },
        work_dir,
        timeout_s,
        quiet: msg.get("quiet").and_then(Value::as_bool).unwrap_or(false),
        message: field_str("message"),
        output_path: msg
            .get("output_path")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        req_id: msg
            .get("req_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        caller,
        no_wrap: msg.get("no_wrap").and_then(Value::as_bool).unwrap_or(false),
    })
}

pub fn pong(prefix: &str, id: Value) -> Value {
    json!({
        "type": format!("{prefix}.pong"),
        "v": WIRE_VERSION,
        "id": id,
        "exit_code": 0,
        "reply": "OK",
    })
}

/// Plain response without result metadata (errors, shutdown acks).
pub fn simple_response(prefix: &str, id: Value, exit_code: i32, reply: &str) -> Value {
    json!({
        "type": format!("{prefix}.response"),
        "v": WIRE_VERSION,
        "id": id,
        "exit_code": exit_code,
        "reply": reply,
    })
}

/// Full response for a completed task.
pub fn result_response(prefix: &str, id: Value, result: &ProviderResult) -> Value {
    json!({
        "type": format!("{prefix}.response"),
        "v": WIRE_VERSION,
        "id": id,
        "req_id": result.req_id,
        "exit_code": result.exit_code,
        "reply": result.reply,
        "meta": {
            "session_key": result.session_key,
            "done_seen": result.done_seen,
            "done_ms": result.done_ms,
            "anchor_seen": result.anchor_seen,
            "anchor_ms": result.anchor_ms,
            "fallback_scan": result.fallback_scan,
            "log_path": result.log_path,
        },
    })
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
