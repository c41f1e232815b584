// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal daemon client: read the state file, do one line-delimited JSON
//! round trip. Used by the workspace tests; external CLI wrappers speak the
//! same protocol.

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Decode a daemon state file (`{pid, connect_host, port, token, ...}`).
pub fn read_state(state_file: &Path) -> Option<Value> {
    let raw = std::fs::read_to_string(state_file).ok()?;
    serde_json::from_str(&raw).ok()
}

/// One request/response round trip against the daemon in `state_file`.
/// The shared token from the state file is injected when the message lacks
/// one.
pub async fn roundtrip(
    state_file: &Path,
    mut msg: Value,
    timeout: Duration,
) -> Option<Value> {
    let state = read_state(state_file)?;
    let host = state.get("connect_host").and_then(Value::as_str)?;
    let port = state.get("port").and_then(Value::as_u64)?;
    if msg.get("token").is_none() {
        if let Some(token) = state.get("token").and_then(Value::as_str) {
            msg["token"] = json!(token);
        }
    }

    let io = async {
        let stream = TcpStream::connect((host, port as u16)).await.ok()?;
        let (read_half, mut write_half) = stream.into_split();
        let mut payload = serde_json::to_string(&msg).ok()?;
        payload.push('\n');
        write_half.write_all(payload.as_bytes()).await.ok()?;
        write_half.flush().await.ok()?;

        let mut line = String::new();
        let mut reader = BufReader::new(read_half);
        reader.read_line(&mut line).await.ok()?;
        serde_json::from_str(line.trim()).ok()
    };
    tokio::time::timeout(timeout, io).await.ok().flatten()
}

/// Ping the daemon; true on a pong.
pub async fn ping(prefix: &str, state_file: &Path, timeout: Duration) -> bool {
    let msg = json!({"type": format!("{prefix}.ping"), "id": "ping", "v": 1});
    match roundtrip(state_file, msg, timeout).await {
        Some(resp) => {
            resp.get("type").and_then(Value::as_str) == Some(&format!("{prefix}.pong"))
                && resp.get("exit_code").and_then(Value::as_i64) == Some(0)
        }
        None => false,
    }
}

/// Ask the daemon to shut down; true when it acknowledged.
pub async fn shutdown(prefix: &str, state_file: &Path, timeout: Duration) -> bool {
    let msg = json!({"type": format!("{prefix}.shutdown"), "id": "shutdown", "v": 1});
    match roundtrip(state_file, msg, timeout).await {
        Some(resp) => resp.get("exit_code").and_then(Value::as_i64) == Some(0),
        None => false,
    }
}
