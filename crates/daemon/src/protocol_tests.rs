// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    ping = { "cask.ping", MessageKind::Ping },
    shutdown = { "cask.shutdown", MessageKind::Shutdown },
    request = { "cask.request", MessageKind::Request },
    wrong_prefix = { "oask.request", MessageKind::Unknown },
    garbage = { "nope", MessageKind::Unknown },
)]
fn classify_by_type_tag(type_tag: &str, expected: MessageKind) {
    let msg = json!({"type": type_tag});
    assert_eq!(classify(&msg, "cask"), expected);
}

#[test]
fn token_check_is_exact() {
    let msg = json!({"token": "aabb"});
    assert!(token_matches(&msg, "aabb"));
    assert!(!token_matches(&msg, "aabc"));
    assert!(!token_matches(&json!({}), "aabb"));
}

#[test]
fn request_defaults_are_applied() {
    let msg = json!({
        "type": "cask.request",
        "id": "client-1",
        "work_dir": "/proj/a",
        "message": "hi",
    });
    let req = request_from_value(&msg).unwrap();
    assert_eq!(req.client_id, "client-1");
    assert_eq!(req.timeout_s, DEFAULT_TIMEOUT_S);
    assert_eq!(req.caller, "claude");
    assert!(!req.quiet);
    assert!(!req.no_wrap);
    assert!(req.req_id.is_none());
    assert!(req.output_path.is_none());
}

#[test]
fn request_fields_round_trip() {
    let msg = json!({
        "type": "cask.request",
        "id": "c",
        "work_dir": "/proj/a",
        "message": "hello",
        "timeout_s": -1.0,
        "quiet": true,
        "no_wrap": true,
        "req_id": "20260101-120000-000-1",
        "output_path": "/tmp/out.md",
        "caller": "codex",
    });
    let req = request_from_value(&msg).unwrap();
    assert_eq!(req.timeout_s, -1.0);
    assert!(req.quiet);
    assert!(req.no_wrap);
    assert_eq!(req.req_id.as_deref(), Some("20260101-120000-000-1"));
    assert_eq!(req.output_path.as_deref(), Some("/tmp/out.md"));
    assert_eq!(req.caller, "codex");
}

#[test]
fn request_without_work_dir_is_rejected() {
    let msg = json!({"type": "cask.request", "message": "hi"});
    assert!(request_from_value(&msg).is_err());
}

#[test]
fn result_response_carries_meta() {
    let result = ccb_core::ProviderResult {
        exit_code: 0,
        reply: "Hello".to_string(),
        req_id: "20260101-120000-000-1".to_string(),
        session_key: "codex:abc".to_string(),
        done_seen: true,
        done_ms: Some(42),
        anchor_seen: true,
        anchor_ms: Some(7),
        fallback_scan: false,
        log_path: Some("/log".to_string()),
    };
    let resp = result_response("cask", json!("c1"), &result);
    assert_eq!(resp["type"], "cask.response");
    assert_eq!(resp["v"], 1);
    assert_eq!(resp["id"], "c1");
    assert_eq!(resp["exit_code"], 0);
    assert_eq!(resp["reply"], "Hello");
    assert_eq!(resp["meta"]["session_key"], "codex:abc");
    assert_eq!(resp["meta"]["done_seen"], true);
    assert_eq!(resp["meta"]["done_ms"], 42);
    assert_eq!(resp["meta"]["anchor_ms"], 7);
}

#[test]
fn pong_shape() {
    let resp = pong("gask", json!("p"));
    assert_eq!(resp["type"], "gask.pong");
    assert_eq!(resp["exit_code"], 0);
    assert_eq!(resp["id"], "p");
}
