// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level scenarios: ping/pong, auth, malformed input.

use crate::prelude::*;
use serde_json::json;
use serial_test::serial;
use std::time::Duration;

#[tokio::test]
#[serial(codex_root)]
async fn ping_pong() {
    let mut fx = DaemonFixture::start().await;

    let resp = fx
        .request(json!({"type": "cask.ping", "id": "p", "v": 1}))
        .await;
    assert_eq!(resp["type"], "cask.pong");
    assert_eq!(resp["id"], "p");
    assert_eq!(resp["exit_code"], 0);

    fx.shutdown().await;
}

#[tokio::test]
#[serial(codex_root)]
async fn bad_token_is_rejected_then_good_token_works() {
    let mut fx = DaemonFixture::start().await;

    let msg = json!({
        "type": "cask.request",
        "id": "c1",
        "token": "not-the-token",
        "work_dir": fx.work_dir.to_string_lossy(),
        "message": "hi",
    });
    let resp = fx.request(msg).await;
    assert_eq!(resp["exit_code"], 1);
    assert_eq!(resp["reply"], "Unauthorized");

    assert!(ccb_daemon::client::ping("cask", &fx.state_file, Duration::from_secs(2)).await);
    fx.shutdown().await;
}

#[tokio::test]
#[serial(codex_root)]
async fn malformed_request_is_a_bad_request() {
    let mut fx = DaemonFixture::start().await;

    // Authenticated but missing work_dir.
    let resp = fx
        .request(json!({"type": "cask.request", "id": "c2", "message": "hi"}))
        .await;
    assert_eq!(resp["exit_code"], 1);
    assert!(resp["reply"].as_str().unwrap().starts_with("Bad request"));

    fx.shutdown().await;
}

#[tokio::test]
#[serial(codex_root)]
async fn unknown_message_type_is_invalid() {
    let mut fx = DaemonFixture::start().await;

    let resp = fx.request(json!({"type": "cask.nonsense", "id": "x"})).await;
    assert_eq!(resp["exit_code"], 1);
    assert_eq!(resp["reply"], "Invalid request");

    fx.shutdown().await;
}
