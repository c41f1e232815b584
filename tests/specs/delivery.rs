// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end delivery scenarios: happy path, timeout, rebinding, pane
//! death, FIFO ordering.

use crate::prelude::*;
use serde_json::Value;
use serial_test::serial;
use std::time::Duration;

const REQ: &str = "20260101-120000-000-1";
const REQ2: &str = "20260101-120000-000-2";

#[tokio::test]
#[serial(codex_root)]
async fn happy_path_returns_reply_with_metadata() {
    let mut fx = DaemonFixture::start().await;
    let log = fx.create_log(SID);
    fx.mount_session(SID, &log);
    fx.reply_after_send(&log, REQ, "Hello");

    let resp = fx.request(request_msg(&fx, REQ, 10.0)).await;
    assert_eq!(resp["exit_code"], 0, "resp: {resp}");
    assert_eq!(resp["reply"], "Hello");
    assert_eq!(resp["req_id"], REQ);
    assert_eq!(resp["meta"]["done_seen"], true);
    assert_eq!(resp["meta"]["anchor_seen"], true);
    assert_eq!(resp["meta"]["fallback_scan"], false);
    assert!(resp["meta"]["session_key"]
        .as_str()
        .unwrap()
        .starts_with("codex:"));

    // The injected prompt carried the wrapped markers.
    let sent = fx.backend.sent_texts("%1");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].contains(&format!("CCB_REQ_ID: {REQ}")));
    assert!(sent[0].ends_with(&format!("CCB_DONE: {REQ}\n")));

    fx.shutdown().await;
}

#[tokio::test]
#[serial(codex_root)]
async fn timeout_returns_partial_text_with_exit_2() {
    let mut fx = DaemonFixture::start().await;
    let log = fx.create_log(SID);
    fx.mount_session(SID, &log);

    // Anchor and some text, but never a done line.
    let backend = fx.backend.clone();
    let log_clone = log.clone();
    tokio::spawn(async move {
        for _ in 0..500 {
            if !backend.sent_texts("%1").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        append_line(&log_clone, &anchor_entry(REQ));
        append_line(&log_clone, &reply_entry("partial answer"));
    });

    let resp = fx.request(request_msg(&fx, REQ, 2.0)).await;
    assert_eq!(resp["exit_code"], 2, "resp: {resp}");
    assert_eq!(resp["meta"]["done_seen"], false);
    assert!(resp["reply"].as_str().unwrap().contains("partial answer"));

    fx.shutdown().await;
}

#[tokio::test]
#[serial(codex_root)]
async fn stale_binding_rebinds_to_newer_log() {
    let mut fx = DaemonFixture::start().await;
    let stale = fx.create_log(SID);
    fx.mount_session(SID, &stale);

    // The reply lands only in a different, newer log; the bound log stays
    // silent, so the anchor grace expires and the reader rebinds.
    tokio::time::sleep(Duration::from_millis(30)).await;
    let fresh = fx.create_log(SID_B);
    fx.reply_after_send(&fresh, REQ, "rebound");

    let resp = fx.request(request_msg(&fx, REQ, 15.0)).await;
    assert_eq!(resp["exit_code"], 0, "resp: {resp}");
    assert_eq!(resp["reply"], "rebound");
    assert_eq!(resp["meta"]["fallback_scan"], true);
    assert!(resp["meta"]["log_path"]
        .as_str()
        .unwrap()
        .contains(SID_B));

    fx.shutdown().await;
}

#[tokio::test]
#[serial(codex_root)]
async fn dead_pane_mid_request_is_exit_1() {
    std::env::set_var("CCB_CASKD_PANE_CHECK_INTERVAL", "0.2");
    let mut fx = DaemonFixture::start().await;
    let log = fx.create_log(SID);
    fx.mount_session(SID, &log);

    let backend = fx.backend.clone();
    tokio::spawn(async move {
        for _ in 0..500 {
            if !backend.sent_texts("%1").is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        backend.kill_pane("%1");
    });

    let resp = fx.request(request_msg(&fx, REQ, 15.0)).await;
    std::env::remove_var("CCB_CASKD_PANE_CHECK_INTERVAL");
    assert_eq!(resp["exit_code"], 1, "resp: {resp}");
    assert!(resp["reply"].as_str().unwrap().contains("pane died"));
    assert_eq!(resp["meta"]["done_seen"], false);

    fx.shutdown().await;
}

#[tokio::test]
#[serial(codex_root)]
async fn same_session_requests_are_fifo() {
    let mut fx = DaemonFixture::start().await;
    let log = fx.create_log(SID);
    fx.mount_session(SID, &log);

    // Replies are scripted per request, appended as soon as that request's
    // prompt shows up in the pane.
    let backend = fx.backend.clone();
    let log_clone = log.clone();
    tokio::spawn(async move {
        let mut answered = 0usize;
        while answered < 2 {
            let sent = backend.sent_texts("%1");
            if sent.len() > answered {
                let (req_id, body) = if sent[answered].contains(REQ) {
                    (REQ, "first")
                } else {
                    (REQ2, "second")
                };
                // Throttle the first reply so overlap would be visible.
                if answered == 0 {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
                append_line(&log_clone, &anchor_entry(req_id));
                append_line(
                    &log_clone,
                    &reply_entry(&format!("{body}\nCCB_DONE: {req_id}")),
                );
                answered += 1;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    });

    // Submit T1, wait for its prompt to be in flight, then submit T2 so the
    // enqueue order is deterministic. T2 must still queue behind T1.
    let state_file = fx.state_file.clone();
    let msg1 = request_msg(&fx, REQ, 15.0);
    let first = tokio::spawn(async move {
        ccb_daemon::client::roundtrip(&state_file, msg1, Duration::from_secs(30))
            .await
            .unwrap()
    });
    for _ in 0..500 {
        if !fx.backend.sent_texts("%1").is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fx.backend.sent_texts("%1").len(), 1);

    let resp2: Value = fx.request(request_msg(&fx, REQ2, 15.0)).await;
    let resp1: Value = first.await.unwrap();

    assert_eq!(resp1["exit_code"], 0, "resp1: {resp1}");
    assert_eq!(resp2["exit_code"], 0, "resp2: {resp2}");
    assert_eq!(resp1["reply"], "first");
    assert_eq!(resp2["reply"], "second");

    // Strict ordering: the second prompt was injected only after the first
    // request completed.
    let sent = fx.backend.sent_texts("%1");
    assert_eq!(sent.len(), 2);
    assert!(sent[0].contains(REQ));
    assert!(sent[1].contains(REQ2));

    fx.shutdown().await;
}
