// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live tmux tests. These drive a real tmux server and are skipped when tmux
//! is not installed.

use super::*;
use serial_test::serial;
use std::sync::atomic::{AtomicU64, Ordering};

static SESSION_COUNTER: AtomicU64 = AtomicU64::new(0);

fn tmux_available() -> bool {
    std::process::Command::new("tmux")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

macro_rules! skip_without_tmux {
    () => {
        if !tmux_available() {
            eprintln!("tmux not available; skipping");
            return;
        }
    };
}

/// Spawn a detached throwaway session and return its single pane id.
async fn spawn_session(name: &str) -> (String, String) {
    let id = SESSION_COUNTER.fetch_add(1, Ordering::SeqCst);
    let session = format!("ccbtest-{name}-{}-{id}", std::process::id());
    let output = tokio::process::Command::new("tmux")
        .args([
            "new-session",
            "-d",
            "-s",
            &session,
            "-P",
            "-F",
            "#{pane_id}",
            "sleep 60",
        ])
        .output()
        .await
        .unwrap();
    assert!(output.status.success(), "tmux new-session failed");
    let pane = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (session, pane)
}

async fn kill_session(session: &str) {
    let _ = tokio::process::Command::new("tmux")
        .args(["kill-session", "-t", session])
        .output()
        .await;
}

#[tokio::test]
#[serial(tmux)]
async fn is_alive_reflects_pane_state() {
    skip_without_tmux!();
    let backend = TmuxBackend::new();
    let (session, pane) = spawn_session("alive").await;

    assert!(backend.is_alive(&pane).await.unwrap());
    kill_session(&session).await;
    assert!(!backend.is_alive(&pane).await.unwrap());
}

#[tokio::test]
#[serial(tmux)]
async fn send_text_pastes_and_presses_enter() {
    skip_without_tmux!();
    let backend = TmuxBackend::new();
    let (session, pane) = spawn_session("send").await;

    // The pane runs sleep; the injected text still lands in the tty and is
    // visible via capture-pane.
    backend.send_text(&pane, "hello from ccb").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    let text = backend.capture_text(&pane, 10).await.unwrap();
    assert!(text.contains("hello from ccb"), "capture: {text}");

    kill_session(&session).await;
}

#[tokio::test]
#[serial(tmux)]
async fn find_pane_by_title_marker_matches_substring() {
    skip_without_tmux!();
    let backend = TmuxBackend::new();
    let (session, pane) = spawn_session("marker").await;

    backend
        .set_pane_title(&pane, "CCB-codex-deadbeef")
        .await
        .unwrap();
    let found = backend
        .find_pane_by_title_marker("CCB-codex-deadbeef")
        .await
        .unwrap();
    assert_eq!(found.as_deref(), Some(pane.as_str()));
    assert_eq!(
        backend.find_pane_by_title_marker("NO-SUCH-MARKER").await.unwrap(),
        None
    );

    kill_session(&session).await;
}

#[tokio::test]
#[serial(tmux)]
async fn save_crash_log_writes_capture_to_file() {
    skip_without_tmux!();
    let backend = TmuxBackend::new();
    let (session, pane) = spawn_session("crash").await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pane-crash.log");

    backend.save_crash_log(&pane, &path, 100).await.unwrap();
    assert!(path.exists());

    kill_session(&session).await;
}
