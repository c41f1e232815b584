// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Enter-strategy and pane-id tests over a scripted `wezterm` binary.

use super::*;
#[cfg(unix)]
use serial_test::serial;
#[cfg(unix)]
use std::path::PathBuf;

#[cfg(unix)]
struct FakeWezterm {
    _tmp: tempfile::TempDir,
    bin: PathBuf,
    calls: PathBuf,
    stdin: PathBuf,
}

#[cfg(unix)]
impl FakeWezterm {
    /// A shell stand-in for `wezterm`: records every invocation, captures
    /// stdin on `send-text`, exits `key_exit` on `send-key`, and prints
    /// `list_json` on `cli list`.
    fn new(key_exit: i32, list_json: &str) -> FakeWezterm {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("wezterm-fake");
        let calls = tmp.path().join("calls.log");
        let stdin = tmp.path().join("stdin.log");
        let script = format!(
            "#!/bin/sh\n\
             printf '%s\\n' \"$*\" >> {calls}\n\
             case \"$*\" in\n\
               *send-key*) exit {key_exit} ;;\n\
               *send-text*) cat >> {stdin}; exit 0 ;;\n\
               *list*) printf '%s' '{list_json}'; exit 0 ;;\n\
             esac\n\
             exit 0\n",
            calls = calls.display(),
            stdin = stdin.display(),
        );
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        FakeWezterm {
            bin,
            calls,
            stdin,
            _tmp: tmp,
        }
    }

    fn backend(&self) -> WeztermBackend {
        WeztermBackend::with_bin(self.bin.to_string_lossy().into_owned())
    }

    fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.calls)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn stdin_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.stdin).unwrap_or_default()
    }
}

#[cfg(unix)]
fn set_enter_method(method: Option<&str>) {
    match method {
        Some(method) => std::env::set_var("CCB_WEZTERM_ENTER_METHOD", method),
        None => std::env::remove_var("CCB_WEZTERM_ENTER_METHOD"),
    }
}

#[cfg(unix)]
#[tokio::test]
#[serial(wezterm_env)]
async fn auto_tries_key_first_and_skips_cr_on_success() {
    set_enter_method(None);
    let fake = FakeWezterm::new(0, "[]");

    fake.backend().send_enter("7").await.unwrap();

    let calls = fake.calls();
    assert!(calls.iter().any(|c| c.contains("cli send-key")), "{calls:?}");
    assert!(!calls.iter().any(|c| c.contains("send-text")), "{calls:?}");
}

#[cfg(unix)]
#[tokio::test]
#[serial(wezterm_env)]
async fn auto_falls_back_to_cr_when_send_key_unsupported() {
    set_enter_method(None);
    let fake = FakeWezterm::new(1, "[]");

    fake.backend().send_enter("7").await.unwrap();

    let calls = fake.calls();
    assert!(calls.iter().any(|c| c.contains("cli send-key")), "{calls:?}");
    assert!(calls.iter().any(|c| c.contains("send-text")), "{calls:?}");
    assert_eq!(fake.stdin_bytes(), b"\r");
}

#[cfg(unix)]
#[tokio::test]
#[serial(wezterm_env)]
async fn text_mode_never_uses_send_key() {
    set_enter_method(Some("text"));
    let fake = FakeWezterm::new(0, "[]");

    fake.backend().send_enter("7").await.unwrap();
    set_enter_method(None);

    let calls = fake.calls();
    assert!(!calls.iter().any(|c| c.contains("send-key")), "{calls:?}");
    assert!(calls.iter().any(|c| c.contains("send-text")), "{calls:?}");
    assert_eq!(fake.stdin_bytes(), b"\r");
}

#[cfg(unix)]
#[tokio::test]
#[serial(wezterm_env)]
async fn key_mode_is_strict_and_never_falls_back() {
    set_enter_method(Some("key"));
    let fake = FakeWezterm::new(1, "[]");

    let result = fake.backend().send_enter("7").await;
    set_enter_method(None);

    assert!(result.is_err());
    let calls = fake.calls();
    assert!(calls.iter().any(|c| c.contains("cli send-key")), "{calls:?}");
    assert!(!calls.iter().any(|c| c.contains("send-text")), "{calls:?}");
}

#[cfg(unix)]
#[tokio::test]
#[serial(wezterm_env)]
async fn unknown_method_behaves_like_auto() {
    set_enter_method(Some("bogus"));
    let fake = FakeWezterm::new(0, "[]");

    fake.backend().send_enter("7").await.unwrap();
    set_enter_method(None);

    let calls = fake.calls();
    assert!(calls.iter().any(|c| c.contains("cli send-key")), "{calls:?}");
    assert!(!calls.iter().any(|c| c.contains("send-text")), "{calls:?}");
}

#[cfg(unix)]
#[tokio::test]
#[serial(wezterm_env)]
async fn send_text_delivers_payload_then_presses_enter() {
    set_enter_method(None);
    let fake = FakeWezterm::new(0, "[]");

    fake.backend().send_text("7", "hello pane").await.unwrap();

    let calls = fake.calls();
    let text_idx = calls.iter().position(|c| c.contains("send-text")).unwrap();
    let key_idx = calls.iter().position(|c| c.contains("send-key")).unwrap();
    assert!(text_idx < key_idx, "{calls:?}");
    assert_eq!(fake.stdin_bytes(), b"hello pane");
}

#[cfg(unix)]
#[tokio::test]
async fn is_alive_matches_numeric_pane_ids() {
    let fake = FakeWezterm::new(0, r#"[{"pane_id":7,"title":"CCB-wez-abc"}]"#);
    let backend = fake.backend();

    assert!(backend.is_alive("7").await.unwrap());
    assert!(!backend.is_alive("8").await.unwrap());
}

#[cfg(unix)]
#[tokio::test]
async fn find_pane_by_title_marker_renders_numeric_id_as_string() {
    let fake = FakeWezterm::new(0, r#"[{"pane_id":7,"title":"CCB-wez-abc"}]"#);
    let backend = fake.backend();

    assert_eq!(
        backend.find_pane_by_title_marker("CCB-wez").await.unwrap(),
        Some("7".to_string())
    );
    assert_eq!(backend.find_pane_by_title_marker("NOPE").await.unwrap(), None);
}

#[test]
fn pane_id_rendering_handles_numbers_and_strings() {
    let numeric = serde_json::json!(7);
    let string = serde_json::json!(" 7 ");
    assert_eq!(render_pane_id(&numeric), "7");
    assert_eq!(render_pane_id(&string), "7");
    assert!(pane_id_matches(Some(&numeric), "7"));
    assert!(pane_id_matches(Some(&string), " 7"));
    assert!(!pane_id_matches(Some(&numeric), "8"));
    assert!(!pane_id_matches(None, "7"));
}
