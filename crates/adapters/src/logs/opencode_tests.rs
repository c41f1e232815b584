// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use serial_test::serial;

const REQ: &str = "20260101-120000-000-1";
const SID: &str = "ses_01";

struct Fixture {
    _tmp: tempfile::TempDir,
    storage: PathBuf,
    logs: PathBuf,
}

impl Fixture {
    fn new() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let storage = tmp.path().join("storage");
        let logs = tmp.path().join("log");
        std::fs::create_dir_all(storage.join("session").join("message").join(SID)).unwrap();
        std::fs::create_dir_all(storage.join("session").join("part")).unwrap();
        std::fs::create_dir_all(&logs).unwrap();
        Fixture {
            storage,
            logs,
            _tmp: tmp,
        }
    }

    fn reader(&self) -> OpenCodeLogReader {
        OpenCodeLogReader::with_roots(self.storage.clone(), self.logs.clone(), Some(SID.to_string()))
    }

    fn write_message(&self, message_id: &str, role: &str, text: &str) {
        let path = self
            .storage
            .join("session")
            .join("message")
            .join(SID)
            .join(format!("{message_id}.json"));
        let doc = json!({
            "id": message_id,
            "role": role,
            "sessionID": SID,
            "parts": [{"type": "text", "text": text}],
        });
        std::fs::write(path, serde_json::to_string(&doc).unwrap()).unwrap();
    }

    fn write_aborted_assistant(&self, message_id: &str) {
        let path = self
            .storage
            .join("session")
            .join("message")
            .join(SID)
            .join(format!("{message_id}.json"));
        let doc = json!({
            "id": message_id,
            "role": "assistant",
            "sessionID": SID,
            "parts": [],
            "error": {"name": "MessageAbortedError"},
        });
        std::fs::write(path, serde_json::to_string(&doc).unwrap()).unwrap();
    }
}

#[tokio::test]
async fn messages_after_capture_are_reported_in_order() {
    let fx = Fixture::new();
    fx.write_message("msg_001", "assistant", "old");

    let mut reader = fx.reader();
    reader.capture();

    fx.write_message("msg_002", "user", &format!("CCB_REQ_ID: {REQ}\n\nhi"));
    fx.write_message("msg_003", "assistant", "fresh reply");

    let events = reader.wait_for_events(Duration::from_millis(500)).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].role, Role::User);
    assert_eq!(events[1].role, Role::Assistant);
    assert_eq!(events[1].text, "fresh reply");
}

#[tokio::test]
async fn part_files_are_joined_for_reply_text() {
    let fx = Fixture::new();
    let mut reader = fx.reader();
    reader.capture();

    // Message without inline parts; text lives in the part directory.
    let message = json!({"id": "msg_010", "role": "assistant", "sessionID": SID});
    std::fs::write(
        fx.storage
            .join("session")
            .join("message")
            .join(SID)
            .join("msg_010.json"),
        serde_json::to_string(&message).unwrap(),
    )
    .unwrap();
    let part_dir = fx.storage.join("session").join("part").join("msg_010");
    std::fs::create_dir_all(&part_dir).unwrap();
    std::fs::write(
        part_dir.join("prt_001.json"),
        serde_json::to_string(&json!({"type": "text", "text": "part one"})).unwrap(),
    )
    .unwrap();
    std::fs::write(
        part_dir.join("prt_002.json"),
        serde_json::to_string(&json!({"type": "text", "text": "part two"})).unwrap(),
    )
    .unwrap();

    let events = reader.wait_for_events(Duration::from_millis(500)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text, "part one\npart two");
}

#[tokio::test]
#[serial(oask_cancel_env)]
async fn cancel_detection_is_disabled_by_default() {
    std::env::remove_var("CCB_OASKD_CANCEL_DETECT");
    let fx = Fixture::new();
    let mut reader = fx.reader();
    reader.capture();

    fx.write_message("msg_001", "user", &format!("CCB_REQ_ID: {REQ}\n\ngo"));
    fx.write_aborted_assistant("msg_002");
    assert!(!reader.check_cancelled(REQ));
}

#[tokio::test]
#[serial(oask_cancel_env)]
async fn aborted_assistant_message_cancels_our_request() {
    std::env::set_var("CCB_OASKD_CANCEL_DETECT", "1");
    let fx = Fixture::new();
    let mut reader = fx.reader();
    reader.capture();

    fx.write_message("msg_001", "user", &format!("CCB_REQ_ID: {REQ}\n\ngo"));
    fx.write_aborted_assistant("msg_002");
    assert!(reader.check_cancelled(REQ));
    assert!(!reader.check_cancelled("20260101-999999-999-9"));
    std::env::remove_var("CCB_OASKD_CANCEL_DETECT");
}

#[tokio::test]
#[serial(oask_cancel_env)]
async fn server_log_cancel_line_is_detected() {
    std::env::set_var("CCB_OASKD_CANCEL_DETECT", "1");
    let fx = Fixture::new();
    let log_file = fx.logs.join("server.log");
    std::fs::write(&log_file, "old line\n").unwrap();

    let mut reader = fx.reader();
    reader.capture();

    let mut content = std::fs::read_to_string(&log_file).unwrap();
    content.push_str(&format!("INFO session.abort sessionID={SID}\n"));
    std::fs::write(&log_file, content).unwrap();

    assert!(reader.check_cancelled(REQ));
    std::env::remove_var("CCB_OASKD_CANCEL_DETECT");
}

#[tokio::test]
async fn session_filter_falls_back_to_newest_session() {
    let fx = Fixture::new();
    let mut reader =
        OpenCodeLogReader::with_roots(fx.storage.clone(), fx.logs.clone(), None);
    fx.write_message("msg_001", "assistant", "seed");
    reader.capture();
    assert_eq!(reader.session_id(), Some(SID));
}
