// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::logs::Role;
use std::io::Write;
use std::time::Duration;

struct Fixture {
    _root: tempfile::TempDir,
    root: PathBuf,
    work_dir: PathBuf,
}

impl Fixture {
    fn new() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("projects");
        let work_dir = tmp.path().join("proj");
        std::fs::create_dir_all(&work_dir).unwrap();
        std::fs::create_dir_all(root.join(ClaudeLogReader::project_key(&work_dir))).unwrap();
        Fixture {
            root,
            work_dir,
            _root: tmp,
        }
    }

    fn reader(&self) -> ClaudeLogReader {
        ClaudeLogReader::with_root(self.root.clone(), &self.work_dir)
    }

    fn project_dir(&self) -> PathBuf {
        self.root.join(ClaudeLogReader::project_key(&self.work_dir))
    }

    fn session_path(&self, name: &str) -> PathBuf {
        self.project_dir().join(name)
    }

    fn append(&self, name: &str, line: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_path(name))
            .unwrap();
        writeln!(f, "{line}").unwrap();
    }
}

fn assistant_line(text: &str) -> String {
    format!(
        r#"{{"type":"assistant","message":{{"role":"assistant","content":[{{"type":"text","text":"{text}"}}]}}}}"#
    )
}

fn user_line(text: &str) -> String {
    format!(r#"{{"type":"user","message":{{"role":"user","content":"{text}"}}}}"#)
}

#[tokio::test]
async fn capture_then_wait_reports_only_new_events() {
    let fx = Fixture::new();
    fx.append("abc.jsonl", &assistant_line("old reply"));

    let mut reader = fx.reader();
    reader.capture();

    fx.append("abc.jsonl", &user_line("CCB_REQ_ID: 20260101-120000-000-1"));
    fx.append("abc.jsonl", &assistant_line("new reply"));

    let events = reader.wait_for_events(Duration::from_millis(500)).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].role, Role::User);
    assert_eq!(events[1].role, Role::Assistant);
    assert_eq!(events[1].text, "new reply");
}

#[tokio::test]
async fn wait_times_out_with_no_events() {
    let fx = Fixture::new();
    fx.append("abc.jsonl", &assistant_line("old"));
    let mut reader = fx.reader();
    reader.capture();

    let start = std::time::Instant::now();
    let events = reader.wait_for_events(Duration::from_millis(120)).await;
    assert!(events.is_empty());
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[tokio::test]
async fn follows_newer_session_file() {
    let fx = Fixture::new();
    fx.append("a.jsonl", &assistant_line("in a"));
    let mut reader = fx.reader();
    reader.capture();

    // A newer session appears; its events are picked up from offset zero.
    std::thread::sleep(Duration::from_millis(20));
    fx.append("b.jsonl", &assistant_line("in b"));
    let events = reader.wait_for_events(Duration::from_millis(500)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text, "in b");
    assert_eq!(
        reader.current_log_path().unwrap().file_name().unwrap(),
        "b.jsonl"
    );
}

#[tokio::test]
async fn sidechain_sessions_are_skipped() {
    let fx = Fixture::new();
    fx.append("main.jsonl", r#"{"isSidechain":false,"type":"summary"}"#);
    std::thread::sleep(Duration::from_millis(20));
    fx.append("side.jsonl", r#"{"isSidechain":true,"type":"summary"}"#);

    let mut reader = fx.reader();
    reader.capture();
    assert_eq!(
        reader.current_log_path().unwrap().file_name().unwrap(),
        "main.jsonl"
    );
}

#[tokio::test]
async fn sessions_index_is_cross_checked_against_scan() {
    let fx = Fixture::new();
    fx.append("indexed.jsonl", &assistant_line("indexed"));
    let index = serde_json::json!({
        "entries": [{
            "projectPath": fx.work_dir.to_string_lossy(),
            "fullPath": fx.session_path("indexed.jsonl").to_string_lossy(),
            "fileMtime": 1,
        }]
    });
    std::fs::write(
        fx.project_dir().join("sessions-index.json"),
        serde_json::to_string(&index).unwrap(),
    )
    .unwrap();

    // A newer on-disk session beats the stale index entry.
    std::thread::sleep(Duration::from_millis(20));
    fx.append("newer.jsonl", &assistant_line("newer"));
    let mut reader = fx.reader();
    reader.capture();
    assert_eq!(
        reader.current_log_path().unwrap().file_name().unwrap(),
        "newer.jsonl"
    );
}

#[tokio::test]
async fn rebind_to_tail_rereads_recent_bytes() {
    let fx = Fixture::new();
    fx.append("abc.jsonl", &assistant_line("already written"));
    let mut reader = fx.reader();
    reader.capture();

    reader.rebind_to_tail(64 * 1024);
    let events = reader.wait_for_events(Duration::from_millis(300)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].text, "already written");
}

#[tokio::test]
async fn preferred_session_is_used_when_fresh() {
    let fx = Fixture::new();
    fx.append("bound.jsonl", &assistant_line("bound"));
    let mut reader = fx.reader();
    reader.set_preferred_session(&fx.session_path("bound.jsonl"));
    reader.capture();
    assert_eq!(
        reader.current_log_path().unwrap().file_name().unwrap(),
        "bound.jsonl"
    );
}
