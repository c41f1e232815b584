// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::logs::Role;
use std::io::Write;

struct Fixture {
    _tmp: tempfile::TempDir,
    root: PathBuf,
    work_dir: PathBuf,
}

impl Fixture {
    fn new() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("sessions");
        let work_dir = tmp.path().join("proj");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::create_dir_all(&work_dir).unwrap();
        Fixture {
            root,
            work_dir,
            _tmp: tmp,
        }
    }

    fn create_session(&self, name: &str, sid: &str, cwd: &Path) -> PathBuf {
        let path = self.root.join(name);
        let start = format!(
            r#"{{"type":"session_start","cwd":"{}","session_id":"{sid}"}}"#,
            cwd.to_string_lossy()
        );
        std::fs::write(&path, format!("{start}\n")).unwrap();
        path
    }

    fn append(&self, path: &Path, line: &str) {
        let mut f = std::fs::OpenOptions::new().append(true).open(path).unwrap();
        writeln!(f, "{line}").unwrap();
    }
}

#[test]
fn session_start_exposes_cwd_and_id() {
    let fx = Fixture::new();
    let path = fx.create_session("s1.jsonl", "droid-123", &fx.work_dir);
    let (cwd, sid) = read_droid_session_start(&path);
    assert_eq!(cwd.as_deref(), Some(fx.work_dir.to_str().unwrap()));
    assert_eq!(sid.as_deref(), Some("droid-123"));
}

#[test]
fn selection_prefers_id_hint_over_mtime() {
    let fx = Fixture::new();
    fx.create_session("a-droid-123.jsonl", "droid-123", &fx.work_dir);
    std::thread::sleep(std::time::Duration::from_millis(20));
    fx.create_session("b-droid-999.jsonl", "droid-999", &fx.work_dir);

    let mut reader = DroidLogReader::with_root(fx.root.clone(), &fx.work_dir);
    reader.set_session_id_hint("droid-123");
    reader.capture();
    assert!(reader
        .current_log_path()
        .unwrap()
        .to_string_lossy()
        .contains("droid-123"));
}

#[test]
fn selection_matches_work_dir_cwd() {
    let fx = Fixture::new();
    let other = fx.work_dir.parent().unwrap().join("elsewhere");
    std::fs::create_dir_all(&other).unwrap();
    // The newest session belongs to another project; ours still wins.
    fx.create_session("ours.jsonl", "droid-1", &fx.work_dir);
    std::thread::sleep(std::time::Duration::from_millis(20));
    fx.create_session("theirs.jsonl", "droid-2", &other);

    let mut reader = DroidLogReader::with_root(fx.root.clone(), &fx.work_dir);
    reader.capture();
    assert_eq!(
        reader.current_log_path().unwrap().file_name().unwrap(),
        "ours.jsonl"
    );
}

#[tokio::test]
async fn events_stream_after_capture() {
    let fx = Fixture::new();
    let path = fx.create_session("s1.jsonl", "droid-1", &fx.work_dir);
    let mut reader = DroidLogReader::with_root(fx.root.clone(), &fx.work_dir);
    reader.set_preferred_session(&path);
    reader.capture();

    fx.append(
        &path,
        r#"{"type":"assistant","message":{"role":"assistant","content":[{"type":"text","text":"droid reply"}]}}"#,
    );
    let events = reader
        .wait_for_events(std::time::Duration::from_millis(500))
        .await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].role, Role::Assistant);
    assert_eq!(events[0].text, "droid reply");
}
