// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: a full daemon over a fake terminal backend and a
//! temp-dir Codex session root.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use ccb_adapters::{adapter_for, FakeBackend, FakePane};
use ccb_core::ProviderKind;
use ccb_daemon::{AskServer, ProviderHandler, ServerConfig};
use ccb_engine::{BackendFactory, Engine, EngineDeps, WorkerPool};
use ccb_storage::RegistryStore;

pub const SID: &str = "0199a213-4f47-7226-a350-d05dbc05a0b3";
pub const SID_B: &str = "0199a213-4f47-7226-a350-d05dbc05a0b4";

#[derive(Clone)]
pub struct FakeFactory(pub FakeBackend);

impl BackendFactory for FakeFactory {
    type Backend = FakeBackend;

    fn backend_for(&self, _terminal: &str) -> Option<FakeBackend> {
        Some(self.0.clone())
    }
}

/// Append one JSONL line to a rollout log.
pub fn append_line(log: &Path, line: &str) {
    use std::io::Write;
    let mut f = std::fs::OpenOptions::new().append(true).open(log).unwrap();
    writeln!(f, "{line}").unwrap();
}

/// A user entry carrying our correlation anchor.
pub fn anchor_entry(req_id: &str) -> String {
    format!(
        r#"{{"type":"response_item","payload":{{"type":"message","role":"user","content":[{{"type":"input_text","text":"CCB_REQ_ID: {req_id}\n\nhi"}}]}}}}"#
    )
}

/// An assistant entry with `text` (newlines escaped for JSON).
pub fn reply_entry(text: &str) -> String {
    let escaped = text.replace('\n', "\\n");
    format!(
        r#"{{"type":"response_item","payload":{{"type":"message","role":"assistant","content":[{{"type":"output_text","text":"{escaped}"}}]}}}}"#
    )
}

pub struct DaemonFixture {
    pub tmp: tempfile::TempDir,
    pub work_dir: PathBuf,
    pub sessions_root: PathBuf,
    pub backend: FakeBackend,
    pub state_file: PathBuf,
    serve: Option<tokio::task::JoinHandle<Result<i32, ccb_daemon::ServeError>>>,
}

impl DaemonFixture {
    /// Mount a Codex session in a temp workspace and start a daemon for it.
    ///
    /// `CODEX_SESSIONS_ROOT` is pointed into the temp dir, so tests using
    /// this fixture must hold the `codex_root` serial guard.
    pub async fn start() -> DaemonFixture {
        let tmp = tempfile::tempdir().unwrap();
        let work_dir = tmp.path().join("proj");
        std::fs::create_dir_all(work_dir.join(".ccb_config")).unwrap();
        let sessions_root = tmp.path().join("codex-sessions");
        std::fs::create_dir_all(&sessions_root).unwrap();
        std::env::set_var("CODEX_SESSIONS_ROOT", &sessions_root);

        let backend = FakeBackend::new();
        backend.add_pane(
            "%1",
            FakePane {
                alive: true,
                title: "CCB-codex-spec".to_string(),
                text: String::new(),
            },
        );

        let run_dir = tmp.path().join("run");
        let engine = Engine::new(
            FakeFactory(backend.clone()),
            adapter_for(ProviderKind::Codex),
            EngineDeps {
                run_dir: run_dir.clone(),
                registry: RegistryStore::new(tmp.path().join("registry")),
                session_name: "default".to_string(),
            },
        );
        let pool = WorkerPool::new(engine);
        let handler = Arc::new(ProviderHandler::new("cask", pool, None));

        let spec = ProviderKind::Codex.spec();
        let server = AskServer::new(ServerConfig {
            spec,
            run_dir: run_dir.clone(),
            host: "127.0.0.1".to_string(),
            port: 0,
            idle_timeout: Some(Duration::from_secs(60)),
        });
        let serve = tokio::spawn(server.serve(handler));

        let state_file = ccb_storage::state_file_path(&run_dir, spec.state_file_name);
        for _ in 0..100 {
            if state_file.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(state_file.exists(), "daemon never published its state file");

        DaemonFixture {
            tmp,
            work_dir,
            sessions_root,
            backend,
            state_file,
            serve: Some(serve),
        }
    }

    /// Write the project's `.codex-session` file bound to `sid`/`log`.
    pub fn mount_session(&self, sid: &str, log: &Path) {
        let data = json!({
            "terminal": "tmux",
            "pane_id": "%1",
            "pane_title_marker": "CCB-codex-spec",
            "work_dir": self.work_dir.to_string_lossy(),
            "codex_session_id": sid,
            "codex_session_path": log.to_string_lossy(),
        });
        std::fs::write(
            self.work_dir.join(".ccb_config").join(".codex-session"),
            serde_json::to_string(&data).unwrap(),
        )
        .unwrap();
    }

    /// Create a rollout log opened with a `session_meta` entry.
    pub fn create_log(&self, sid: &str) -> PathBuf {
        let path = self.sessions_root.join(format!("rollout-{sid}.jsonl"));
        let meta = format!(
            r#"{{"type":"session_meta","payload":{{"cwd":"{}","id":"{sid}"}}}}"#,
            self.work_dir.to_string_lossy()
        );
        std::fs::write(&path, format!("{meta}\n")).unwrap();
        path
    }

    /// Spawn a task that appends the anchor and done reply to `log` once a
    /// prompt has been injected into the pane.
    pub fn reply_after_send(&self, log: &Path, req_id: &str, body: &str) {
        let backend = self.backend.clone();
        let log = log.to_path_buf();
        let req_id = req_id.to_string();
        let body = body.to_string();
        tokio::spawn(async move {
            for _ in 0..500 {
                if !backend.sent_texts("%1").is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            append_line(&log, &anchor_entry(&req_id));
            append_line(&log, &reply_entry(&format!("{body}\nCCB_DONE: {req_id}")));
        });
    }

    pub async fn request(&self, msg: serde_json::Value) -> serde_json::Value {
        ccb_daemon::client::roundtrip(&self.state_file, msg, Duration::from_secs(30))
            .await
            .expect("daemon round trip failed")
    }

    pub async fn shutdown(&mut self) {
        ccb_daemon::client::shutdown("cask", &self.state_file, Duration::from_secs(2)).await;
        if let Some(serve) = self.serve.take() {
            let _ = tokio::time::timeout(Duration::from_secs(5), serve).await;
        }
        std::env::remove_var("CODEX_SESSIONS_ROOT");
    }
}

/// A well-formed `cask.request`; the client helper injects the token.
pub fn request_msg(fx: &DaemonFixture, req_id: &str, timeout_s: f64) -> serde_json::Value {
    json!({
        "type": "cask.request",
        "v": 1,
        "id": format!("client-{req_id}"),
        "work_dir": fx.work_dir.to_string_lossy(),
        "timeout_s": timeout_s,
        "quiet": false,
        "message": "hi",
        "req_id": req_id,
        "caller": "claude",
    })
}
