// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for engine tests: a scripted log reader, a scripted
//! provider adapter, and a fake-backend factory.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use ccb_adapters::{FakeBackend, FakePane, LogEvent, LogReader, ProviderAdapter, ReplyMode};
use ccb_core::{wrap_prompt, ProviderKind};
use ccb_storage::{LockScope, RegistryStore, SessionFile};

use crate::engine::{BackendFactory, Engine, EngineDeps};

#[derive(Clone)]
pub struct FakeFactory(pub FakeBackend);

impl BackendFactory for FakeFactory {
    type Backend = FakeBackend;

    fn backend_for(&self, _terminal: &str) -> Option<FakeBackend> {
        Some(self.0.clone())
    }
}

/// Scripted event source shared between a test and its reader.
#[derive(Clone, Default)]
pub struct ReaderScript {
    batches: Arc<Mutex<VecDeque<Vec<LogEvent>>>>,
    rebind_batches: Arc<Mutex<VecDeque<Vec<LogEvent>>>>,
    delay: Arc<Mutex<Duration>>,
    rebound: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
}

impl ReaderScript {
    pub fn new() -> ReaderScript {
        ReaderScript::default()
    }

    /// Queue a batch delivered by one `wait_for_events` call.
    pub fn push(&self, events: Vec<LogEvent>) {
        self.batches.lock().push_back(events);
    }

    /// Queue a batch only visible after `rebind_to_tail`.
    pub fn push_after_rebind(&self, events: Vec<LogEvent>) {
        self.rebind_batches.lock().push_back(events);
    }

    /// Delay before each delivered batch (throttles the worker).
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn set_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn was_rebound(&self) -> bool {
        self.rebound.load(Ordering::SeqCst)
    }
}

pub struct ScriptedReader {
    script: ReaderScript,
}

#[async_trait]
impl LogReader for ScriptedReader {
    fn capture(&mut self) {}

    async fn wait_for_events(&mut self, timeout: Duration) -> Vec<LogEvent> {
        let delay = *self.script.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay.min(timeout)).await;
        }
        let source = if self.script.rebound.load(Ordering::SeqCst) {
            &self.script.rebind_batches
        } else {
            &self.script.batches
        };
        if let Some(batch) = source.lock().pop_front() {
            return batch;
        }
        tokio::time::sleep(timeout.saturating_sub(delay)).await;
        Vec::new()
    }

    fn current_log_path(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/scripted/session.jsonl"))
    }

    fn rebind_to_tail(&mut self, _tail_bytes: u64) {
        self.script.rebound.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&mut self, _req_id: &str) -> bool {
        self.script.cancelled.load(Ordering::SeqCst)
    }
}

/// Provider adapter whose readers replay a script. Each task pops the next
/// script so multi-request tests can shape every reply independently.
pub struct ScriptedAdapter {
    pub scripts: Mutex<VecDeque<ReaderScript>>,
    pub reply_mode: ReplyMode,
    pub lock_scope: bool,
    pub fire_and_forget: bool,
    pub interrupt_marker: Option<&'static str>,
}

impl ScriptedAdapter {
    pub fn with_scripts(scripts: Vec<ReaderScript>) -> ScriptedAdapter {
        ScriptedAdapter {
            scripts: Mutex::new(scripts.into()),
            reply_mode: ReplyMode::Append,
            lock_scope: false,
            fire_and_forget: false,
            interrupt_marker: None,
        }
    }
}

impl ProviderAdapter for ScriptedAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Codex
    }

    fn wrap_prompt(&self, message: &str, req_id: &str) -> String {
        wrap_prompt(message, req_id, &["Reply normally."])
    }

    fn reply_mode(&self) -> ReplyMode {
        self.reply_mode
    }

    fn make_reader(&self, _session: &SessionFile) -> Box<dyn LogReader> {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or_default();
        Box::new(ScriptedReader { script })
    }

    fn request_lock_scope(&self, session_key: &str) -> Option<LockScope> {
        self.lock_scope
            .then(|| LockScope::Session(session_key.to_string()))
    }

    fn fire_and_forget(&self) -> bool {
        self.fire_and_forget
    }

    fn pane_interrupt_marker(&self) -> Option<&'static str> {
        self.interrupt_marker
    }
}

/// A workspace with a mounted session and a fake backend.
pub struct EngineFixture {
    pub tmp: tempfile::TempDir,
    pub work_dir: PathBuf,
    pub backend: FakeBackend,
}

impl EngineFixture {
    pub fn new() -> EngineFixture {
        let tmp = tempfile::tempdir().unwrap();
        let work_dir = tmp.path().join("proj");
        std::fs::create_dir_all(work_dir.join(".ccb_config")).unwrap();

        let backend = FakeBackend::new();
        backend.add_pane(
            "%1",
            FakePane {
                alive: true,
                title: "CCB-codex-test".to_string(),
                text: String::new(),
            },
        );

        let fx = EngineFixture {
            tmp,
            work_dir,
            backend,
        };
        fx.write_session_file();
        fx
    }

    pub fn write_session_file(&self) {
        let data = serde_json::json!({
            "terminal": "tmux",
            "pane_id": "%1",
            "pane_title_marker": "CCB-codex-test",
            "work_dir": self.work_dir.to_string_lossy(),
        });
        std::fs::write(
            self.session_file_path(),
            serde_json::to_string(&data).unwrap(),
        )
        .unwrap();
    }

    pub fn session_file_path(&self) -> PathBuf {
        self.work_dir.join(".ccb_config").join(".codex-session")
    }

    pub fn engine(&self, adapter: ScriptedAdapter) -> Engine<FakeFactory> {
        Engine::new(
            FakeFactory(self.backend.clone()),
            Arc::new(adapter),
            EngineDeps {
                run_dir: self.tmp.path().join("run"),
                registry: RegistryStore::new(self.tmp.path().join("registry")),
                session_name: "default".to_string(),
            },
        )
    }

    pub fn remove_session_file(&self) {
        let _ = std::fs::remove_file(self.session_file_path());
    }
}

pub fn user_anchor(req_id: &str) -> LogEvent {
    LogEvent::new(
        ccb_adapters::Role::User,
        format!("CCB_REQ_ID: {req_id}\n\nquestion"),
    )
}

pub fn assistant(text: &str) -> LogEvent {
    LogEvent::new(ccb_adapters::Role::Assistant, text)
}

pub fn done_reply(body: &str, req_id: &str) -> LogEvent {
    assistant(&format!("{body}\nCCB_DONE: {req_id}"))
}
