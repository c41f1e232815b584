// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One request, end to end.
//!
//! Resolve the session, make sure its pane is alive (re-finding by title
//! marker, then respawning under tmux), snapshot the log reader, inject the
//! wrapped prompt, and poll for the anchor and done marker. Waits are
//! chunked to 0.5 s so deadline, pane-liveness, and cancel checks
//! interleave. Every failure becomes a `ProviderResult`; the worker
//! survives all of them.

use std::path::Path;
use std::time::{Duration, Instant};

use ccb_adapters::{LogReader, ProviderAdapter, ReplyMode, Role, TerminalBackend};
use ccb_core::{ProviderRequest, ProviderResult, REQ_ID_PREFIX};
use ccb_storage::{LockScope, ProcessLock, RegistryUpsert, SessionFile};

use crate::engine::{BackendFactory, Engine};
use crate::env;
use crate::hook;
use crate::pool::now_ms;
use crate::route;

/// Wait chunk inside the collect loop.
const WAIT_STEP: Duration = Duration::from_millis(500);
/// No anchor within this window means the log binding is likely stale.
const ANCHOR_GRACE: Duration = Duration::from_millis(1500);
/// Assistant events are ignored this long unless the anchor was seen, so a
/// prior in-flight reply is not captured as ours.
const COLLECT_GRACE: Duration = Duration::from_millis(2000);
/// Upper bound on waiting for the cross-process request lock.
const LOCK_TIMEOUT_MAX: Duration = Duration::from_secs(300);

/// A dequeued task as the worker sees it.
pub(crate) struct TaskBody {
    pub request: ProviderRequest,
    pub req_id: String,
    pub created_ms: u64,
}

/// Execute one task on its session worker.
pub(crate) async fn run<F: BackendFactory>(
    engine: &Engine<F>,
    session_key: &str,
    task: TaskBody,
) -> ProviderResult {
    let adapter = engine.adapter.as_ref();
    let req = &task.request;
    let req_id = &task.req_id;
    tracing::info!(
        session_key,
        req_id,
        work_dir = %req.work_dir,
        timeout_s = req.timeout_s,
        queued_ms = now_ms().saturating_sub(task.created_ms),
        "start"
    );

    // Serialize with direct-mode clients sharing the pane, when the
    // provider calls for it.
    let mut request_lock = None;
    if let Some(scope) = adapter.request_lock_scope(session_key) {
        match acquire_request_lock(&engine.deps.run_dir, adapter, &scope, req.timeout_s).await {
            Ok(lock) => request_lock = Some(lock),
            Err(message) => return ProviderResult::failure(req_id, session_key, message),
        }
    }

    let result = run_locked(engine, session_key, &task).await;
    if let Some(mut lock) = request_lock {
        lock.release();
    }

    tracing::info!(
        session_key,
        req_id,
        exit = result.exit_code,
        anchor = result.anchor_seen,
        done = result.done_seen,
        fallback = result.fallback_scan,
        log = result.log_path.as_deref().unwrap_or(""),
        anchor_ms = result.anchor_ms.unwrap_or(0),
        done_ms = result.done_ms.unwrap_or(0),
        "done"
    );
    result
}

async fn acquire_request_lock(
    run_dir: &Path,
    adapter: &dyn ProviderAdapter,
    scope: &LockScope,
    timeout_s: f64,
) -> Result<ProcessLock, String> {
    let timeout = if timeout_s < 0.0 {
        LOCK_TIMEOUT_MAX
    } else {
        LOCK_TIMEOUT_MAX.min(Duration::from_secs_f64(timeout_s.max(1.0)))
    };
    let mut lock = ProcessLock::new(run_dir, adapter.spec().protocol_prefix, scope);
    let deadline = Instant::now() + timeout;
    loop {
        match lock.try_acquire() {
            Ok(true) => return Ok(lock),
            Ok(false) => {}
            Err(err) => return Err(format!("❌ Request lock failed: {err}")),
        }
        if Instant::now() >= deadline {
            return Err(format!(
                "❌ Another {} request is in progress (session lock timeout).",
                adapter.kind()
            ));
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

async fn run_locked<F: BackendFactory>(
    engine: &Engine<F>,
    session_key: &str,
    task: &TaskBody,
) -> ProviderResult {
    let adapter = engine.adapter.as_ref();
    let req = &task.request;
    let req_id = &task.req_id;
    let kind = adapter.kind();
    let work_dir = Path::new(&req.work_dir);

    let Some(mut session) = route::resolve_session(
        &engine.factory,
        &engine.deps.registry,
        work_dir,
        kind,
        &engine.deps.session_name,
    )
    .await
    else {
        return ProviderResult::failure(
            req_id,
            session_key,
            format!(
                "❌ No active {kind} session found for work_dir. Mount {kind} in that project first."
            ),
        );
    };

    let Some(backend) = engine.factory.backend_for(&session.terminal()) else {
        return ProviderResult::failure(req_id, session_key, "❌ Terminal backend not available");
    };

    let pane_id = match ensure_pane(&backend, &mut session, kind).await {
        Ok(pane_id) => pane_id,
        Err(message) => {
            return ProviderResult::failure(
                req_id,
                session_key,
                format!("❌ Session pane not available: {message}"),
            )
        }
    };

    publish_registry(engine, &session, &pane_id);

    let mut reader = adapter.make_reader(&session);
    reader.capture();

    let prompt = if req.no_wrap {
        req.message.clone()
    } else {
        adapter.wrap_prompt(&req.message, req_id)
    };
    if let Err(err) = backend.send_text(&pane_id, &prompt).await {
        return ProviderResult::failure(req_id, session_key, format!("❌ Send failed: {err}"));
    }

    let started = Instant::now();
    let started_ms_base = now_ms();

    // Fire-and-forget: injection happened under the lock; nothing to wait on.
    if adapter.fire_and_forget() && req.timeout_s == 0.0 {
        return ProviderResult {
            exit_code: 0,
            reply: String::new(),
            req_id: req_id.clone(),
            session_key: session_key.to_string(),
            done_seen: true,
            done_ms: Some(now_ms().saturating_sub(started_ms_base)),
            anchor_seen: false,
            anchor_ms: None,
            fallback_scan: false,
            log_path: reader.current_log_path().map(|p| p.to_string_lossy().into_owned()),
        };
    }

    let deadline = (req.timeout_s >= 0.0)
        .then(|| started + Duration::from_secs_f64(req.timeout_s));
    let anchor_grace = cap_to(started + ANCHOR_GRACE, deadline);
    let collect_grace = cap_to(started + COLLECT_GRACE, deadline);
    let pane_check_interval = env::pane_check_interval(adapter.spec());
    let tail_bytes = env::rebind_tail_bytes(adapter.spec());

    let mut buffer = String::new();
    let mut anchor_seen = false;
    let mut anchor_ms = None;
    let mut done_seen = false;
    let mut done_ms = None;
    let mut fallback_scan = false;
    let mut rebound = false;
    let mut last_pane_check = Instant::now();

    'collect: loop {
        let now = Instant::now();
        let wait_step = match deadline {
            Some(deadline) if now >= deadline => break 'collect,
            Some(deadline) => WAIT_STEP.min(deadline - now),
            None => WAIT_STEP,
        };

        // Fail fast when the pane dies mid-request.
        if last_pane_check.elapsed() >= pane_check_interval {
            last_pane_check = Instant::now();
            let alive = backend.is_alive(&pane_id).await.unwrap_or(false);
            if !alive {
                tracing::error!(session_key, req_id, pane_id, "pane died during request");
                return finish_failure(
                    format!("❌ {kind} pane died during request"),
                    req_id,
                    session_key,
                    reader.as_ref(),
                    anchor_seen,
                    anchor_ms,
                    fallback_scan,
                );
            }
            if let Some(marker) = adapter.pane_interrupt_marker() {
                if pane_interrupted(&backend, &pane_id, marker, req_id).await {
                    tracing::warn!(session_key, req_id, "provider interrupted; skipping task");
                    return finish_failure(
                        format!(
                            "❌ {kind} interrupted. Recover {kind} manually, then retry. Skipping to next task."
                        ),
                        req_id,
                        session_key,
                        reader.as_ref(),
                        anchor_seen,
                        anchor_ms,
                        fallback_scan,
                    );
                }
            }
            if reader.check_cancelled(req_id) {
                tracing::warn!(session_key, req_id, "request cancelled by user");
                return finish_failure(
                    format!("❌ {kind} request cancelled. Skipping to next task."),
                    req_id,
                    session_key,
                    reader.as_ref(),
                    anchor_seen,
                    anchor_ms,
                    fallback_scan,
                );
            }
        }

        let events = reader.wait_for_events(wait_step).await;
        if events.is_empty() {
            // Escape hatch: no anchor within grace means the recorded log
            // binding is stale; rebind once to the newest log at a tail
            // offset so an already-landed reply is not missed.
            if !rebound && !anchor_seen && Instant::now() >= anchor_grace {
                reader.rebind_to_tail(tail_bytes);
                fallback_scan = true;
                rebound = true;
                tracing::info!(session_key, req_id, "anchor grace expired; rebound to latest log");
            }
            continue;
        }

        for event in events {
            match event.role {
                Role::User => {
                    if !anchor_seen && event.text.contains(&format!("{REQ_ID_PREFIX} {req_id}")) {
                        anchor_seen = true;
                        anchor_ms = Some(now_ms().saturating_sub(started_ms_base));
                    }
                }
                Role::Assistant => {
                    // Skip unrelated replies until our request is visible.
                    if !anchor_seen && Instant::now() < collect_grace {
                        continue;
                    }
                    match adapter.reply_mode() {
                        ReplyMode::Append => {
                            if !buffer.is_empty() {
                                buffer.push('\n');
                            }
                            buffer.push_str(&event.text);
                        }
                        ReplyMode::Replace => buffer = event.text,
                    }
                    if ccb_core::is_done_text(&buffer, req_id) {
                        done_seen = true;
                        done_ms = Some(now_ms().saturating_sub(started_ms_base));
                        break 'collect;
                    }
                }
                Role::Info => {}
            }
        }
    }

    let reply = adapter.extract_reply(&buffer, req_id);
    let log_path = reader.current_log_path();

    if done_seen {
        if adapter.on_done(&mut session, log_path.as_deref()) {
            if let Err(err) = session.write_back() {
                tracing::warn!(session_key, req_id, error = %err, "binding write-back failed");
            }
        }
        hook::notify_completion(
            kind.key(),
            req.output_path.as_deref(),
            &reply,
            req_id,
            &req.caller,
            &req.work_dir,
        );
    }

    ProviderResult {
        exit_code: if done_seen { 0 } else { 2 },
        reply,
        req_id: req_id.clone(),
        session_key: session_key.to_string(),
        done_seen,
        done_ms,
        anchor_seen,
        anchor_ms,
        fallback_scan,
        log_path: log_path.map(|p| p.to_string_lossy().into_owned()),
    }
}

fn cap_to(candidate: Instant, deadline: Option<Instant>) -> Instant {
    match deadline {
        Some(deadline) => candidate.min(deadline),
        None => candidate,
    }
}

fn finish_failure(
    message: String,
    req_id: &str,
    session_key: &str,
    reader: &dyn LogReader,
    anchor_seen: bool,
    anchor_ms: Option<u64>,
    fallback_scan: bool,
) -> ProviderResult {
    let mut result = ProviderResult::failure(req_id, session_key, message);
    result.anchor_seen = anchor_seen;
    result.anchor_ms = anchor_ms;
    result.fallback_scan = fallback_scan;
    result.log_path = reader
        .current_log_path()
        .map(|p| p.to_string_lossy().into_owned());
    result
}

/// Interrupt is ours only when the marker appears after our req id in the
/// visible pane text (or the id scrolled off entirely).
async fn pane_interrupted<B: TerminalBackend>(
    backend: &B,
    pane_id: &str,
    marker: &str,
    req_id: &str,
) -> bool {
    let Ok(text) = backend.capture_text(pane_id, 15).await else {
        return false;
    };
    let Some(interrupt_pos) = text.find(marker) else {
        return false;
    };
    match text.find(req_id) {
        Some(req_pos) => interrupt_pos > req_pos,
        None => true,
    }
}

/// Make sure the session's pane is alive, updating the session file when the
/// pane had to be re-found or respawned.
async fn ensure_pane<B: TerminalBackend>(
    backend: &B,
    session: &mut SessionFile,
    kind: ccb_core::ProviderKind,
) -> Result<String, String> {
    let pane_id = session.pane_id();
    if !pane_id.is_empty() && backend.is_alive(&pane_id).await.unwrap_or(false) {
        return Ok(pane_id);
    }

    // Pane ids churn; the title marker is authoritative.
    let marker = session.pane_title_marker();
    let mut resolved = None;
    if !marker.is_empty() {
        if let Ok(Some(found)) = backend.find_pane_by_title_marker(&marker).await {
            if backend.is_alive(&found).await.unwrap_or(false) {
                session.set_pane_id(&found);
                let _ = session.write_back();
                return Ok(found);
            }
            resolved = Some(found);
        }
    }

    // tmux self-heal: a dead remain-on-exit pane can be respawned in place.
    if session.terminal() == "tmux" {
        let start_cmd = session.start_cmd(kind);
        if !start_cmd.is_empty() {
            let mut last_err: Option<String> = None;
            for target in [resolved.as_deref(), Some(pane_id.as_str())]
                .into_iter()
                .flatten()
            {
                if !target.starts_with('%') {
                    continue;
                }
                let crash_log = session.runtime_dir().join(format!(
                    "pane-crash-{}.log",
                    std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0)
                ));
                let _ = backend.save_crash_log(target, &crash_log, 1000).await;

                match backend
                    .respawn_pane(target, &start_cmd, &session.work_dir(), true)
                    .await
                {
                    Ok(()) => {
                        if backend.is_alive(target).await.unwrap_or(false) {
                            session.set_pane_id(target);
                            let _ = session.write_back();
                            return Ok(target.to_string());
                        }
                        last_err = Some("respawn did not revive pane".to_string());
                    }
                    Err(err) => last_err = Some(err.to_string()),
                }
            }
            if let Some(err) = last_err {
                return Err(format!("Pane not alive and respawn failed: {err}"));
            }
        }
    }

    Err(format!("Pane not alive: {pane_id}"))
}

/// Publish the resolved binding into the per-user registry (best effort).
fn publish_registry<F: BackendFactory>(engine: &Engine<F>, session: &SessionFile, pane_id: &str) {
    let ccb_session_id = {
        let from_file = session.ccb_session_id();
        if from_file.is_empty() {
            std::env::var("CCB_SESSION_ID").unwrap_or_default()
        } else {
            from_file
        }
    };
    if ccb_session_id.trim().is_empty() {
        return;
    }
    let kind = engine.adapter.kind();
    let mut entry = serde_json::Map::new();
    entry.insert("pane_id".to_string(), serde_json::Value::String(pane_id.to_string()));
    let marker = session.pane_title_marker();
    if !marker.is_empty() {
        entry.insert(
            "pane_title_marker".to_string(),
            serde_json::Value::String(marker),
        );
    }
    entry.insert(
        "session_file".to_string(),
        serde_json::Value::String(session.path.to_string_lossy().into_owned()),
    );
    let (session_id, session_path) = session.log_binding(kind);
    if let Some(id) = session_id {
        entry.insert(
            format!("{}_session_id", kind.key()),
            serde_json::Value::String(id),
        );
    }
    if let Some(path) = session_path {
        entry.insert(
            format!("{}_session_path", kind.key()),
            serde_json::Value::String(path.to_string_lossy().into_owned()),
        );
    }
    engine.deps.registry.upsert(&RegistryUpsert {
        ccb_session_id,
        ccb_session_name: Some(engine.deps.session_name.clone()),
        ccb_project_id: Some(session.project_id()).filter(|p| !p.is_empty()),
        work_dir: Some(session.work_dir().to_string_lossy().into_owned()),
        terminal: Some(session.terminal()),
        provider: Some((kind, entry)),
    });
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
