// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session worker pool.
//!
//! One long-lived tokio task per session key, fed by a bounded FIFO channel:
//! at most one request executes per key, and two prompts are never injected
//! into the same pane before the first completes or times out. Workers are
//! kept for the daemon's lifetime; `shutdown` closes the queues.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use ccb_core::{make_req_id, ProviderRequest, ProviderResult};

use crate::engine::{BackendFactory, Engine};
use crate::request::{self, TaskBody};
use crate::route;

/// Bounded per-worker queue depth.
const QUEUE_DEPTH: usize = 128;

type QueueItem = (TaskBody, oneshot::Sender<ProviderResult>);

/// A submitted request: await `done` for the result.
pub struct SubmitOutcome {
    pub req_id: String,
    pub session_key: String,
    pub done: oneshot::Receiver<ProviderResult>,
}

/// Process-wide map from session key to its worker queue.
pub struct WorkerPool<F: BackendFactory> {
    engine: Arc<Engine<F>>,
    workers: Mutex<HashMap<String, mpsc::Sender<QueueItem>>>,
}

impl<F: BackendFactory> WorkerPool<F> {
    pub fn new(engine: Engine<F>) -> Arc<WorkerPool<F>> {
        Arc::new(WorkerPool {
            engine: Arc::new(engine),
            workers: Mutex::new(HashMap::new()),
        })
    }

    /// Route a request to its session worker, creating the worker on first
    /// use. Queueing is FIFO per key; the enqueue awaits capacity so a full
    /// queue applies backpressure instead of dropping.
    pub async fn submit(self: &Arc<Self>, request: ProviderRequest) -> SubmitOutcome {
        let req_id = request
            .req_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(make_req_id);

        let kind = self.engine.adapter.kind();
        let work_dir = std::path::PathBuf::from(&request.work_dir);
        let session =
            ccb_storage::load_project_session(&work_dir, kind, &self.engine.deps.session_name);
        let session_key = route::session_key_for(session.as_ref(), &work_dir, kind);

        let task = TaskBody {
            request,
            req_id: req_id.clone(),
            created_ms: now_ms(),
        };
        let (done_tx, done_rx) = oneshot::channel();

        let queue = self.worker_queue(&session_key);
        if queue.send((task, done_tx)).await.is_err() {
            tracing::warn!(session_key, req_id, "worker queue closed during submit");
        } else {
            tracing::info!(session_key, req_id, "enqueued");
        }

        SubmitOutcome {
            req_id,
            session_key,
            done: done_rx,
        }
    }

    fn worker_queue(self: &Arc<Self>, session_key: &str) -> mpsc::Sender<QueueItem> {
        let mut workers = self.workers.lock();
        if let Some(queue) = workers.get(session_key) {
            if !queue.is_closed() {
                return queue.clone();
            }
        }

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let engine = Arc::clone(&self.engine);
        tokio::spawn(run_worker(engine, session_key.to_string(), rx));
        workers.insert(session_key.to_string(), tx.clone());
        tx
    }

    /// Close all queues; in-flight tasks finish, idle workers exit.
    pub fn shutdown(&self) {
        self.workers.lock().clear();
    }
}

async fn run_worker<F: BackendFactory>(
    engine: Arc<Engine<F>>,
    session_key: String,
    mut rx: mpsc::Receiver<QueueItem>,
) {
    while let Some((task, done_tx)) = rx.recv().await {
        let req_id = task.req_id.clone();
        let result = request::run(&engine, &session_key, task).await;
        if done_tx.send(result).is_err() {
            tracing::debug!(session_key, req_id, "requester gone before completion");
        }
    }
    tracing::debug!(session_key, "worker stopped");
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
