// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request handler: parse, submit to the worker pool, wait for completion.
//!
//! The server waits `timeout_s + 5 s` for the worker's completion signal so
//! a worker can record a clean timeout (exit 2) before the server gives up;
//! when the wait itself elapses the client still gets exit 2 with an empty
//! reply.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use ccb_engine::{BackendFactory, BindingMonitor, WorkerPool};

use crate::protocol;
use crate::server::RequestHandler;

/// Extra slack past the request deadline before the server gives up on the
/// worker's completion signal.
const COMPLETION_SLACK: Duration = Duration::from_secs(5);

pub struct ProviderHandler<F: BackendFactory> {
    prefix: &'static str,
    pool: Arc<WorkerPool<F>>,
    monitor: Option<Arc<BindingMonitor>>,
}

impl<F: BackendFactory> ProviderHandler<F> {
    pub fn new(
        prefix: &'static str,
        pool: Arc<WorkerPool<F>>,
        monitor: Option<Arc<BindingMonitor>>,
    ) -> ProviderHandler<F> {
        ProviderHandler {
            prefix,
            pool,
            monitor,
        }
    }
}

#[async_trait]
impl<F: BackendFactory> RequestHandler for ProviderHandler<F> {
    async fn handle(&self, msg: Value) -> Value {
        let id = msg.get("id").cloned().unwrap_or(Value::Null);
        let request = match protocol::request_from_value(&msg) {
            Ok(request) => request,
            Err(err) => {
                return protocol::simple_response(self.prefix, id, 1, &format!("Bad request: {err}"))
            }
        };
        tracing::info!(
            client_id = %request.client_id,
            work_dir = %request.work_dir,
            timeout_s = request.timeout_s,
            msg_len = request.message.len(),
            "recv"
        );

        if let Some(monitor) = &self.monitor {
            monitor.track(Path::new(&request.work_dir));
        }

        let timeout_s = request.timeout_s;
        let outcome = self.pool.submit(request).await;

        let result = if timeout_s < 0.0 {
            outcome.done.await.ok()
        } else {
            let wait = Duration::from_secs_f64(timeout_s) + COMPLETION_SLACK;
            match tokio::time::timeout(wait, outcome.done).await {
                Ok(done) => done.ok(),
                Err(_) => None,
            }
        };

        match result {
            Some(result) => protocol::result_response(self.prefix, id, &result),
            // The worker did not signal in time; report a timeout.
            None => protocol::simple_response(self.prefix, id, 2, ""),
        }
    }
}
