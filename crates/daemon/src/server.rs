// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The loopback TCP server.
//!
//! Startup: acquire the daemon singleton lock (exit 2 when another instance
//! holds it), bind a kernel-chosen port on loopback, write the state file
//! `{pid, host, connect_host, port, token, started_at}` (mode 0600).
//! Connections each get a task: read one JSON line, authenticate, dispatch,
//! write one JSON line. An idle monitor ticks every 0.5 s and shuts the
//! daemon down once no connection is active past the idle window. On
//! graceful shutdown the state file is unlinked only when its pid is ours,
//! so a successor's file is never deleted.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use ccb_core::ProviderSpec;
use ccb_storage::{
    atomic_write_json, normalize_connect_host, random_token, state_file_path, LockScope,
    ProcessLock,
};

use crate::protocol::{self, MessageKind};

const IDLE_TICK: Duration = Duration::from_millis(500);

/// Handles authenticated `<prefix>.request` messages.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, msg: Value) -> Value;
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {host}: {source}")]
    Bind {
        host: String,
        source: std::io::Error,
    },
    #[error("failed to prepare runtime dir: {0}")]
    Runtime(std::io::Error),
    #[error("failed to write state file: {0}")]
    StateFile(std::io::Error),
}

/// Server configuration; `port: 0` lets the kernel choose.
pub struct ServerConfig {
    pub spec: &'static ProviderSpec,
    pub run_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub idle_timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn new(spec: &'static ProviderSpec, run_dir: PathBuf) -> ServerConfig {
        ServerConfig {
            spec,
            run_dir,
            host: "127.0.0.1".to_string(),
            port: 0,
            idle_timeout: crate::env::idle_timeout(spec),
        }
    }
}

struct Activity {
    active: AtomicUsize,
    last: Mutex<Instant>,
}

impl Activity {
    fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    fn begin(self: &Arc<Self>) -> ActivityGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.touch();
        ActivityGuard(Arc::clone(self))
    }

    fn idle_for(&self) -> (usize, Duration) {
        (self.active.load(Ordering::SeqCst), self.last.lock().elapsed())
    }
}

struct ActivityGuard(Arc<Activity>);

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
        self.0.touch();
    }
}

/// One provider daemon's TCP front end.
pub struct AskServer {
    config: ServerConfig,
    token: String,
}

impl AskServer {
    pub fn new(config: ServerConfig) -> AskServer {
        AskServer {
            config,
            token: random_token(),
        }
    }

    /// Serve until shutdown. Returns the process exit code: 0 after a
    /// graceful run, 2 when another instance already holds the singleton
    /// lock.
    pub async fn serve<H: RequestHandler>(self, handler: Arc<H>) -> Result<i32, ServeError> {
        let spec = self.config.spec;
        std::fs::create_dir_all(&self.config.run_dir).map_err(ServeError::Runtime)?;

        let mut singleton =
            ProcessLock::new(&self.config.run_dir, spec.protocol_prefix, &LockScope::Global);
        match singleton.try_acquire() {
            Ok(true) => {}
            Ok(false) => {
                warn!(daemon = spec.daemon_key, "another instance is running");
                return Ok(2);
            }
            Err(err) => {
                error!(daemon = spec.daemon_key, error = %err, "singleton lock failed");
                return Ok(2);
            }
        }

        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServeError::Bind {
                host: self.config.host.clone(),
                source,
            })?;
        let addr = listener.local_addr().map_err(|source| ServeError::Bind {
            host: self.config.host.clone(),
            source,
        })?;

        let state_file = state_file_path(&self.config.run_dir, spec.state_file_name);
        self.write_state_file(&state_file, addr.port())
            .map_err(ServeError::StateFile)?;
        info!(
            daemon = spec.daemon_key,
            pid = std::process::id(),
            addr = %addr,
            "started"
        );

        let activity = Arc::new(Activity {
            active: AtomicUsize::new(0),
            last: Mutex::new(Instant::now()),
        });
        let shutdown = Arc::new(Notify::new());
        let mut idle_tick = tokio::time::interval(IDLE_TICK);
        idle_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            let ctx = ConnCtx {
                                prefix: spec.protocol_prefix,
                                token: self.token.clone(),
                                handler: Arc::clone(&handler),
                                activity: Arc::clone(&activity),
                                shutdown: Arc::clone(&shutdown),
                            };
                            tokio::spawn(async move {
                                if let Err(err) = handle_connection(stream, ctx).await {
                                    debug!(error = %err, "connection error");
                                }
                            });
                        }
                        Err(err) => error!(error = %err, "accept error"),
                    }
                }

                _ = shutdown.notified() => {
                    info!(daemon = spec.daemon_key, "shutdown requested");
                    break;
                }

                _ = idle_tick.tick() => {
                    if let Some(idle_timeout) = self.config.idle_timeout {
                        let (active, idle) = activity.idle_for();
                        if active == 0 && idle >= idle_timeout {
                            info!(
                                daemon = spec.daemon_key,
                                idle_s = idle_timeout.as_secs_f64(),
                                "idle timeout reached; shutting down"
                            );
                            break;
                        }
                    }
                }
            }
        }

        drop(listener);
        self.cleanup_state_file(&state_file);
        singleton.release();
        info!(daemon = spec.daemon_key, "stopped");
        Ok(0)
    }

    fn write_state_file(&self, state_file: &std::path::Path, port: u16) -> std::io::Result<()> {
        let payload = json!({
            "pid": std::process::id(),
            "host": self.config.host,
            "connect_host": normalize_connect_host(&self.config.host),
            "port": port,
            "token": self.token,
            "started_at": chrono_now(),
        });
        atomic_write_json(state_file, &payload)
    }

    /// Unlink the state file iff it still names this pid.
    fn cleanup_state_file(&self, state_file: &std::path::Path) {
        let Ok(raw) = std::fs::read_to_string(state_file) else {
            return;
        };
        let recorded_pid = serde_json::from_str::<Value>(&raw)
            .ok()
            .and_then(|v| v.get("pid").and_then(Value::as_u64));
        if recorded_pid == Some(std::process::id() as u64) {
            let _ = std::fs::remove_file(state_file);
        }
    }
}

fn chrono_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

struct ConnCtx<H> {
    prefix: &'static str,
    token: String,
    handler: Arc<H>,
    activity: Arc<Activity>,
    shutdown: Arc<Notify>,
}

async fn handle_connection<H: RequestHandler>(
    stream: TcpStream,
    ctx: ConnCtx<H>,
) -> std::io::Result<()> {
    let _guard = ctx.activity.begin();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 || line.trim().is_empty() {
        // Connections that send nothing are silently dropped.
        return Ok(());
    }

    let msg = match serde_json::from_str::<Value>(line.trim()) {
        Ok(msg) => msg,
        Err(_) => {
            let invalid = protocol::simple_response(ctx.prefix, Value::Null, 1, "Invalid request");
            return write_response(&mut write_half, &invalid).await;
        }
    };
    let id = msg.get("id").cloned().unwrap_or(Value::Null);

    let mut shutdown_after_write = false;
    let response = if !protocol::token_matches(&msg, &ctx.token) {
        protocol::simple_response(ctx.prefix, id, 1, "Unauthorized")
    } else {
        match protocol::classify(&msg, ctx.prefix) {
            MessageKind::Ping => protocol::pong(ctx.prefix, id),
            MessageKind::Shutdown => {
                // Ack first; the daemon commits to stopping only after the
                // client can read the response.
                shutdown_after_write = true;
                protocol::simple_response(ctx.prefix, id, 0, "OK")
            }
            MessageKind::Request => ctx.handler.handle(msg).await,
            MessageKind::Unknown => {
                protocol::simple_response(ctx.prefix, id, 1, "Invalid request")
            }
        }
    };

    write_response(&mut write_half, &response).await?;
    ctx.activity.touch();
    if shutdown_after_write {
        ctx.shutdown.notify_one();
    }
    Ok(())
}

async fn write_response(
    write_half: &mut tokio::net::tcp::OwnedWriteHalf,
    response: &Value,
) -> std::io::Result<()> {
    let mut payload = serde_json::to_string(response).unwrap_or_default();
    payload.push('\n');
    write_half.write_all(payload.as_bytes()).await?;
    write_half.flush().await
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
