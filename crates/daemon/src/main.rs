// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CCB provider daemon (ccbd)
//!
//! One process per provider, started on demand by the CLI wrappers:
//! `ccbd codex` serves `cask.request` traffic for the current user.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use std::io::Write as _;
use std::sync::Arc;

use tracing::{error, info};

use ccb_adapters::{adapter_for, logs};
use ccb_core::{resolve_session_name, ProviderKind, DEFAULT_SESSION};
use ccb_daemon::{AskServer, ProviderHandler, ServerConfig};
use ccb_engine::{BindingMonitor, Engine, EngineDeps, MuxFactory, WorkerPool};
use ccb_storage::{log_path, run_dir, RegistryStore, RuntimeLog};

#[tokio::main]
async fn main() {
    let kind = match parse_args() {
        Ok(kind) => kind,
        Err(code) => std::process::exit(code),
    };
    std::process::exit(run(kind).await);
}

fn parse_args() -> Result<ProviderKind, i32> {
    let mut args = std::env::args().skip(1);
    let Some(arg) = args.next() else {
        eprintln!("Usage: ccbd <codex|claude|gemini|opencode|droid>");
        return Err(1);
    };
    match arg.as_str() {
        "--version" | "-V" | "-v" => {
            println!("ccbd {}", env!("CARGO_PKG_VERSION"));
            Err(0)
        }
        "--help" | "-h" | "help" => {
            println!("ccbd {}", env!("CARGO_PKG_VERSION"));
            println!("CCB provider daemon - bridges prompts into a provider's terminal pane");
            println!();
            println!("USAGE:");
            println!("    ccbd <provider>");
            println!();
            println!("PROVIDERS:");
            println!("    codex | claude | gemini | opencode | droid");
            println!();
            println!("The daemon is typically started by the CCB CLI wrappers and should");
            println!("not be invoked directly. It listens on loopback TCP; the port and");
            println!("auth token are published in the runtime state file.");
            Err(0)
        }
        other => match ProviderKind::parse(other) {
            Some(kind) => {
                if let Some(extra) = args.next() {
                    eprintln!("error: unexpected argument '{extra}'");
                    return Err(1);
                }
                Ok(kind)
            }
            None => {
                eprintln!("error: unknown provider '{other}'");
                eprintln!("Usage: ccbd <codex|claude|gemini|opencode|droid>");
                Err(1)
            }
        },
    }
}

async fn run(kind: ProviderKind) -> i32 {
    let spec = kind.spec();
    let run_dir = run_dir();

    let daemon_log = Arc::new(RuntimeLog::new(log_path(&run_dir, spec.log_file_name)));
    setup_logging(Arc::clone(&daemon_log));

    let session_name =
        resolve_session_name(None).unwrap_or_else(|_| DEFAULT_SESSION.to_string());
    info!(daemon = spec.daemon_key, session = %session_name, "starting");

    let engine = Engine::new(
        MuxFactory,
        adapter_for(kind),
        EngineDeps {
            run_dir: run_dir.clone(),
            registry: RegistryStore::open_default(),
            session_name: session_name.clone(),
        },
    );
    let pool = WorkerPool::new(engine);

    // Codex rotates rollout logs behind our back; keep bindings fresh.
    let monitor = (kind == ProviderKind::Codex).then(|| {
        let monitor = BindingMonitor::new(logs::default_sessions_root(), &session_name);
        monitor.spawn();
        monitor
    });

    let handler = Arc::new(ProviderHandler::new(
        spec.protocol_prefix,
        Arc::clone(&pool),
        monitor,
    ));

    let server = AskServer::new(ServerConfig::new(spec, run_dir));
    let exit_code = match server.serve(handler).await {
        Ok(code) => code,
        Err(err) => {
            error!(daemon = spec.daemon_key, error = %err, "failed to start");
            1
        }
    };

    pool.shutdown();
    exit_code
}

/// Route tracing into the runtime log with the truncate-to-tail cap applied
/// on every borrow of the writer.
fn setup_logging(log: Arc<RuntimeLog>) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(false).with_writer(LogWriter(log)))
        .init();
}

#[derive(Clone)]
struct LogWriter(Arc<RuntimeLog>);

struct LogHandle(Option<std::fs::File>);

impl std::io::Write for LogHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogWriter {
    type Writer = LogHandle;

    fn make_writer(&'a self) -> LogHandle {
        LogHandle(self.0.open_append().ok())
    }
}
