// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: idle shutdown, singleton lock, state file ownership.

use crate::prelude::*;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

use ccb_adapters::{adapter_for, FakeBackend};
use ccb_core::ProviderKind;
use ccb_daemon::{AskServer, ProviderHandler, ServerConfig};
use ccb_engine::{Engine, EngineDeps, WorkerPool};
use ccb_storage::{LockScope, ProcessLock, RegistryStore};

fn short_idle_server(
    run_dir: &std::path::Path,
    backend: FakeBackend,
    idle: Duration,
) -> (AskServer, Arc<ProviderHandler<FakeFactory>>) {
    let engine = Engine::new(
        FakeFactory(backend),
        adapter_for(ProviderKind::Codex),
        EngineDeps {
            run_dir: run_dir.to_path_buf(),
            registry: RegistryStore::new(run_dir.join("registry")),
            session_name: "default".to_string(),
        },
    );
    let pool = WorkerPool::new(engine);
    let handler = Arc::new(ProviderHandler::new("cask", pool, None));
    let server = AskServer::new(ServerConfig {
        spec: ProviderKind::Codex.spec(),
        run_dir: run_dir.to_path_buf(),
        host: "127.0.0.1".to_string(),
        port: 0,
        idle_timeout: Some(idle),
    });
    (server, handler)
}

#[tokio::test]
#[serial(codex_root)]
async fn idle_daemon_shuts_down_and_cleans_up() {
    let tmp = tempfile::tempdir().unwrap();
    let run_dir = tmp.path().join("run");
    let (server, handler) = short_idle_server(&run_dir, FakeBackend::new(), Duration::from_secs(1));
    let serve = tokio::spawn(server.serve(handler));

    let state_file = ccb_storage::state_file_path(&run_dir, "caskd.json");
    for _ in 0..100 {
        if state_file.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(state_file.exists());

    // No connections: past the idle window the daemon exits, removes its
    // state file, and releases the singleton lock.
    let exit = tokio::time::timeout(Duration::from_secs(5), serve)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(exit, 0);
    assert!(!state_file.exists());

    let mut lock = ProcessLock::new(&run_dir, "cask", &LockScope::Global);
    assert!(lock.try_acquire().unwrap());
}

#[tokio::test]
#[serial(codex_root)]
async fn singleton_lock_rejects_second_daemon() {
    let tmp = tempfile::tempdir().unwrap();
    let run_dir = tmp.path().join("run");

    let (first, handler1) =
        short_idle_server(&run_dir, FakeBackend::new(), Duration::from_secs(60));
    let serve = tokio::spawn(first.serve(handler1));

    let state_file = ccb_storage::state_file_path(&run_dir, "caskd.json");
    for _ in 0..100 {
        if state_file.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let (second, handler2) =
        short_idle_server(&run_dir, FakeBackend::new(), Duration::from_secs(60));
    let exit = second.serve(handler2).await.unwrap();
    assert_eq!(exit, 2);

    ccb_daemon::client::shutdown("cask", &state_file, Duration::from_secs(2)).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), serve).await;
}

#[tokio::test]
#[serial(codex_root)]
async fn shutdown_message_stops_the_daemon() {
    let mut fx = DaemonFixture::start().await;
    assert!(ccb_daemon::client::ping("cask", &fx.state_file, Duration::from_secs(2)).await);
    fx.shutdown().await;
    assert!(!fx.state_file.exists());
}
