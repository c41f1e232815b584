// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine wiring: the backend factory and the per-daemon dependency bundle.
//!
//! Everything a worker needs is an explicit value constructed at daemon
//! startup; workers hold only the session key and resolve session state
//! lazily on each task.

use std::path::PathBuf;
use std::sync::Arc;

use ccb_adapters::{backend_for_terminal, MuxBackend, ProviderAdapter, TerminalBackend};
use ccb_storage::RegistryStore;

/// Chooses a backend per session (session files record their terminal).
pub trait BackendFactory: Send + Sync + 'static {
    type Backend: TerminalBackend;

    fn backend_for(&self, terminal: &str) -> Option<Self::Backend>;
}

/// Production factory over tmux/WezTerm.
#[derive(Debug, Clone, Default)]
pub struct MuxFactory;

impl BackendFactory for MuxFactory {
    type Backend = MuxBackend;

    fn backend_for(&self, terminal: &str) -> Option<MuxBackend> {
        backend_for_terminal(terminal)
    }
}

/// Dependencies shared by all workers of one daemon.
pub struct EngineDeps {
    /// Runtime directory (locks, crash logs).
    pub run_dir: PathBuf,
    /// Registry for routing fallbacks and binding publication.
    pub registry: RegistryStore,
    /// Active session name for session-file lookup.
    pub session_name: String,
}

/// One provider's request engine.
pub struct Engine<F: BackendFactory> {
    pub(crate) factory: F,
    pub(crate) adapter: Arc<dyn ProviderAdapter>,
    pub(crate) deps: EngineDeps,
}

impl<F: BackendFactory> Engine<F> {
    pub fn new(factory: F, adapter: Arc<dyn ProviderAdapter>, deps: EngineDeps) -> Engine<F> {
        Engine {
            factory,
            adapter,
            deps,
        }
    }

    pub fn adapter(&self) -> &Arc<dyn ProviderAdapter> {
        &self.adapter
    }
}
