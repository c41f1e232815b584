// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ccb-storage: on-disk state for the CCB bridge.
//!
//! Session files, registry records, cross-process locks, and the per-user
//! runtime directory. Every JSON write goes through the shared atomic-write
//! primitive; readers tolerate concurrent replacement.

pub mod atomic;
pub mod lock;
pub mod registry;
pub mod runtime;
pub mod session;

pub use atomic::{atomic_write_json, atomic_write_text};
pub use lock::{LockError, LockScope, ProcessLock};
pub use registry::{
    registry_dir, registry_path_for_session, PaneBinding, RegistryRecord, RegistryStore,
    RegistryUpsert,
};
pub use runtime::{
    log_path, normalize_connect_host, random_token, run_dir, state_file_path, RuntimeLog,
};
pub use session::{load_project_session, SessionFile, SessionStoreError};
