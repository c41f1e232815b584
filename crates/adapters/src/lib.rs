// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ccb-adapters: everything that touches an external process or log format.
//!
//! Terminal backends drive tmux/WezTerm panes; log readers tail each
//! provider's on-disk session log; provider adapters bundle the pieces the
//! request engine needs per provider.

mod env;
pub mod logs;
pub mod provider;
pub mod terminal;

pub use logs::{LogEvent, LogReader, Role};
pub use provider::{
    adapter_for, ClaudeAdapter, CodexAdapter, DroidAdapter, GeminiAdapter, OpenCodeAdapter,
    ProviderAdapter, ReplyMode,
};
pub use terminal::{
    backend_for_terminal, detect_terminal, MuxBackend, TerminalBackend, TerminalError,
    TmuxBackend, WeztermBackend,
};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub use terminal::{FakeBackend, FakePane, TerminalCall};
