// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider adapters.
//!
//! One adapter per provider bundles what the request engine needs: prompt
//! wrapping, a log reader over the provider's session log, reply
//! accumulation/extraction, optional cross-process locking, and the
//! post-completion binding write-back. The engine holds the adapter as a
//! trait object and never looks inside provider state.

mod claude;
mod codex;
mod droid;
mod gemini;
mod opencode;

pub use claude::ClaudeAdapter;
pub use codex::CodexAdapter;
pub use droid::DroidAdapter;
pub use gemini::GeminiAdapter;
pub use opencode::OpenCodeAdapter;

use std::path::Path;
use std::sync::Arc;

use ccb_core::{strip_done_text, ProviderKind, ProviderSpec};
use ccb_storage::{LockScope, SessionFile};

use crate::logs::LogReader;

/// How assistant events build up the reply buffer.
///
/// Append-mode providers stream deltas; replace-mode providers re-emit the
/// whole message each time it grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyMode {
    Append,
    Replace,
}

pub trait ProviderAdapter: Send + Sync + 'static {
    fn kind(&self) -> ProviderKind;

    fn spec(&self) -> &'static ProviderSpec {
        self.kind().spec()
    }

    /// Wrap a user message with the correlation preamble and done marker.
    fn wrap_prompt(&self, message: &str, req_id: &str) -> String;

    fn reply_mode(&self) -> ReplyMode;

    /// Final reply text from the collected buffer.
    fn extract_reply(&self, text: &str, req_id: &str) -> String {
        strip_done_text(text, req_id)
    }

    /// Build a reader bound to this session's recorded log binding.
    fn make_reader(&self, session: &SessionFile) -> Box<dyn LogReader>;

    /// Cross-process lock held for the whole request, if any.
    fn request_lock_scope(&self, _session_key: &str) -> Option<LockScope> {
        None
    }

    /// Whether `timeout_s == 0` means inject-and-return.
    fn fire_and_forget(&self) -> bool {
        false
    }

    /// Pane-text substring that marks a user interrupt, when the provider
    /// exposes one (checked against visible pane text after our req id).
    fn pane_interrupt_marker(&self) -> Option<&'static str> {
        None
    }

    /// Record the observed log binding after a completed request. Returns
    /// true when the session file changed and should be written back.
    fn on_done(&self, _session: &mut SessionFile, _log_path: Option<&Path>) -> bool {
        false
    }
}

/// Adapter for a provider kind.
pub fn adapter_for(kind: ProviderKind) -> Arc<dyn ProviderAdapter> {
    match kind {
        ProviderKind::Codex => Arc::new(CodexAdapter),
        ProviderKind::Claude => Arc::new(ClaudeAdapter),
        ProviderKind::Gemini => Arc::new(GeminiAdapter),
        ProviderKind::OpenCode => Arc::new(OpenCodeAdapter),
        ProviderKind::Droid => Arc::new(DroidAdapter),
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
