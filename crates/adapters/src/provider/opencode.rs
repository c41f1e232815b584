// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OpenCode adapter.
//!
//! OpenCode panes are co-tenanted with direct-mode clients, so every request
//! holds the per-session cross-process lock. `timeout_s == 0` is honored as
//! fire-and-forget: inject (still serialized by the lock) and return without
//! waiting for storage to catch up.

use std::path::Path;

use ccb_core::{wrap_prompt, ProviderKind};
use ccb_storage::{LockScope, SessionFile};

use super::{ProviderAdapter, ReplyMode};
use crate::logs::{LogReader, OpenCodeLogReader};

const INSTRUCTIONS: &[&str] = &["Reply normally, in English."];

pub struct OpenCodeAdapter;

impl ProviderAdapter for OpenCodeAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenCode
    }

    fn wrap_prompt(&self, message: &str, req_id: &str) -> String {
        wrap_prompt(message, req_id, INSTRUCTIONS)
    }

    fn reply_mode(&self) -> ReplyMode {
        ReplyMode::Append
    }

    fn make_reader(&self, session: &SessionFile) -> Box<dyn LogReader> {
        let (session_id, _) = session.log_binding(ProviderKind::OpenCode);
        Box::new(OpenCodeLogReader::new(session_id))
    }

    fn request_lock_scope(&self, session_key: &str) -> Option<LockScope> {
        Some(LockScope::Session(session_key.to_string()))
    }

    fn fire_and_forget(&self) -> bool {
        true
    }

    fn on_done(&self, session: &mut SessionFile, log_path: Option<&Path>) -> bool {
        // The "log path" is the session's message directory; its name is the
        // storage session id.
        let Some(log_path) = log_path else {
            return false;
        };
        let session_id = log_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned());
        session.update_log_binding(ProviderKind::OpenCode, Some(log_path), session_id.as_deref())
    }
}
