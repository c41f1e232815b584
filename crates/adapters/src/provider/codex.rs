// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codex adapter.
//!
//! Interrupt detection: when `CCB_CASKD_INTERRUPT_DETECT` is enabled (the
//! default), the engine scans the pane's visible text for the substring
//! `■ Conversation interrupted` positioned after our req id and fails the
//! task. This is a pane-text heuristic rather than a log signal; the flag
//! exists so it can be turned off if a Codex build changes the string.

use std::path::Path;

use ccb_core::{wrap_prompt, ProviderKind};
use ccb_storage::SessionFile;

use super::{ProviderAdapter, ReplyMode};
use crate::env;
use crate::logs::{find_uuid, read_session_meta, CodexLogReader, LogReader};

/// Visible pane text marking a user interrupt.
pub const INTERRUPT_MARKER: &str = "■ Conversation interrupted";

const INSTRUCTIONS: &[&str] = &["Reply normally, in English."];

pub struct CodexAdapter;

impl ProviderAdapter for CodexAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Codex
    }

    fn wrap_prompt(&self, message: &str, req_id: &str) -> String {
        wrap_prompt(message, req_id, INSTRUCTIONS)
    }

    fn reply_mode(&self) -> ReplyMode {
        ReplyMode::Append
    }

    fn make_reader(&self, session: &SessionFile) -> Box<dyn LogReader> {
        let (session_id, log_path) = session.log_binding(ProviderKind::Codex);
        Box::new(CodexLogReader::new(
            &session.work_dir(),
            log_path,
            session_id,
        ))
    }

    fn pane_interrupt_marker(&self) -> Option<&'static str> {
        env::codex_interrupt_detect().then_some(INTERRUPT_MARKER)
    }

    fn on_done(&self, session: &mut SessionFile, log_path: Option<&Path>) -> bool {
        let Some(log_path) = log_path else {
            return false;
        };
        // The rollout's own session_meta is authoritative; the filename
        // uuid is the fallback.
        let session_id = read_session_meta(log_path)
            .1
            .or_else(|| find_uuid(&log_path.to_string_lossy()));
        session.update_log_binding(ProviderKind::Codex, Some(log_path), session_id.as_deref())
    }
}
