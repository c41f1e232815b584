// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Claude adapter. Claude logs re-emit the whole assistant message as it
//! grows, so replies replace rather than append.

use std::path::Path;

use ccb_core::{wrap_prompt, ProviderKind};
use ccb_storage::SessionFile;

use super::{ProviderAdapter, ReplyMode};
use crate::logs::{ClaudeLogReader, LogReader};

const INSTRUCTIONS: &[&str] = &["Reply normally, in English."];

pub struct ClaudeAdapter;

impl ProviderAdapter for ClaudeAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    fn wrap_prompt(&self, message: &str, req_id: &str) -> String {
        wrap_prompt(message, req_id, INSTRUCTIONS)
    }

    fn reply_mode(&self) -> ReplyMode {
        ReplyMode::Replace
    }

    fn make_reader(&self, session: &SessionFile) -> Box<dyn LogReader> {
        let mut reader = ClaudeLogReader::new(&session.work_dir());
        if let (_, Some(path)) = session.log_binding(ProviderKind::Claude) {
            reader.set_preferred_session(&path);
        }
        Box::new(reader)
    }

    fn on_done(&self, session: &mut SessionFile, log_path: Option<&Path>) -> bool {
        let Some(log_path) = log_path else {
            return false;
        };
        // Session id is the log's file stem.
        let session_id = log_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned());
        session.update_log_binding(ProviderKind::Claude, Some(log_path), session_id.as_deref())
    }
}
