// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gemini adapter. Gemini may batch several replies into one message, each
//! closed by its own done line, so extraction takes only our segment.

use std::path::Path;

use ccb_core::{extract_reply_for_req, wrap_prompt, ProviderKind};
use ccb_storage::SessionFile;

use super::{ProviderAdapter, ReplyMode};
use crate::logs::{GeminiLogReader, LogReader};

const INSTRUCTIONS: &[&str] = &["Reply normally, in English."];

pub struct GeminiAdapter;

impl ProviderAdapter for GeminiAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn wrap_prompt(&self, message: &str, req_id: &str) -> String {
        wrap_prompt(message, req_id, INSTRUCTIONS)
    }

    fn reply_mode(&self) -> ReplyMode {
        ReplyMode::Replace
    }

    fn extract_reply(&self, text: &str, req_id: &str) -> String {
        extract_reply_for_req(text, req_id)
    }

    fn make_reader(&self, session: &SessionFile) -> Box<dyn LogReader> {
        let mut reader = GeminiLogReader::new(&session.work_dir());
        if let (_, Some(path)) = session.log_binding(ProviderKind::Gemini) {
            reader.set_preferred_session(&path);
        }
        Box::new(reader)
    }

    fn on_done(&self, session: &mut SessionFile, log_path: Option<&Path>) -> bool {
        let Some(log_path) = log_path else {
            return false;
        };
        session.update_log_binding(ProviderKind::Gemini, Some(log_path), None)
    }
}
