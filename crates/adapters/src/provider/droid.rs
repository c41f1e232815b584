// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Droid adapter.

use std::path::Path;

use ccb_core::{extract_reply_for_req, wrap_prompt, ProviderKind};
use ccb_storage::SessionFile;

use super::{ProviderAdapter, ReplyMode};
use crate::logs::{read_droid_session_start, DroidLogReader, LogReader};

const INSTRUCTIONS: &[&str] =
    &["Reply with an execution summary, in English. Do not stay silent."];

pub struct DroidAdapter;

impl ProviderAdapter for DroidAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Droid
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
        let mut reader = DroidLogReader::new(&session.work_dir());
        let (session_id, log_path) = session.log_binding(ProviderKind::Droid);
        if let Some(path) = log_path {
            reader.set_preferred_session(&path);
        }
        if let Some(id) = session_id {
            reader.set_session_id_hint(&id);
        }
        Box::new(reader)
    }

    fn on_done(&self, session: &mut SessionFile, log_path: Option<&Path>) -> bool {
        let Some(log_path) = log_path else {
            return false;
        };
        let (_, session_id) = read_droid_session_start(log_path);
        session.update_log_binding(ProviderKind::Droid, Some(log_path), session_id.as_deref())
    }
}
