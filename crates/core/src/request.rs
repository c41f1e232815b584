// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-flight request and result shapes shared by the daemon and engine.

use serde::{Deserialize, Serialize};

/// One delegated prompt, as accepted off the wire.
///
/// `timeout_s < 0` means no deadline; `timeout_s == 0` is fire-and-forget
/// (honored by OpenCode only). `caller` is an opaque label carried verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    pub client_id: String,
    pub work_dir: String,
    pub timeout_s: f64,
    pub quiet: bool,
    pub message: String,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub req_id: Option<String>,
    pub caller: String,
    #[serde(default)]
    pub no_wrap: bool,
}

impl ProviderRequest {
    pub fn new(work_dir: impl Into<String>, message: impl Into<String>, timeout_s: f64) -> Self {
        Self {
            client_id: String::new(),
            work_dir: work_dir.into(),
            timeout_s,
            quiet: false,
            message: message.into(),
            output_path: None,
            req_id: None,
            caller: "claude".to_string(),
            no_wrap: false,
        }
    }
}

/// Outcome of one delegated prompt.
///
/// Exit codes: 0 = done marker observed, 1 = hard failure (missing session,
/// dead pane, cancellation, internal error), 2 = deadline elapsed with a
/// partial reply. All `_ms` values are wall-clock deltas from task start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub exit_code: i32,
    pub reply: String,
    pub req_id: String,
    pub session_key: String,
    pub done_seen: bool,
    #[serde(default)]
    pub done_ms: Option<u64>,
    #[serde(default)]
    pub anchor_seen: bool,
    #[serde(default)]
    pub anchor_ms: Option<u64>,
    #[serde(default)]
    pub fallback_scan: bool,
    #[serde(default)]
    pub log_path: Option<String>,
}

impl ProviderResult {
    /// A hard failure (exit 1) with a human-readable message.
    pub fn failure(req_id: &str, session_key: &str, reply: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            reply: reply.into(),
            req_id: req_id.to_string(),
            session_key: session_key.to_string(),
            done_seen: false,
            done_ms: None,
            anchor_seen: false,
            anchor_ms: None,
            fallback_scan: false,
            log_path: None,
        }
    }
}
