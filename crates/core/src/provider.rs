// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider identities and their daemon wiring.
//!
//! The wire prefix (`cask`, `lask`, …) is the only provider-specific part of
//! the daemon protocol; everything else here is naming for state files,
//! locks, and environment overrides.

use serde::{Deserialize, Serialize};

/// The external assistant CLIs a pane can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Codex,
    Claude,
    Gemini,
    #[serde(rename = "opencode")]
    OpenCode,
    Droid,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Codex,
        ProviderKind::Claude,
        ProviderKind::Gemini,
        ProviderKind::OpenCode,
        ProviderKind::Droid,
    ];

    /// Lower-case provider key used in session keys and registry records.
    pub fn key(self) -> &'static str {
        match self {
            ProviderKind::Codex => "codex",
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenCode => "opencode",
            ProviderKind::Droid => "droid",
        }
    }

    pub fn parse(raw: &str) -> Option<ProviderKind> {
        let key = raw.trim().to_ascii_lowercase();
        ProviderKind::ALL.into_iter().find(|k| k.key() == key)
    }

    pub fn spec(self) -> &'static ProviderSpec {
        match self {
            ProviderKind::Codex => &CASKD_SPEC,
            ProviderKind::Claude => &LASKD_SPEC,
            ProviderKind::Gemini => &GASKD_SPEC,
            ProviderKind::OpenCode => &OASKD_SPEC,
            ProviderKind::Droid => &DASKD_SPEC,
        }
    }

    /// Routing/serialization key: `<provider>:<project_id>`.
    pub fn session_key(self, project_id: &str) -> String {
        if project_id.is_empty() {
            format!("{}:unknown", self.key())
        } else {
            format!("{}:{}", self.key(), project_id)
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Static daemon wiring for one provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderSpec {
    pub kind: ProviderKind,
    /// Daemon name, e.g. `caskd`. Used for the singleton lock and log lines.
    pub daemon_key: &'static str,
    /// Wire type prefix, e.g. `cask` in `cask.request`.
    pub protocol_prefix: &'static str,
    /// State file under the runtime dir, e.g. `caskd.json`.
    pub state_file_name: &'static str,
    /// Daemon log under the runtime dir, e.g. `caskd.log`.
    pub log_file_name: &'static str,
    /// Per-project session file name, e.g. `.codex-session`.
    pub session_file_name: &'static str,
    /// Idle shutdown override (seconds).
    pub idle_timeout_env: &'static str,
    /// Pane liveness poll interval override (seconds).
    pub pane_check_env: &'static str,
    /// Tail window override for log rebinding (bytes).
    pub rebind_tail_env: &'static str,
}

pub static CASKD_SPEC: ProviderSpec = ProviderSpec {
    kind: ProviderKind::Codex,
    daemon_key: "caskd",
    protocol_prefix: "cask",
    state_file_name: "caskd.json",
    log_file_name: "caskd.log",
    session_file_name: ".codex-session",
    idle_timeout_env: "CCB_CASKD_IDLE_TIMEOUT_S",
    pane_check_env: "CCB_CASKD_PANE_CHECK_INTERVAL",
    rebind_tail_env: "CCB_CASKD_REBIND_TAIL_BYTES",
};

pub static LASKD_SPEC: ProviderSpec = ProviderSpec {
    kind: ProviderKind::Claude,
    daemon_key: "laskd",
    protocol_prefix: "lask",
    state_file_name: "laskd.json",
    log_file_name: "laskd.log",
    session_file_name: ".claude-session",
    idle_timeout_env: "CCB_LASKD_IDLE_TIMEOUT_S",
    pane_check_env: "CCB_LASKD_PANE_CHECK_INTERVAL",
    rebind_tail_env: "CCB_LASKD_REBIND_TAIL_BYTES",
};

pub static GASKD_SPEC: ProviderSpec = ProviderSpec {
    kind: ProviderKind::Gemini,
    daemon_key: "gaskd",
    protocol_prefix: "gask",
    state_file_name: "gaskd.json",
    log_file_name: "gaskd.log",
    session_file_name: ".gemini-session",
    idle_timeout_env: "CCB_GASKD_IDLE_TIMEOUT_S",
    pane_check_env: "CCB_GASKD_PANE_CHECK_INTERVAL",
    rebind_tail_env: "CCB_GASKD_REBIND_TAIL_BYTES",
};

pub static OASKD_SPEC: ProviderSpec = ProviderSpec {
    kind: ProviderKind::OpenCode,
    daemon_key: "oaskd",
    protocol_prefix: "oask",
    state_file_name: "oaskd.json",
    log_file_name: "oaskd.log",
    session_file_name: ".opencode-session",
    idle_timeout_env: "CCB_OASKD_IDLE_TIMEOUT_S",
    pane_check_env: "CCB_OASKD_PANE_CHECK_INTERVAL",
    rebind_tail_env: "CCB_OASKD_REBIND_TAIL_BYTES",
};

pub static DASKD_SPEC: ProviderSpec = ProviderSpec {
    kind: ProviderKind::Droid,
    daemon_key: "daskd",
    protocol_prefix: "dask",
    state_file_name: "daskd.json",
    log_file_name: "daskd.log",
    session_file_name: ".droid-session",
    idle_timeout_env: "CCB_DASKD_IDLE_TIMEOUT_S",
    pane_check_env: "CCB_DASKD_PANE_CHECK_INTERVAL",
    rebind_tail_env: "CCB_DASKD_REBIND_TAIL_BYTES",
};

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
