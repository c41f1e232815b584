// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! ccb-core: protocol, routing ids, and shared types for the CCB bridge

pub mod project;
pub mod protocol;
pub mod provider;
pub mod request;
pub mod scope;

pub use project::{compute_project_id, find_config_root, normalize_work_dir};
pub use protocol::{
    extract_reply_for_req, is_done_text, make_req_id, strip_done_text, strip_trailing_markers,
    wrap_prompt, DONE_PREFIX, REQ_ID_PREFIX,
};
pub use provider::{ProviderKind, ProviderSpec};
pub use request::{ProviderRequest, ProviderResult};
pub use scope::{
    find_project_session_file, normalize_session_name, project_session_dir, resolve_session_name,
    ScopeError, DEFAULT_SESSION, PROJECT_CONFIG_DIRNAME, SESSION_ENV_VAR,
};
