// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the engine crate.

use std::time::Duration;

use ccb_core::ProviderSpec;

pub(crate) fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

pub(crate) fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

pub(crate) fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "" => default,
            "0" | "false" | "no" | "off" => false,
            _ => true,
        },
        Err(_) => default,
    }
}

/// Pane liveness poll interval. Windows uses a slower default to limit CLI
/// churn and window flicker.
pub fn pane_check_interval(spec: &ProviderSpec) -> Duration {
    let default = if cfg!(windows) { 5.0 } else { 2.0 };
    Duration::from_secs_f64(env_f64(spec.pane_check_env).filter(|v| *v > 0.0).unwrap_or(default))
}

/// Tail window when rebinding to a newer log (default 2 MiB).
pub fn rebind_tail_bytes(spec: &ProviderSpec) -> u64 {
    env_u64(spec.rebind_tail_env).unwrap_or(2 * 1024 * 1024)
}

/// Cross-project registry hits require an explicit opt-in.
pub fn cross_project_allowed() -> bool {
    env_bool("CCB_ALLOW_CROSS_PROJECT_SESSION", false)
}

/// Codex binding refresher base interval (seconds, default 60).
pub fn bind_refresh_interval() -> Duration {
    Duration::from_secs_f64(
        env_f64("CCB_CASKD_BIND_REFRESH_INTERVAL")
            .filter(|v| *v > 0.0)
            .unwrap_or(60.0),
    )
}
