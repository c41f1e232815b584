// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::time::Duration;

use ccb_core::ProviderSpec;

/// Idle shutdown window (default 60 s, per-provider override). Zero or
/// negative disables idle shutdown.
pub fn idle_timeout(spec: &ProviderSpec) -> Option<Duration> {
    let seconds = std::env::var(spec.idle_timeout_env)
        .ok()
        .and_then(|s| s.trim().parse::<f64>().ok())
        .unwrap_or(60.0);
    (seconds > 0.0).then(|| Duration::from_secs_f64(seconds))
}
