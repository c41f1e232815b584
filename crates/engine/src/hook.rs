// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion hook: fire-and-forget notification after a completed task.
//!
//! Spawns a user-provided script with the request metadata as arguments and
//! the reply bytes on stdin (argv length limits make stdin the safe
//! channel). Failures are swallowed; the hook can never affect the result.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;

use crate::env::env_bool;

const HOOK_TIMEOUT: Duration = Duration::from_secs(10);

fn hook_script() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("CCB_COMPLETION_HOOK") {
        let path = PathBuf::from(explicit.trim());
        return path.is_file().then_some(path);
    }
    let home = dirs_home();
    let candidates = [
        home.join(".local").join("bin").join("ccb-completion-hook"),
        PathBuf::from("/usr/local/bin/ccb-completion-hook"),
    ];
    candidates.into_iter().find(|p| p.is_file())
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
}

/// Notify the caller that a delegation task completed. Detached: the spawn
/// happens on a background task and all errors are ignored.
pub fn notify_completion(
    provider: &str,
    output_path: Option<&str>,
    reply: &str,
    req_id: &str,
    caller: &str,
    work_dir: &str,
) {
    if !env_bool("CCB_COMPLETION_HOOK_ENABLED", true) {
        return;
    }
    let Some(script) = hook_script() else {
        return;
    };

    let provider = provider.to_string();
    let output_path = output_path.map(str::to_string);
    let reply = reply.as_bytes().to_vec();
    let req_id = req_id.to_string();
    let caller = caller.to_string();
    let work_dir = work_dir.to_string();

    tokio::spawn(async move {
        let mut cmd = tokio::process::Command::new(&script);
        cmd.arg("--provider")
            .arg(&provider)
            .arg("--caller")
            .arg(&caller)
            .arg("--req-id")
            .arg(&req_id)
            .env("CCB_WORK_DIR", &work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(output) = &output_path {
            cmd.arg("--output").arg(output);
        }

        let Ok(mut child) = cmd.spawn() else {
            return;
        };
        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(&reply).await;
            drop(stdin);
        }
        let _ = tokio::time::timeout(HOOK_TIMEOUT, child.wait()).await;
    });
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
