// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background binding refresher (Codex).
//!
//! Codex rotates its rollout log without telling anyone; this monitor walks
//! each tracked session and re-discovers the current log binding. Priority:
//! the session id parsed out of `start_cmd` (bind to its newest log), then a
//! bounded scan for the newest log whose recorded cwd lies within the
//! project. Refresh backs off exponentially while nothing changes (base
//! 60 s, cap 600 s); a session-file mtime change forces an immediate pass.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

use ccb_adapters::logs::{
    codex_scan_limit, find_latest_log_for_session_id, find_uuid, scan_latest_log_for_work_dir,
};
use ccb_core::{find_project_session_file, ProviderKind, DEFAULT_SESSION};
use ccb_storage::SessionFile;

const CHECK_INTERVAL: Duration = Duration::from_secs(10);
const BACKOFF_CAP: Duration = Duration::from_secs(600);

#[derive(Debug)]
struct Entry {
    session_file: Option<PathBuf>,
    file_mtime: Option<SystemTime>,
    next_refresh: Instant,
    backoff: Duration,
}

/// Tracks Codex sessions and refreshes their log bindings in the background.
pub struct BindingMonitor {
    session_root: PathBuf,
    session_name: String,
    entries: Mutex<HashMap<PathBuf, Entry>>,
}

impl BindingMonitor {
    pub fn new(session_root: PathBuf, session_name: &str) -> Arc<BindingMonitor> {
        Arc::new(BindingMonitor {
            session_root,
            session_name: if session_name.is_empty() {
                DEFAULT_SESSION.to_string()
            } else {
                session_name.to_string()
            },
            entries: Mutex::new(HashMap::new()),
        })
    }

    /// Start watching a work dir (called on each request; idempotent).
    pub fn track(&self, work_dir: &Path) {
        let mut entries = self.entries.lock();
        entries.entry(work_dir.to_path_buf()).or_insert(Entry {
            session_file: None,
            file_mtime: None,
            next_refresh: Instant::now(),
            backoff: crate::env::bind_refresh_interval(),
        });
    }

    /// Spawn the periodic refresh loop.
    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CHECK_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                monitor.check_all();
            }
        })
    }

    /// One pass over every tracked session. Errors never propagate; the
    /// monitor must not take the daemon down.
    pub fn check_all(&self) {
        let work_dirs: Vec<PathBuf> = self.entries.lock().keys().cloned().collect();
        for work_dir in work_dirs {
            self.check_one(&work_dir);
        }
    }

    fn check_one(&self, work_dir: &Path) {
        let session_file = find_project_session_file(
            work_dir,
            &self.session_name,
            ProviderKind::Codex.spec().session_file_name,
            false,
        );
        let Some(session_file) = session_file else {
            // Session unmounted; stop tracking it.
            self.entries.lock().remove(work_dir);
            return;
        };
        let current_mtime = std::fs::metadata(&session_file).and_then(|m| m.modified()).ok();

        let (due, file_changed, base_backoff) = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(work_dir) else {
                return;
            };
            let file_changed = entry.session_file.as_deref() != Some(session_file.as_path())
                || entry.file_mtime != current_mtime;
            entry.session_file = Some(session_file.clone());
            entry.file_mtime = current_mtime;
            (Instant::now() >= entry.next_refresh, file_changed, entry.backoff)
        };
        if !due && !file_changed {
            return;
        }

        let mut session = SessionFile::read(&session_file);
        if session.data.is_empty() {
            return;
        }
        let updated = self.refresh_binding(&mut session, file_changed);
        if updated {
            if let Err(err) = session.write_back() {
                tracing::warn!(work_dir = %work_dir.display(), error = %err, "binding write-back failed");
            } else {
                tracing::info!(work_dir = %work_dir.display(), "codex log binding refreshed");
            }
        }

        let base = crate::env::bind_refresh_interval();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(work_dir) {
            entry.backoff = if updated {
                base
            } else {
                BACKOFF_CAP.min(base.max(base_backoff * 2))
            };
            entry.next_refresh = Instant::now() + entry.backoff;
            // The write-back above bumped the mtime; don't treat our own
            // write as an external change next pass.
            entry.file_mtime = std::fs::metadata(&session_file)
                .and_then(|m| m.modified())
                .ok();
        }
    }

    /// Re-discover the current log for one session. Returns true when the
    /// binding changed.
    fn refresh_binding(&self, session: &mut SessionFile, force_scan: bool) -> bool {
        let (_, current_log) = session.log_binding(ProviderKind::Codex);

        let intended_sid = find_uuid(&session.start_cmd(ProviderKind::Codex));
        let mut intended_log = None;
        if let Some(sid) = &intended_sid {
            intended_log = find_latest_log_for_session_id(&self.session_root, sid);
            if let Some(log) = intended_log.clone().filter(|l| l.exists()) {
                let (bound_sid, _) = session.log_binding(ProviderKind::Codex);
                if should_overwrite(current_log.as_deref(), &log)
                    || bound_sid.as_deref() != Some(sid.as_str())
                {
                    return session.update_log_binding(
                        ProviderKind::Codex,
                        Some(&log),
                        Some(sid),
                    );
                }
                return false;
            }
        }

        let need_scan = force_scan || intended_sid.is_none() || intended_log.is_none();
        if !need_scan {
            return false;
        }

        let Some((candidate, candidate_sid)) = scan_latest_log_for_work_dir(
            &self.session_root,
            &session.work_dir(),
            codex_scan_limit(),
        ) else {
            return false;
        };
        let (bound_sid, _) = session.log_binding(ProviderKind::Codex);
        if should_overwrite(current_log.as_deref(), &candidate)
            || (candidate_sid.is_some() && candidate_sid != bound_sid)
        {
            return session.update_log_binding(
                ProviderKind::Codex,
                Some(&candidate),
                candidate_sid.as_deref(),
            );
        }
        false
    }
}

/// Overwrite when there is no current binding, it vanished, or the
/// candidate is newer.
fn should_overwrite(current: Option<&Path>, candidate: &Path) -> bool {
    let Some(current) = current else {
        return true;
    };
    if !current.exists() {
        return true;
    }
    let mtime = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (mtime(candidate), mtime(current)) {
        (Some(new), Some(old)) => new > old,
        _ => true,
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
