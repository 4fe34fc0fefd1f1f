//! Text rendering of tracked jobs.

use crate::core::{ScopeKey, SyncState, TrackedJob};

const BAR_WIDTH: usize = 20;

pub fn progress_bar(percent: u8) -> String {
    let filled = (usize::from(percent.min(100)) * BAR_WIDTH) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

/// One status line for a scope, e.g.
/// `connection/conn-1  [###########---------]  55%  Processed 11 of 20 files (55%)`.
pub fn status_line(scope: &ScopeKey, job: &TrackedJob) -> String {
    match &job.state {
        SyncState::Syncing { progress, message } => format!(
            "{}  {}  {:>3}%  {}",
            scope,
            progress_bar(*progress),
            progress,
            message
        ),
        SyncState::Succeeded { message } => format!("{}  done    {}", scope, message),
        SyncState::Failed { error } => format!("{}  FAILED  {}", scope, error),
        SyncState::Unwatched { progress } => format!(
            "{}  stopped watching at {}% (job {} may still be running)",
            scope, progress, job.job_id
        ),
    }
}
