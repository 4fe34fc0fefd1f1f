//! Terminal front-end: follows tracker events and prints per-scope progress.

mod render;

use std::collections::{HashMap, HashSet};
use std::future::Future;

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

use crate::core::{ScopeKey, SyncState, SyncTracker, TrackedJob, TrackerEvent};

pub use render::{progress_bar, status_line};

/// How the watched jobs ended.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub unwatched: usize,
    pub cancelled: usize,
    pub interrupted: bool,
}

impl Summary {
    pub fn all_succeeded(&self) -> bool {
        !self.interrupted && self.failed == 0 && self.unwatched == 0 && self.cancelled == 0
    }
}

/// Print status lines for `pending` scopes until each one settles or `interrupt`
/// resolves. A scope settles on success, failure, timeout, or cancellation.
///
/// If the event stream lags, pending scopes are re-read from `tracker`.
pub async fn follow<F>(
    tracker: &SyncTracker,
    events: &mut broadcast::Receiver<TrackerEvent>,
    pending: HashSet<ScopeKey>,
    interrupt: F,
    mut print: impl FnMut(&str),
) -> Summary
where
    F: Future<Output = ()>,
{
    let mut follower = Follower {
        pending,
        last_lines: HashMap::new(),
        summary: Summary::default(),
    };
    tokio::pin!(interrupt);

    while !follower.pending.is_empty() {
        let event = tokio::select! {
            biased;
            _ = &mut interrupt => {
                follower.summary.interrupted = true;
                break;
            }
            event = events.recv() => event,
        };

        match event {
            Ok(TrackerEvent::Updated { scope, job }) => follower.show(&scope, &job, &mut print),
            Ok(TrackerEvent::Cleared { scope, job_id }) => {
                let finished = tracker
                    .last_finished(&scope)
                    .await
                    .filter(|job| job.job_id == job_id);
                follower.cleared(&scope, &job_id, finished, &mut print);
            }
            Ok(TrackerEvent::Cancelled { scope, job_id }) => {
                follower.cleared(&scope, &job_id, None, &mut print);
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Renderer lagged behind tracker events, resyncing");
                follower.resync(tracker, &mut print).await;
            }
            Err(RecvError::Closed) => break,
        }
    }

    follower.summary
}

struct Follower {
    pending: HashSet<ScopeKey>,
    last_lines: HashMap<ScopeKey, String>,
    summary: Summary,
}

impl Follower {
    fn show(&mut self, scope: &ScopeKey, job: &TrackedJob, print: &mut impl FnMut(&str)) {
        if !self.pending.contains(scope) {
            return;
        }
        let line = status_line(scope, job);
        if self.last_lines.get(scope) != Some(&line) {
            print(&line);
            self.last_lines.insert(scope.clone(), line);
        }

        let counter = match job.state {
            SyncState::Syncing { .. } => return,
            SyncState::Succeeded { .. } => &mut self.summary.succeeded,
            SyncState::Failed { .. } => &mut self.summary.failed,
            SyncState::Unwatched { .. } => &mut self.summary.unwatched,
        };
        *counter += 1;
        self.pending.remove(scope);
    }

    /// The entry for `scope` is gone. `finished` is how it ended, if it had.
    fn cleared(
        &mut self,
        scope: &ScopeKey,
        job_id: &str,
        finished: Option<TrackedJob>,
        print: &mut impl FnMut(&str),
    ) {
        if let Some(job) = finished {
            self.show(scope, &job, &mut *print);
        } else if self.pending.remove(scope) {
            print(&format!("{}  cancelled (job {})", scope, job_id));
            self.summary.cancelled += 1;
        }
    }

    async fn resync(&mut self, tracker: &SyncTracker, print: &mut impl FnMut(&str)) {
        let scopes: Vec<ScopeKey> = self.pending.iter().cloned().collect();
        for scope in scopes {
            let current = match tracker.get(&scope).await {
                Some(job) => Some(job),
                None => tracker.last_finished(&scope).await,
            };
            match current {
                Some(job) => self.show(&scope, &job, &mut *print),
                None => {
                    print(&format!("{}  cancelled", scope));
                    self.pending.remove(&scope);
                    self.summary.cancelled += 1;
                }
            }
        }
    }
}
