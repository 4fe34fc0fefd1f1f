//! In-memory sync state, keyed by scope.
//!
//! Holds the one job displayed for each scope key. Only poll loops write to it;
//! renderers read snapshots or subscribe to change events.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, broadcast};

use super::models::{
    ScopeKey, SyncState, TrackedJob, failure_message, progress_message, success_message,
};
use crate::api::{JobSnapshot, JobStatus};

const EVENT_CAPACITY: usize = 256;

/// Change notifications for renderers.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerEvent {
    Updated { scope: ScopeKey, job: TrackedJob },
    Cleared { scope: ScopeKey, job_id: String },
    /// A user cancel succeeded; lists showing the scope should refresh.
    Cancelled { scope: ScopeKey, job_id: String },
}

/// Thread-safe store of the job displayed per scope.
///
/// Cloning is cheap; all clones share the same map and event channel.
#[derive(Clone)]
pub struct SyncTracker {
    inner: Arc<RwLock<HashMap<ScopeKey, TrackedJob>>>,
    /// Last entry cleared while finished, per scope. Lets a lagging renderer
    /// learn how a job ended after its entry is gone.
    finished: Arc<RwLock<HashMap<ScopeKey, TrackedJob>>>,
    events: broadcast::Sender<TrackerEvent>,
}

impl Default for SyncTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncTracker {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            finished: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Start displaying `job_id` for `scope`, resetting the observation sequence.
    ///
    /// Re-attaching the job that is already displayed keeps the existing entry
    /// (and its progress) instead of creating a new one, and returns `false`.
    pub async fn begin(
        &self,
        scope: &ScopeKey,
        job_id: &str,
        initial: Option<&JobSnapshot>,
    ) -> bool {
        let job = {
            let mut map = self.inner.write().await;
            if let Some(existing) = map.get_mut(scope) {
                if existing.job_id == job_id && !existing.state.is_terminal() {
                    existing.seq = 0;
                    if let SyncState::Unwatched { progress } = existing.state {
                        existing.state = SyncState::Syncing {
                            progress,
                            message: format!("Syncing... {}%", progress),
                        };
                        existing.updated_at = Utc::now();
                        let job = existing.clone();
                        drop(map);
                        self.emit(TrackerEvent::Updated {
                            scope: scope.clone(),
                            job,
                        });
                    }
                    return false;
                }
            }

            let mut job = TrackedJob::new(job_id);
            if let Some(snapshot) = initial.filter(|s| !s.status.is_terminal()) {
                let progress = snapshot.percent();
                job.state = SyncState::Syncing {
                    progress,
                    message: progress_message(snapshot, progress),
                };
                job.processed_files = snapshot.processed_files;
                job.total_files = snapshot.total_files;
            }
            map.insert(scope.clone(), job.clone());
            job
        };
        self.finished.write().await.remove(scope);

        self.emit(TrackerEvent::Updated {
            scope: scope.clone(),
            job,
        });
        true
    }

    /// Apply observation number `seq` of `job_id`.
    ///
    /// Ignored (returns `None`) when the scope shows a different job, when `seq`
    /// is not newer than the last applied observation, or when the entry is
    /// already terminal. Progress never decreases while syncing.
    pub async fn apply(
        &self,
        scope: &ScopeKey,
        job_id: &str,
        seq: u64,
        snapshot: &JobSnapshot,
    ) -> Option<SyncState> {
        let job = {
            let mut map = self.inner.write().await;
            let job = map.get_mut(scope)?;
            if job.job_id != job_id || seq <= job.seq || job.state.is_terminal() {
                return None;
            }

            job.state = match snapshot.status {
                JobStatus::Completed => SyncState::Succeeded {
                    message: success_message(snapshot),
                },
                JobStatus::Failed | JobStatus::Cancelled => SyncState::Failed {
                    error: failure_message(snapshot),
                },
                JobStatus::Pending | JobStatus::Running | JobStatus::Unknown => {
                    let progress = snapshot.percent().max(job.state.progress());
                    SyncState::Syncing {
                        progress,
                        message: progress_message(snapshot, progress),
                    }
                }
            };
            job.processed_files = job.processed_files.max(snapshot.processed_files);
            job.total_files = snapshot.total_files;
            job.updated_at = Utc::now();
            job.seq = seq;
            job.clone()
        };

        let state = job.state.clone();
        self.emit(TrackerEvent::Updated {
            scope: scope.clone(),
            job,
        });
        Some(state)
    }

    /// Mark the job as no longer watched, keeping its last progress.
    pub async fn mark_unwatched(&self, scope: &ScopeKey, job_id: &str) {
        let job = {
            let mut map = self.inner.write().await;
            let Some(job) = map.get_mut(scope) else {
                return;
            };
            if job.job_id != job_id || job.state.is_terminal() {
                return;
            }
            job.state = SyncState::Unwatched {
                progress: job.state.progress(),
            };
            job.updated_at = Utc::now();
            job.clone()
        };

        self.emit(TrackerEvent::Updated {
            scope: scope.clone(),
            job,
        });
    }

    /// Remove the entry for `scope` if it still shows `job_id`.
    ///
    /// A finished entry stays available through `last_finished`.
    pub async fn clear(&self, scope: &ScopeKey, job_id: &str) -> bool {
        let removed = {
            let mut map = self.inner.write().await;
            if map.get(scope).is_some_and(|job| job.job_id == job_id) {
                map.remove(scope)
            } else {
                None
            }
        };
        let Some(job) = removed else {
            return false;
        };

        if !matches!(job.state, SyncState::Syncing { .. }) {
            self.finished.write().await.insert(scope.clone(), job);
        }
        self.emit(TrackerEvent::Cleared {
            scope: scope.clone(),
            job_id: job_id.to_string(),
        });
        true
    }

    /// The most recent entry for `scope` that was cleared after it finished,
    /// unless a new job has been tracked there since.
    pub async fn last_finished(&self, scope: &ScopeKey) -> Option<TrackedJob> {
        let map = self.finished.read().await;
        map.get(scope).cloned()
    }

    pub(crate) fn notify_cancelled(&self, scope: &ScopeKey, job_id: &str) {
        self.emit(TrackerEvent::Cancelled {
            scope: scope.clone(),
            job_id: job_id.to_string(),
        });
    }

    pub async fn get(&self, scope: &ScopeKey) -> Option<TrackedJob> {
        let map = self.inner.read().await;
        map.get(scope).cloned()
    }

    /// Find the scope currently displaying `job_id`.
    pub async fn find_scope(&self, job_id: &str) -> Option<ScopeKey> {
        let map = self.inner.read().await;
        map.iter()
            .find(|(_, job)| job.job_id == job_id)
            .map(|(scope, _)| scope.clone())
    }

    pub async fn get_all(&self) -> HashMap<ScopeKey, TrackedJob> {
        let map = self.inner.read().await;
        map.clone()
    }

    /// Number of scopes still syncing.
    pub async fn active_count(&self) -> usize {
        let map = self.inner.read().await;
        map.values()
            .filter(|job| matches!(job.state, SyncState::Syncing { .. }))
            .count()
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
