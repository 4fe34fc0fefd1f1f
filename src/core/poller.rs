//! Trigger/poll client for backend sync jobs.
//!
//! Each scope key gets its own poll loop, spawned as a task. A loop issues one
//! status request per interval (never two in flight), writes observations into
//! the shared `SyncTracker`, and stops on a terminal status, on the wall-clock
//! timeout, on cancel, or on poller shutdown.
//!
//! Only explicit backend statuses end a loop with success or failure. Request
//! errors are logged and the loop keeps going on the next tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, sleep_until};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::models::{ScopeKey, validate_identifier};
use super::tracker::SyncTracker;
use crate::api::{JobSnapshot, JobStatus, StartOutcome, SyncApi};
use crate::config::PollConfig;
use crate::context::AppContext;
use crate::error::PollError;
use crate::logging::LogThrottle;

/// Minimum gap between repeated poll-failure warnings for one job.
const POLL_ERROR_LOG_INTERVAL: Duration = Duration::from_secs(30);

struct PollHandle {
    job_id: String,
    generation: u64,
    token: CancellationToken,
}

type Handles = HashMap<ScopeKey, PollHandle>;
type Registry = Arc<Mutex<Handles>>;

fn lock(registry: &Mutex<Handles>) -> MutexGuard<'_, Handles> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Starts, watches, and cancels sync jobs.
pub struct SyncPoller {
    api: Arc<dyn SyncApi>,
    tracker: SyncTracker,
    settings: PollConfig,
    loops: Registry,
    /// Held from handle registration through `tracker.begin`, so the last
    /// registered job is also the one the tracker shows.
    watching: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl SyncPoller {
    pub fn new(ctx: &AppContext) -> Self {
        Self::with_parts(
            ctx.api.clone(),
            ctx.tracker.clone(),
            ctx.config.polling.clone(),
        )
    }

    pub fn with_parts(api: Arc<dyn SyncApi>, tracker: SyncTracker, settings: PollConfig) -> Self {
        Self {
            api,
            tracker,
            settings,
            loops: Arc::new(Mutex::new(HashMap::new())),
            watching: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    pub fn tracker(&self) -> &SyncTracker {
        &self.tracker
    }

    /// Start syncing `scope` and watch the resulting job. Returns the job id.
    ///
    /// If this poller already watches a job for `scope`, that job's id is
    /// returned and no request is sent. If the backend reports a job already
    /// running for `scope`, that job is watched instead.
    pub async fn start_job(&self, scope: ScopeKey) -> Result<String, PollError> {
        scope.validate()?;
        self.ensure_running()?;

        if let Some(job_id) = self.active_job(&scope) {
            debug!(%scope, %job_id, "Sync already being watched");
            return Ok(job_id);
        }

        let (job_id, initial) = match self.api.start_sync(&scope).await? {
            StartOutcome::Started { job_id, snapshot } => {
                info!(%scope, %job_id, "Sync started");
                (job_id, snapshot)
            }
            StartOutcome::AlreadyRunning { job_id } => {
                info!(%scope, %job_id, "Sync already running, tracking existing job");
                (job_id, None)
            }
        };
        validate_identifier("job id", &job_id)?;

        Ok(self.watch(scope, job_id, initial).await)
    }

    /// Watch an existing job for `scope`.
    pub async fn poll_job(&self, job_id: &str, scope: ScopeKey) -> Result<String, PollError> {
        scope.validate()?;
        validate_identifier("job id", job_id)?;
        self.ensure_running()?;

        Ok(self.watch(scope, job_id.to_string(), None).await)
    }

    /// Cancel a job this poller knows about.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), PollError> {
        let scope = match self.scope_of(job_id) {
            Some(scope) => scope,
            None => self
                .tracker
                .find_scope(job_id)
                .await
                .ok_or_else(|| PollError::UnknownJob(job_id.to_string()))?,
        };
        self.cancel_scoped(&scope, job_id).await
    }

    /// Cancel `job_id` on `scope`, whether or not it is watched locally.
    ///
    /// Local polling stops only once the backend accepted the cancel.
    pub async fn cancel_scoped(&self, scope: &ScopeKey, job_id: &str) -> Result<(), PollError> {
        scope.validate()?;
        validate_identifier("job id", job_id)?;

        self.api.cancel_job(scope, job_id).await?;
        info!(%scope, job_id, "Sync cancelled");

        self.stop_loop(scope, job_id);
        self.tracker.clear(scope, job_id).await;
        self.tracker.notify_cancelled(scope, job_id);
        Ok(())
    }

    /// The job currently watched for `scope`, if any.
    pub fn active_job(&self, scope: &ScopeKey) -> Option<String> {
        lock(&self.loops)
            .get(scope)
            .filter(|handle| !handle.token.is_cancelled())
            .map(|handle| handle.job_id.clone())
    }

    pub fn watched_count(&self) -> usize {
        lock(&self.loops)
            .values()
            .filter(|handle| !handle.token.is_cancelled())
            .count()
    }

    /// Stop every loop and pending display timer, and wait for them to exit.
    ///
    /// No tracker update happens after this returns.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        lock(&self.loops).clear();
        debug!("Sync poller shut down");
    }

    fn ensure_running(&self) -> Result<(), PollError> {
        if self.shutdown.is_cancelled() {
            Err(PollError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn scope_of(&self, job_id: &str) -> Option<ScopeKey> {
        lock(&self.loops)
            .iter()
            .find(|(_, handle)| handle.job_id == job_id)
            .map(|(scope, _)| scope.clone())
    }

    fn stop_loop(&self, scope: &ScopeKey, job_id: &str) {
        let mut loops = lock(&self.loops);
        if loops.get(scope).is_some_and(|h| h.job_id == job_id) {
            if let Some(handle) = loops.remove(scope) {
                handle.token.cancel();
            }
        }
    }

    async fn watch(&self, scope: ScopeKey, job_id: String, initial: Option<JobSnapshot>) -> String {
        let _watching = self.watching.lock().await;
        let (token, generation) = {
            let mut loops = lock(&self.loops);
            if let Some(handle) = loops.get(&scope) {
                if handle.job_id == job_id && !handle.token.is_cancelled() {
                    return job_id;
                }
                debug!(%scope, previous = %handle.job_id, %job_id, "Replacing watched job");
                handle.token.cancel();
            }

            let generation = self.generation.fetch_add(1, Ordering::Relaxed);
            let token = self.shutdown.child_token();
            loops.insert(
                scope.clone(),
                PollHandle {
                    job_id: job_id.clone(),
                    generation,
                    token: token.clone(),
                },
            );
            (token, generation)
        };

        if token.is_cancelled() {
            return job_id;
        }
        self.tracker.begin(&scope, &job_id, initial.as_ref()).await;

        let poll_loop = PollLoop {
            api: self.api.clone(),
            tracker: self.tracker.clone(),
            settings: self.settings.clone(),
            loops: self.loops.clone(),
            scope,
            job_id: job_id.clone(),
            generation,
            token,
        };
        self.tasks.spawn(poll_loop.run(initial));

        job_id
    }
}

impl Drop for SyncPoller {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

enum Step {
    Continue,
    Stop,
    Completed,
}

/// One scope's poll loop.
struct PollLoop {
    api: Arc<dyn SyncApi>,
    tracker: SyncTracker,
    settings: PollConfig,
    loops: Registry,
    scope: ScopeKey,
    job_id: String,
    generation: u64,
    token: CancellationToken,
}

impl PollLoop {
    async fn run(self, initial: Option<JobSnapshot>) {
        let completed = self.drive(initial).await;
        self.release();

        if completed {
            self.clear_after_display().await;
        }
    }

    /// Returns `true` when the job completed successfully.
    async fn drive(&self, initial: Option<JobSnapshot>) -> bool {
        let deadline = Instant::now() + self.settings.max_duration();
        let mut throttle = LogThrottle::new(POLL_ERROR_LOG_INTERVAL);
        let mut seq = 0;

        if let Some(snapshot) = initial {
            seq += 1;
            match self.observe(seq, &snapshot).await {
                Step::Continue => {}
                Step::Stop => return false,
                Step::Completed => return true,
            }
        }

        let period = self.settings.interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!(scope = %self.scope, job_id = %self.job_id, "Stopped watching sync job");
                    return false;
                }
                _ = sleep_until(deadline) => {
                    warn!(
                        scope = %self.scope,
                        job_id = %self.job_id,
                        timeout_secs = self.settings.max_duration_secs,
                        "Sync job still not finished, no longer watching"
                    );
                    self.tracker.mark_unwatched(&self.scope, &self.job_id).await;
                    return false;
                }
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = self.token.cancelled() => return false,
                result = self.api.job_status(&self.scope, &self.job_id) => result,
            };

            match result {
                Ok(snapshot) => {
                    throttle.reset();
                    seq += 1;
                    match self.observe(seq, &snapshot).await {
                        Step::Continue => {}
                        Step::Stop => return false,
                        Step::Completed => return true,
                    }
                }
                Err(e) if throttle.should_log() => {
                    warn!(scope = %self.scope, job_id = %self.job_id, error = %e, "Failed to poll sync job");
                }
                Err(e) => {
                    debug!(scope = %self.scope, job_id = %self.job_id, error = %e, "Failed to poll sync job");
                }
            }
        }
    }

    async fn observe(&self, seq: u64, snapshot: &JobSnapshot) -> Step {
        if self.token.is_cancelled() {
            return Step::Stop;
        }

        let applied = self
            .tracker
            .apply(&self.scope, &self.job_id, seq, snapshot)
            .await;
        debug!(
            scope = %self.scope,
            job_id = %self.job_id,
            status = %snapshot.status,
            progress = snapshot.percent(),
            "Sync job status"
        );

        match snapshot.status {
            JobStatus::Pending | JobStatus::Running | JobStatus::Unknown => Step::Continue,
            JobStatus::Completed => {
                info!(
                    scope = %self.scope,
                    job_id = %self.job_id,
                    processed_files = snapshot.processed_files,
                    "Sync completed"
                );
                if applied.is_some() {
                    Step::Completed
                } else {
                    Step::Stop
                }
            }
            JobStatus::Failed => {
                warn!(
                    scope = %self.scope,
                    job_id = %self.job_id,
                    error = snapshot.error_message.as_deref().unwrap_or("unknown"),
                    "Sync failed"
                );
                Step::Stop
            }
            JobStatus::Cancelled => {
                info!(scope = %self.scope, job_id = %self.job_id, "Sync cancelled by backend");
                self.tracker.clear(&self.scope, &self.job_id).await;
                Step::Stop
            }
        }
    }

    async fn clear_after_display(&self) {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => {}
            _ = sleep(self.settings.success_display()) => {
                self.tracker.clear(&self.scope, &self.job_id).await;
            }
        }
    }

    fn release(&self) {
        let mut loops = lock(&self.loops);
        if loops
            .get(&self.scope)
            .is_some_and(|handle| handle.generation == self.generation)
        {
            loops.remove(&self.scope);
        }
    }
}
