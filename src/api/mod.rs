//! Client side of the sync backend's REST contract.
//!
//! `SyncApi` is the seam between the poller and the network: the poller only
//! sees start/status/cancel operations, and `HttpSyncApi` maps them onto each
//! resource kind's endpoint family.

mod http;
mod models;

use async_trait::async_trait;

use crate::core::ScopeKey;
use crate::error::ApiError;

pub use http::{HttpSyncApi, endpoints};
pub use models::{
    CancelResponse, JobEnvelope, JobSnapshot, JobStatus, StartOutcome, StartResponse,
    extract_job_id,
};

/// Operations the poller needs from the sync backend.
#[async_trait]
pub trait SyncApi: Send + Sync {
    /// Ask the backend to start syncing `scope`.
    async fn start_sync(&self, scope: &ScopeKey) -> Result<StartOutcome, ApiError>;

    /// Fetch the current state of a job.
    async fn job_status(&self, scope: &ScopeKey, job_id: &str) -> Result<JobSnapshot, ApiError>;

    /// Request cancellation. Advisory: the backend may keep running for a while.
    async fn cancel_job(&self, scope: &ScopeKey, job_id: &str) -> Result<(), ApiError>;
}
