use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{JobSnapshot, JobStatus};
use crate::error::InputError;

const MAX_SCOPE_ID_LEN: usize = 128;

/// The kinds of resource a sync job can operate on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A remote-host connection.
    Connection,
    /// A GitHub repository.
    Repository,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Repository => "repository",
        }
    }

    pub fn parse(s: &str) -> Result<Self, InputError> {
        match s.trim().to_lowercase().as_str() {
            "connection" | "conn" | "host" => Ok(Self::Connection),
            "repository" | "repo" | "github" => Ok(Self::Repository),
            other => Err(InputError::UnknownKind(other.to_string())),
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resource a job is tracked under. At most one job is displayed per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeKey {
    pub kind: ResourceKind,
    pub id: String,
}

impl ScopeKey {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn connection(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Connection, id)
    }

    pub fn repository(id: impl Into<String>) -> Self {
        Self::new(ResourceKind::Repository, id)
    }

    /// Parse `kind:id` or `kind/id`.
    pub fn parse(s: &str) -> Result<Self, InputError> {
        let (kind, id) = s
            .split_once([':', '/'])
            .ok_or_else(|| InputError::Invalid {
                field: "scope",
                reason: format!("expected <kind>:<id>, got {s:?}"),
            })?;
        let scope = Self::new(ResourceKind::parse(kind)?, id.trim());
        scope.validate()?;
        Ok(scope)
    }

    /// The id is used as a URL path segment, so it is restricted to a safe set.
    pub fn validate(&self) -> Result<(), InputError> {
        validate_identifier("scope id", &self.id)
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Validate an identifier that ends up in a request path.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), InputError> {
    if value.is_empty() {
        return Err(InputError::Empty { field });
    }
    if value.len() > MAX_SCOPE_ID_LEN {
        return Err(InputError::TooLong {
            field,
            len: value.len(),
            max: MAX_SCOPE_ID_LEN,
        });
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ':' | '-'));
    if !valid {
        return Err(InputError::InvalidCharacters {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// What the client currently displays for a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    Syncing { progress: u8, message: String },
    Succeeded { message: String },
    Failed { error: String },
    /// Polling gave up before the job reached a terminal state.
    Unwatched { progress: u8 },
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded { .. } | Self::Failed { .. })
    }

    pub fn progress(&self) -> u8 {
        match self {
            Self::Syncing { progress, .. } | Self::Unwatched { progress } => *progress,
            Self::Succeeded { .. } => 100,
            Self::Failed { .. } => 0,
        }
    }
}

/// Client-side record of the job displayed for a scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedJob {
    pub job_id: String,
    pub state: SyncState,
    pub processed_files: u64,
    pub total_files: u64,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Sequence number of the last observation applied.
    pub seq: u64,
}

impl TrackedJob {
    pub fn new(job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            state: SyncState::Syncing {
                progress: 0,
                message: PENDING_MESSAGE.to_string(),
            },
            processed_files: 0,
            total_files: 0,
            started_at: now,
            updated_at: now,
            seq: 0,
        }
    }
}

const PENDING_MESSAGE: &str = "Waiting for sync to start...";

/// Human-readable message for a non-terminal observation.
pub fn progress_message(snapshot: &JobSnapshot, progress: u8) -> String {
    if snapshot.status == JobStatus::Pending {
        return PENDING_MESSAGE.to_string();
    }
    if snapshot.total_files > 0 {
        return format!(
            "Processed {} of {} files ({}%)",
            snapshot.processed_files, snapshot.total_files, progress
        );
    }
    match snapshot.message.as_deref() {
        Some(message) if !message.trim().is_empty() => message.to_string(),
        _ => format!("Syncing... {}%", progress),
    }
}

pub fn success_message(snapshot: &JobSnapshot) -> String {
    format!(
        "Sync completed: {} files processed",
        snapshot.processed_files
    )
}

pub fn failure_message(snapshot: &JobSnapshot) -> String {
    snapshot
        .error_message
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or("Sync failed")
        .to_string()
}
