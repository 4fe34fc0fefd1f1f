//! Wire types for the sync backend's JSON contracts.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Backend job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observation of a backend job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub processed_files: u64,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl JobSnapshot {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            progress: None,
            processed_files: 0,
            total_files: 0,
            message: None,
            error_message: None,
        }
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_files(mut self, processed: u64, total: u64) -> Self {
        self.processed_files = processed;
        self.total_files = total;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }

    /// Progress as a whole percentage, clamped to 0..=100.
    pub fn percent(&self) -> u8 {
        match self.progress {
            Some(p) if p.is_finite() => p.round().clamp(0.0, 100.0) as u8,
            _ => 0,
        }
    }
}

/// Body of `POST /sync/{kind}/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct StartResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub job: Option<JobSnapshot>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of the job status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JobEnvelope {
    pub status: String,
    #[serde(default)]
    pub job: Option<JobSnapshot>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of the cancel endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelResponse {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of asking the backend to start a sync.
#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    Started {
        job_id: String,
        snapshot: Option<JobSnapshot>,
    },
    /// The backend refused because a job is already active for the scope.
    AlreadyRunning { job_id: String },
}

impl StartOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Started { job_id, .. } | Self::AlreadyRunning { job_id } => job_id,
        }
    }
}

// Matches `job_id: abc`, `"job_id": "abc"`, `job id abc`, `jobId=abc`, but not
// words that merely start with "id" such as "job identifier".
static EMBEDDED_JOB_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bjob[_ ]?id\b["']?\s*[:=]?\s*["']?([A-Za-z0-9][A-Za-z0-9_.-]*)"#)
        .expect("embedded job id pattern")
});

/// Recover the id of an already-running job from a conflict body.
///
/// Accepts a structured `job_id` field (top level or under `detail`/`job`) or an
/// id embedded in the error text.
pub fn extract_job_id(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if let Some(id) = structured_job_id(&value) {
            return Some(id);
        }
        for key in ["error", "detail", "message"] {
            if let Some(text) = value.get(key).and_then(Value::as_str) {
                if let Some(id) = job_id_in_text(text) {
                    return Some(id);
                }
            }
        }
        return None;
    }

    job_id_in_text(body)
}

fn structured_job_id(value: &Value) -> Option<String> {
    let direct = value.get("job_id").and_then(Value::as_str);
    let nested = ["detail", "job"].iter().find_map(|key| {
        value
            .get(*key)
            .and_then(|inner| inner.get("job_id").or_else(|| inner.get("id")))
            .and_then(Value::as_str)
    });

    direct
        .or(nested)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

fn job_id_in_text(text: &str) -> Option<String> {
    EMBEDDED_JOB_ID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_job_snapshot_with_defaults() {
        let json = r#"{"status":"running","progress":42.6}"#;
        let snapshot: JobSnapshot = serde_json::from_str(json).unwrap();

        assert_eq!(snapshot.status, JobStatus::Running);
        assert_eq!(snapshot.percent(), 43);
        assert_eq!(snapshot.processed_files, 0);
        assert!(snapshot.error_message.is_none());
    }

    #[test]
    fn unrecognised_status_is_not_terminal() {
        let snapshot: JobSnapshot = serde_json::from_str(r#"{"status":"queued"}"#).unwrap();
        assert_eq!(snapshot.status, JobStatus::Unknown);
        assert!(!snapshot.status.is_terminal());
    }

    #[test]
    fn percent_is_clamped() {
        assert_eq!(JobSnapshot::new(JobStatus::Running).with_progress(140.0).percent(), 100);
        assert_eq!(JobSnapshot::new(JobStatus::Running).with_progress(-3.0).percent(), 0);
        assert_eq!(JobSnapshot::new(JobStatus::Running).percent(), 0);
    }

    #[test]
    fn extracts_structured_job_id() {
        assert_eq!(
            extract_job_id(r#"{"status":"error","job_id":"job-77"}"#).as_deref(),
            Some("job-77")
        );
        assert_eq!(
            extract_job_id(r#"{"detail":{"message":"busy","job_id":"abc"}}"#).as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn extracts_job_id_from_error_text() {
        let body = r#"{"status":"error","error":"Sync already in progress (job_id: job-77)"}"#;
        assert_eq!(extract_job_id(body).as_deref(), Some("job-77"));

        let body = r#"{"status":"error","detail":"A sync is running. Job ID 5f0c-11ee."}"#;
        assert_eq!(extract_job_id(body).as_deref(), Some("5f0c-11ee"));
    }

    #[test]
    fn extracts_job_id_from_plain_text_body() {
        assert_eq!(
            extract_job_id("conflict: \"job_id\": \"e1b2c3\"").as_deref(),
            Some("e1b2c3")
        );
    }

    #[test]
    fn missing_job_id_yields_none() {
        assert!(extract_job_id(r#"{"status":"error","error":"database unavailable"}"#).is_none());
        assert!(extract_job_id("").is_none());
        assert!(
            extract_job_id(r#"{"status":"error","error":"Invalid job identifier format"}"#)
                .is_none()
        );
        assert!(extract_job_id("subjob_idle queue is full").is_none());
    }
}
