use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::debug;
use uuid::Uuid;

use super::SyncApi;
use super::models::{
    CancelResponse, JobEnvelope, JobSnapshot, StartOutcome, StartResponse, extract_job_id,
};
use crate::config::ApiConfig;
use crate::core::{ResourceKind, ScopeKey};
use crate::error::ApiError;

/// Endpoint paths for each resource kind.
pub mod endpoints {
    use super::{ResourceKind, ScopeKey};

    pub fn start(scope: &ScopeKey) -> String {
        format!("/sync/{}/{}", scope.kind.as_str(), scope.id)
    }

    pub fn job(kind: ResourceKind, job_id: &str) -> String {
        match kind {
            ResourceKind::Connection => format!("/sync/job/{}", job_id),
            ResourceKind::Repository => format!("/sync/repository/job/{}", job_id),
        }
    }

    pub fn cancel(kind: ResourceKind, job_id: &str) -> String {
        format!("{}/cancel", job(kind, job_id))
    }
}

/// `SyncApi` over HTTP with optional bearer authentication.
#[derive(Clone)]
pub struct HttpSyncApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpSyncApi {
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn prepare(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("X-Request-Id", Uuid::now_v7().to_string());
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(StatusCode, String), ApiError> {
        let response = self.prepare(builder).send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }
}

#[async_trait]
impl SyncApi for HttpSyncApi {
    async fn start_sync(&self, scope: &ScopeKey) -> Result<StartOutcome, ApiError> {
        let url = self.url(&endpoints::start(scope));
        debug!(%scope, %url, "Starting sync");

        let (status, body) = self.send(self.client.post(&url)).await?;

        if status == StatusCode::CONFLICT {
            return match extract_job_id(&body) {
                Some(job_id) => Ok(StartOutcome::AlreadyRunning { job_id }),
                None => Err(ApiError::Http { status, body }),
            };
        }
        if !status.is_success() {
            return Err(ApiError::Http { status, body });
        }

        start_outcome(&body)
    }

    async fn job_status(&self, scope: &ScopeKey, job_id: &str) -> Result<JobSnapshot, ApiError> {
        let url = self.url(&endpoints::job(scope.kind, job_id));
        let (status, body) = self.send(self.client.get(&url)).await?;
        if !status.is_success() {
            return Err(ApiError::Http { status, body });
        }

        let envelope: JobEnvelope = serde_json::from_str(&body)?;
        match envelope.job {
            Some(job) if envelope.status == "success" => Ok(job),
            _ => Err(ApiError::Backend(
                envelope
                    .error
                    .or(envelope.message)
                    .unwrap_or_else(|| format!("unexpected job status response: {}", body)),
            )),
        }
    }

    async fn cancel_job(&self, scope: &ScopeKey, job_id: &str) -> Result<(), ApiError> {
        let url = self.url(&endpoints::cancel(scope.kind, job_id));
        debug!(%scope, job_id, "Cancelling sync job");

        let (status, body) = self.send(self.client.post(&url)).await?;
        if !status.is_success() {
            return Err(ApiError::Http { status, body });
        }

        let response: CancelResponse = serde_json::from_str(&body)?;
        if response.status == "success" {
            Ok(())
        } else {
            Err(ApiError::Backend(
                response
                    .error
                    .or(response.message)
                    .unwrap_or_else(|| format!("cancel returned status {}", response.status)),
            ))
        }
    }
}

/// Interpret a 2xx start body. Some backends report the conflict in-band.
fn start_outcome(body: &str) -> Result<StartOutcome, ApiError> {
    let response: StartResponse = serde_json::from_str(body)?;

    if response.status.as_deref() == Some("error") {
        return match extract_job_id(body) {
            Some(job_id) => Ok(StartOutcome::AlreadyRunning { job_id }),
            None => Err(ApiError::Backend(
                response
                    .error
                    .or(response.message)
                    .unwrap_or_else(|| "sync could not be started".to_string()),
            )),
        };
    }

    match response.job_id.filter(|id| !id.is_empty()) {
        Some(job_id) => Ok(StartOutcome::Started {
            job_id,
            snapshot: response.job,
        }),
        None => Err(ApiError::Backend(
            "start response did not include a job id".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::JobStatus;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer, token: Option<&str>) -> HttpSyncApi {
        let config = ApiConfig {
            base_url: format!("{}/", server.uri()),
            token: None,
            token_file: None,
            request_timeout_secs: 5,
        };
        HttpSyncApi::new(&config, token.map(str::to_string)).unwrap()
    }

    #[test]
    fn endpoint_families() {
        let conn = ScopeKey::connection("conn-1");
        let repo = ScopeKey::repository("42");

        assert_eq!(endpoints::start(&conn), "/sync/connection/conn-1");
        assert_eq!(endpoints::start(&repo), "/sync/repository/42");
        assert_eq!(endpoints::job(conn.kind, "j1"), "/sync/job/j1");
        assert_eq!(endpoints::cancel(conn.kind, "j1"), "/sync/job/j1/cancel");
        assert_eq!(
            endpoints::cancel(repo.kind, "j1"),
            "/sync/repository/job/j1/cancel"
        );
    }

    #[tokio::test]
    async fn start_returns_job_and_initial_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/connection/conn-1"))
            .and(header("authorization", "Bearer secret"))
            .and(header_exists("x-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "job_id": "job-1",
                "job": {"status": "pending", "progress": 0, "processed_files": 0, "total_files": 12}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = api_for(&server, Some("secret"));
        let outcome = api.start_sync(&ScopeKey::connection("conn-1")).await.unwrap();

        match outcome {
            StartOutcome::Started { job_id, snapshot } => {
                assert_eq!(job_id, "job-1");
                let snapshot = snapshot.unwrap();
                assert_eq!(snapshot.status, JobStatus::Pending);
                assert_eq!(snapshot.total_files, 12);
            }
            other => panic!("expected Started, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn start_conflict_recovers_existing_job() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/connection/conn-2"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "status": "error",
                "error": "Sync already in progress for this connection (job_id: job-77)"
            })))
            .mount(&server)
            .await;

        let api = api_for(&server, None);
        let outcome = api.start_sync(&ScopeKey::connection("conn-2")).await.unwrap();

        assert_eq!(
            outcome,
            StartOutcome::AlreadyRunning {
                job_id: "job-77".to_string()
            }
        );
    }

    #[tokio::test]
    async fn start_conflict_without_job_id_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/repository/9"))
            .respond_with(ResponseTemplate::new(409).set_body_string("busy"))
            .mount(&server)
            .await;

        let api = api_for(&server, None);
        let err = api.start_sync(&ScopeKey::repository("9")).await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status, .. } if status == StatusCode::CONFLICT));
    }

    #[test]
    fn in_band_error_with_job_id_is_a_conflict() {
        let outcome =
            start_outcome(r#"{"status":"error","error":"already running","job_id":"job-5"}"#)
                .unwrap();
        assert_eq!(outcome.job_id(), "job-5");

        let err = start_outcome(r#"{"status":"error","error":"connection disabled"}"#).unwrap_err();
        assert!(matches!(err, ApiError::Backend(msg) if msg == "connection disabled"));
    }

    #[tokio::test]
    async fn job_status_parses_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sync/repository/job/job-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "job": {"status": "failed", "progress": 20, "error_message": "token revoked"}
            })))
            .mount(&server)
            .await;

        let api = api_for(&server, None);
        let snapshot = api
            .job_status(&ScopeKey::repository("r1"), "job-3")
            .await
            .unwrap();

        assert_eq!(snapshot.status, JobStatus::Failed);
        assert_eq!(snapshot.error_message.as_deref(), Some("token revoked"));
    }

    #[tokio::test]
    async fn job_status_rejects_error_envelope_and_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sync/job/missing"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "error",
                "error": "job not found"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sync/job/broken"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let api = api_for(&server, None);
        let scope = ScopeKey::connection("c");

        let err = api.job_status(&scope, "missing").await.unwrap_err();
        assert!(matches!(err, ApiError::Backend(msg) if msg == "job not found"));

        let err = api.job_status(&scope, "broken").await.unwrap_err();
        assert!(matches!(err, ApiError::Http { status, .. } if status == StatusCode::BAD_GATEWAY));
    }

    #[tokio::test]
    async fn cancel_requires_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sync/job/job-1/cancel"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/sync/job/job-2/cancel"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                serde_json::json!({"status": "error", "error": "job already finished"}),
            ))
            .mount(&server)
            .await;

        let api = api_for(&server, None);
        let scope = ScopeKey::connection("c");

        api.cancel_job(&scope, "job-1").await.unwrap();
        let err = api.cancel_job(&scope, "job-2").await.unwrap_err();
        assert_eq!(err.to_string(), "backend reported an error: job already finished");
    }
}
