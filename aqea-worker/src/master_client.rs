//! HTTP client for the master coordination API
//!
//! Short per-request timeout, exponential backoff on transport failures,
//! and a typed conflict error for 409 responses so the pipeline can
//! abandon a unit the master no longer believes it owns.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{info, warn};

use aqea_common::api::{
    CompleteRequest, HeartbeatRequest, OkResponse, ProgressRequest, RegisterRequest,
    RegisterResponse, WorkError, WorkResponse,
};
use aqea_common::model::WorkerState;
use aqea_common::store::with_backoff;
use aqea_common::{Error, Result};

/// Per-request timeout for worker-to-master calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Registration retry schedule.
const REGISTER_ATTEMPTS: u32 = 5;
const REGISTER_PAUSE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct MasterClient {
    http: Client,
    base_url: String,
}

impl MasterClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn transport_error(context: &str, e: reqwest::Error) -> Error {
        Error::UpstreamFetch(format!("master {context} failed: {e}"))
    }

    /// Register, retrying a handful of times so workers can boot before
    /// the master finishes coming up.
    pub async fn register(&self, worker_id: Option<&str>) -> Result<RegisterResponse> {
        let body = RegisterRequest {
            worker_id: worker_id.map(str::to_string),
            capabilities: None,
        };
        let url = format!("{}/api/register", self.base_url);
        for attempt in 1..=REGISTER_ATTEMPTS {
            match self.http.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    let registered: RegisterResponse = response
                        .json()
                        .await
                        .map_err(|e| Self::transport_error("register", e))?;
                    info!(worker_id = %registered.worker_id, "registered with master");
                    return Ok(registered);
                }
                Ok(response) => {
                    warn!(status = %response.status(), attempt, "registration rejected, retrying");
                }
                Err(e) => {
                    warn!(error = %e, attempt, "master unreachable, retrying registration");
                }
            }
            if attempt < REGISTER_ATTEMPTS {
                tokio::time::sleep(REGISTER_PAUSE).await;
            }
        }
        Err(Error::UpstreamFetch(format!(
            "could not register with master after {REGISTER_ATTEMPTS} attempts"
        )))
    }

    /// Claim the next pending unit. `Ok(None)` when nothing is pending;
    /// `CoordinationConflict` when the master says this worker already
    /// owns an active unit.
    pub async fn request_work(&self, worker_id: &str) -> Result<Option<WorkResponse>> {
        let url = format!("{}/api/work", self.base_url);
        with_backoff("request_work", || async {
            let response = self
                .http
                .get(&url)
                .query(&[("worker_id", worker_id)])
                .send()
                .await
                .map_err(|e| Self::transport_error("work request", e))?;
            match response.status() {
                StatusCode::NO_CONTENT => Ok(None),
                StatusCode::CONFLICT => Err(Error::CoordinationConflict(
                    "master reports an active unit for this worker".into(),
                )),
                status if status.is_success() => {
                    let unit: WorkResponse = response
                        .json()
                        .await
                        .map_err(|e| Self::transport_error("work request", e))?;
                    Ok(Some(unit))
                }
                status => Err(Error::UpstreamFetch(format!(
                    "master work request returned {status}"
                ))),
            }
        })
        .await
    }

    pub async fn report_progress(
        &self,
        work_id: &str,
        worker_id: &str,
        entries_processed: i64,
        current_rate: f64,
        errors: Vec<WorkError>,
        aborting: bool,
    ) -> Result<()> {
        let url = format!("{}/api/work/{work_id}/progress", self.base_url);
        let body = ProgressRequest {
            worker_id: worker_id.to_string(),
            entries_processed,
            current_rate,
            errors,
            aborting,
        };
        with_backoff("report_progress", || async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| Self::transport_error("progress report", e))?;
            Self::check_ok(response, "progress report").await
        })
        .await
    }

    pub async fn complete(
        &self,
        work_id: &str,
        worker_id: &str,
        entries_processed: i64,
        success: bool,
    ) -> Result<()> {
        let url = format!("{}/api/work/{work_id}/complete", self.base_url);
        let body = CompleteRequest {
            worker_id: worker_id.to_string(),
            entries_processed,
            success,
        };
        with_backoff("complete", || async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| Self::transport_error("completion report", e))?;
            Self::check_ok(response, "completion report").await
        })
        .await
    }

    pub async fn heartbeat(
        &self,
        worker_id: &str,
        state: WorkerState,
        current_work_id: Option<&str>,
    ) -> Result<()> {
        let url = format!("{}/api/heartbeat", self.base_url);
        let body = HeartbeatRequest {
            worker_id: worker_id.to_string(),
            status: state.as_str().to_string(),
            current_work_id: current_work_id.map(str::to_string),
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::transport_error("heartbeat", e))?;
        Self::check_ok(response, "heartbeat").await
    }

    async fn check_ok(response: reqwest::Response, context: &str) -> Result<()> {
        match response.status() {
            StatusCode::CONFLICT => Err(Error::CoordinationConflict(format!(
                "master rejected {context}: ownership mismatch"
            ))),
            status if status.is_success() => {
                let _: OkResponse = response
                    .json()
                    .await
                    .map_err(|e| Self::transport_error(context, e))?;
                Ok(())
            }
            status => Err(Error::UpstreamFetch(format!(
                "master {context} returned {status}"
            ))),
        }
    }
}
