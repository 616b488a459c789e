//! Hosted effect API backend.
//!
//! `POST /{image-gen|video-gen}` creates a job, answering `{ "jobId": .. }`;
//! `GET /{family}/{userId}/{jobId}/status` reports on it.

use super::GenerationBackend;
use crate::api::{GenerationRequest, JobHandle, JobStatus};
use crate::config::EffectConfig;
use crate::error::{status_text, PipelineError, Result};
use reqwest::header::ACCEPT;
use serde_json::Value;
use tracing::{debug, info};

const ACCEPT_JSON: &str = "application/json, text/plain, */*";

/// Effect API backend
pub struct StudioBackend {
    api_base: String,
    client: reqwest::Client,
}

impl StudioBackend {
    pub fn new(config: &EffectConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &EffectConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }
}

#[async_trait::async_trait]
impl GenerationBackend for StudioBackend {
    fn name(&self) -> &str {
        "studio"
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<JobHandle> {
        let kind = request.kind();
        let response = self
            .client
            .post(self.url(kind.endpoint()))
            .header(ACCEPT, ACCEPT_JSON)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::Submission(status_text(response.status())));
        }

        let body: Value = response.json().await?;
        let job_id = match body.get("jobId") {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(PipelineError::Submission(
                    "response did not contain a jobId".to_string(),
                ))
            }
        };

        info!("Submitted {} job {}", kind, job_id);

        Ok(JobHandle {
            job_id,
            user_id: request.user_id().to_string(),
            kind,
        })
    }

    async fn query_status(&self, handle: &JobHandle) -> Result<JobStatus> {
        let response = self
            .client
            .get(self.url(&handle.status_path()))
            .header(ACCEPT, ACCEPT_JSON)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::StatusQuery(status_text(response.status())));
        }

        let body: Value = response.json().await?;
        let status = JobStatus::from_response(&body);
        debug!("Job {} status: {:?}", handle.job_id, status);

        Ok(status)
    }
}
