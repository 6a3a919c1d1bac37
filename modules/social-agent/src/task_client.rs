//! HTTP/JSON client for the external investigation task service.

use async_trait::async_trait;
use social_agent_types::{JobPoll, JobSpec, JobStatus, PollJobResponse, SubmitJobResponse};

use crate::collaborators::TaskDispatcher;
use crate::config::InvestigationConfig;

pub struct HttpTaskDispatcher {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpTaskDispatcher {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &InvestigationConfig) -> Self {
        Self::new(&config.api_url, &config.api_key)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| format!("Task service unavailable: {}", e))?;
        Self::parse(response).await
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, String> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("Task service unavailable: {}", e))?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, String> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Task service error ({}): {}", status, body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| format!("Invalid response from task service: {}", e))
    }
}

/// Map the wire status onto a poll observation; unknown statuses stay pending
pub fn poll_from_response(response: PollJobResponse) -> JobPoll {
    let status = JobStatus::from_str(&response.status).unwrap_or_else(|| {
        log::warn!("[TASKS] Unknown job status '{}', treating as pending", response.status);
        JobStatus::Pending
    });
    JobPoll {
        status,
        result: response.result,
        error: response.error,
    }
}

#[async_trait]
impl TaskDispatcher for HttpTaskDispatcher {
    async fn submit(&self, spec: &JobSpec) -> Result<String, String> {
        let resp: SubmitJobResponse = self.post("/tasks", spec).await?;
        if resp.id.trim().is_empty() {
            return Err("Task service returned an empty job id".to_string());
        }
        Ok(resp.id)
    }

    async fn poll(&self, job_id: &str) -> Result<JobPoll, String> {
        let resp: PollJobResponse = self.get(&format!("/tasks/{}", job_id)).await?;
        Ok(poll_from_response(resp))
    }
}
