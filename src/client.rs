//! HTTP client for the daemon's API.
//!
//! Backs the CLI subcommands; also usable for driving a remote daemon from
//! other tooling.

use crate::api::types::{
    CancelExecutionResponse, ExecutionListResponse, HealthResponse, StartExecutionRequest,
    StartExecutionResponse, TemplateListResponse,
};
use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Client-side request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct WardenClient {
    base_url: String,
    client: reqwest::Client,
}

impl WardenClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/api/health").await
    }

    pub async fn templates(&self) -> Result<TemplateListResponse> {
        self.get("/api/templates").await
    }

    pub async fn list(&self) -> Result<ExecutionListResponse> {
        self.get("/api/executions").await
    }

    pub async fn start(&self, request: &StartExecutionRequest) -> Result<StartExecutionResponse> {
        let response = self
            .client
            .post(format!("{}/api/executions", self.base_url))
            .json(request)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        Self::decode(response).await
    }

    pub async fn cancel(&self, identifier: &str) -> Result<CancelExecutionResponse> {
        let response = self
            .client
            .post(format!(
                "{}/api/executions/{}/cancel",
                self.base_url, identifier
            ))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        Self::decode(response).await
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.base_url))?;
        Self::decode(response).await
    }

    /// Decode a success body, or surface the server's error message.
    async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json().await.context("malformed server response");
        }

        #[derive(serde::Deserialize)]
        struct ErrorBody {
            error: String,
            #[serde(default)]
            code: Option<String>,
        }

        match response.json::<ErrorBody>().await {
            Ok(body) => match body.code {
                Some(code) => bail!("{} ({})", body.error, code),
                None => bail!("{}", body.error),
            },
            Err(_) => bail!("server returned {}", status),
        }
    }
}
