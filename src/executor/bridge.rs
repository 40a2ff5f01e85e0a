//! Remote bridge executor.
//!
//! Forwards scripts to a self-hosted execution bridge over HTTP. The bridge
//! owns the script runtimes; this side only dispatches, polls for the
//! verdict, and relays cancels. The bridge's cancel API is keyed by context,
//! so this executor declares the context cancel scope.

use super::{
    CancelScope, CancelTarget, DispatchJob, DispatchTicket, ExecutionOutcome, ExecutorError,
    ScriptExecutor,
};
use crate::config::BridgeExecutorConfig;
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// Extra wait past the requested duration when polling for a verdict.
const OUTCOME_POLL_SLACK: Duration = Duration::from_secs(2);

pub struct BridgeExecutor {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ExecuteRequest<'a> {
    execution_id: Uuid,
    context_id: &'a str,
    script: &'a str,
    duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ExecuteReply {
    accepted: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum OutcomeReply {
    Completed,
    Failed {
        #[serde(default)]
        error: Option<String>,
    },
}

impl OutcomeReply {
    fn into_outcome(self) -> ExecutionOutcome {
        match self {
            OutcomeReply::Completed => ExecutionOutcome::Completed,
            OutcomeReply::Failed { error } => ExecutionOutcome::Failed(
                error.unwrap_or_else(|| "bridge reported failure".to_string()),
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct CancelRequest<'a> {
    context_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CancelReply {
    delivered: bool,
}

impl BridgeExecutor {
    pub fn new(config: &BridgeExecutorConfig) -> Result<Self, ExecutorError> {
        if config.endpoint.is_empty() {
            return Err(ExecutorError::Unavailable(
                "bridge executor has no endpoint configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                ExecutorError::Unavailable(format!("failed to build bridge client: {}", e))
            })?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }
}

#[async_trait]
impl ScriptExecutor for BridgeExecutor {
    fn label(&self) -> &'static str {
        "bridge"
    }

    fn cancel_scope(&self) -> CancelScope {
        CancelScope::Context
    }

    async fn dispatch(&self, job: DispatchJob) -> Result<DispatchTicket, ExecutorError> {
        let request = ExecuteRequest {
            execution_id: job.execution_id,
            context_id: &job.context_id,
            script: &job.body,
            duration_ms: job.duration_ms,
        };
        let response = self
            .client
            .post(self.url("/execute"))
            .json(&request)
            .send()
            .await
            .map_err(|e| ExecutorError::Dispatch(format!("bridge unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Dispatch(format!(
                "bridge returned {}",
                response.status()
            )));
        }
        let reply: ExecuteReply = response
            .json()
            .await
            .map_err(|e| ExecutorError::Dispatch(format!("malformed bridge reply: {}", e)))?;
        if !reply.accepted {
            return Err(ExecutorError::Dispatch(
                reply
                    .reason
                    .unwrap_or_else(|| "bridge declined the script".to_string()),
            ));
        }

        // One long poll covers the whole expected runtime. If it comes back
        // empty the sender is dropped and the registry's fallback deadline
        // concludes the record.
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let client = self.client.clone();
        let url = self.url(&format!("/outcome/{}", job.execution_id));
        let wait = Duration::from_millis(job.duration_ms) + OUTCOME_POLL_SLACK;
        let execution_id = job.execution_id;
        tokio::spawn(async move {
            match poll_outcome(&client, &url, wait).await {
                Ok(outcome) => {
                    let _ = outcome_tx.send(outcome);
                }
                Err(e) => {
                    debug!(execution_id = %execution_id, error = %e, "bridge outcome poll came back empty");
                }
            }
        });

        Ok(DispatchTicket {
            outcome: outcome_rx,
        })
    }

    async fn cancel(&self, target: &CancelTarget) -> Result<bool, ExecutorError> {
        let context_id = match target {
            CancelTarget::Context(id) => id.as_str(),
            CancelTarget::Execution(_) => {
                return Err(ExecutorError::Cancel(
                    "bridge executor cancels by context, not execution id".to_string(),
                ))
            }
        };
        let response = self
            .client
            .post(self.url("/cancel"))
            .json(&CancelRequest { context_id })
            .send()
            .await
            .map_err(|e| ExecutorError::Cancel(format!("bridge unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Cancel(format!(
                "bridge returned {}",
                response.status()
            )));
        }
        let reply: CancelReply = response
            .json()
            .await
            .map_err(|e| ExecutorError::Cancel(format!("malformed cancel reply: {}", e)))?;
        Ok(reply.delivered)
    }
}

async fn poll_outcome(
    client: &reqwest::Client,
    url: &str,
    wait: Duration,
) -> anyhow::Result<ExecutionOutcome> {
    let response = client
        .get(url)
        .timeout(wait)
        .send()
        .await
        .context("outcome poll failed")?;
    if !response.status().is_success() {
        anyhow::bail!("outcome poll returned {}", response.status());
    }
    let reply: OutcomeReply = response.json().await.context("malformed outcome reply")?;
    Ok(reply.into_outcome())
}
