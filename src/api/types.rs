//! Wire types for the HTTP API.

use crate::registry::{CancelOutcome, ExecutionHandle, ExecutionSnapshot, RegistryError, ScriptSource};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body of `POST /api/executions`. Exactly one of `template` and `script`
/// selects the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartExecutionRequest {
    pub context_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    pub duration_ms: u64,
}

impl StartExecutionRequest {
    pub fn source(&self) -> Result<ScriptSource, RegistryError> {
        match (&self.template, &self.script) {
            (Some(template), None) => Ok(ScriptSource::Template(template.clone())),
            (None, Some(script)) => Ok(ScriptSource::Inline(script.clone())),
            (Some(_), Some(_)) => Err(RegistryError::InvalidPayload(
                "request sets both template and script".to_string(),
            )),
            (None, None) => Err(RegistryError::InvalidPayload(
                "request sets neither template nor script".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartExecutionResponse {
    pub execution_id: Uuid,
    pub context_id: String,
}

impl From<ExecutionHandle> for StartExecutionResponse {
    fn from(handle: ExecutionHandle) -> Self {
        Self {
            execution_id: handle.execution_id,
            context_id: handle.context_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelExecutionResponse {
    pub execution_id: Uuid,
    /// Always true for a 200: the record is sealed before this reply.
    pub terminated: bool,
    pub executor_acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_error: Option<String>,
}

impl From<CancelOutcome> for CancelExecutionResponse {
    fn from(outcome: CancelOutcome) -> Self {
        Self {
            execution_id: outcome.execution_id,
            terminated: true,
            executor_acknowledged: outcome.executor_acknowledged,
            executor_error: outcome.executor_error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionListResponse {
    pub executions: Vec<ExecutionSnapshot>,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateListResponse {
    pub templates: Vec<TemplateInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub executor: String,
    pub uptime_secs: u64,
}
