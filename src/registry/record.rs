//! Execution record types -- the registry's unit of bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a tracked execution.
///
/// `Running` is the only non-terminal state. A record takes exactly one
/// transition out of it and never moves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Dispatched (or about to be) and not yet concluded.
    Running,
    /// The script ran to completion, or the fallback deadline concluded it.
    Completed,
    /// The executor reported a dispatch or runtime failure.
    Failed,
    /// An operator cancel was accepted while the record was running.
    Terminated,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Terminated => "terminated",
        };
        f.pad(s)
    }
}

/// One tracked script execution.
///
/// Created before dispatch so that a cancel racing the dispatch always finds
/// a running record to act on.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    /// Registry-issued identifier, minted before dispatch.
    pub execution_id: Uuid,
    /// Opaque identifier of the target context the script runs in.
    pub context_id: String,
    /// Template name, or "inline" for caller-supplied bodies.
    pub payload_label: String,
    /// Requested runtime in milliseconds (already validated).
    pub requested_duration_ms: u64,
    pub started_at: DateTime<Utc>,
    /// Set exactly once, by the terminal transition.
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    /// Failure reason; only ever set alongside `Failed`.
    pub error: Option<String>,
    /// Insertion counter; keeps list output in start order.
    pub(crate) seq: u64,
}

impl ExecutionRecord {
    pub(crate) fn new(
        execution_id: Uuid,
        context_id: String,
        payload_label: String,
        requested_duration_ms: u64,
        seq: u64,
    ) -> Self {
        Self {
            execution_id,
            context_id,
            payload_label,
            requested_duration_ms,
            started_at: Utc::now(),
            ended_at: None,
            status: ExecutionStatus::Running,
            error: None,
            seq,
        }
    }

    /// Apply a terminal transition. Returns false without touching the record
    /// when it has already been sealed by an earlier transition.
    pub(crate) fn seal(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.ended_at = Some(Utc::now());
        if status == ExecutionStatus::Failed {
            self.error = error;
        }
        true
    }

    pub fn to_snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            execution_id: self.execution_id,
            context_id: self.context_id.clone(),
            payload_label: self.payload_label.clone(),
            requested_duration_ms: self.requested_duration_ms,
            started_at: self.started_at,
            ended_at: self.ended_at,
            status: self.status,
            error: self.error.clone(),
        }
    }
}

/// Point-in-time copy of a record, as served to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSnapshot {
    pub execution_id: Uuid,
    pub context_id: String,
    pub payload_label: String,
    pub requested_duration_ms: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ExecutionRecord {
        ExecutionRecord::new(
            Uuid::new_v4(),
            "ctx-1".to_string(),
            "busy-loop".to_string(),
            5000,
            0,
        )
    }

    #[test]
    fn test_new_record_is_running() {
        let rec = record();
        assert_eq!(rec.status, ExecutionStatus::Running);
        assert!(rec.ended_at.is_none());
        assert!(rec.error.is_none());
    }

    #[test]
    fn test_seal_sets_end_time() {
        let mut rec = record();
        assert!(rec.seal(ExecutionStatus::Completed, None));
        assert_eq!(rec.status, ExecutionStatus::Completed);
        assert!(rec.ended_at.is_some());
        assert!(rec.ended_at.unwrap() >= rec.started_at);
    }

    #[test]
    fn test_seal_is_one_shot() {
        let mut rec = record();
        assert!(rec.seal(ExecutionStatus::Terminated, None));
        let ended = rec.ended_at;
        assert!(!rec.seal(ExecutionStatus::Completed, None));
        assert_eq!(rec.status, ExecutionStatus::Terminated);
        assert_eq!(rec.ended_at, ended);
    }

    #[test]
    fn test_error_only_recorded_on_failure() {
        let mut rec = record();
        assert!(rec.seal(ExecutionStatus::Completed, Some("ignored".to_string())));
        assert!(rec.error.is_none());

        let mut rec = record();
        assert!(rec.seal(ExecutionStatus::Failed, Some("boom".to_string())));
        assert_eq!(rec.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::Terminated).unwrap();
        assert_eq!(json, "\"terminated\"");
        let back: ExecutionStatus = serde_json::from_str("\"running\"").unwrap();
        assert_eq!(back, ExecutionStatus::Running);
    }

    #[test]
    fn test_snapshot_omits_empty_fields() {
        let rec = record();
        let json = serde_json::to_string(&rec.to_snapshot()).unwrap();
        assert!(!json.contains("ended_at"));
        assert!(!json.contains("error"));
    }
}
