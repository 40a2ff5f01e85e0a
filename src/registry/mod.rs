//! The execution registry -- the daemon's single source of truth.
//!
//! Every tracked execution lives in one in-memory table behind one lock.
//! Records are inserted before dispatch so a cancel racing the dispatch
//! always finds its target; terminal transitions go through `seal`, which
//! enforces the one-transition rule; a periodic sweep drops aged records so
//! the table cannot grow without bound.

pub mod record;

pub use record::{ExecutionRecord, ExecutionSnapshot, ExecutionStatus};

use crate::config::LimitsConfig;
use crate::executor::{
    CancelScope, CancelTarget, DispatchJob, DispatchTicket, ExecutionOutcome, ExecutorSlot,
};
use crate::templates::ScriptTemplate;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("requested duration {requested_ms}ms is outside the allowed range {min_ms}-{max_ms}ms")]
    InvalidDuration {
        requested_ms: u64,
        min_ms: u64,
        max_ms: u64,
    },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("no execution matches identifier '{0}'")]
    NotFound(String),
    #[error("execution '{identifier}' is already {status}")]
    NotRunning {
        identifier: String,
        status: ExecutionStatus,
    },
    #[error("script executor unavailable: {0}")]
    ExecutorUnavailable(String),
    #[error("executor rejected dispatch: {0}")]
    DispatchRejected(String),
}

/// What to run: a catalog template or a caller-supplied body.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    Template(String),
    Inline(String),
}

impl ScriptSource {
    /// Resolve to a rendered script body plus the label recorded for it.
    fn resolve(&self, duration_ms: u64) -> Result<(String, String), RegistryError> {
        match self {
            ScriptSource::Template(name) => {
                let template = ScriptTemplate::from_name(name).ok_or_else(|| {
                    RegistryError::InvalidPayload(format!("unknown template '{}'", name))
                })?;
                Ok((template.render(duration_ms), template.name().to_string()))
            }
            ScriptSource::Inline(body) => {
                if body.trim().is_empty() {
                    return Err(RegistryError::InvalidPayload(
                        "script body is empty".to_string(),
                    ));
                }
                Ok((body.clone(), "inline".to_string()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct StartRequest {
    pub context_id: String,
    pub source: ScriptSource,
    pub duration_ms: u64,
}

/// Identifier pair handed back the moment a start is accepted.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    pub execution_id: Uuid,
    pub context_id: String,
}

/// Result of an accepted cancel.
///
/// The record is terminated either way; `executor_acknowledged` only reports
/// whether the stop request reached the executor, and neither value claims
/// the script actually stopped.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub execution_id: Uuid,
    pub executor_acknowledged: bool,
    pub executor_error: Option<String>,
}

/// Tracks every execution the daemon has dispatched and not yet swept.
///
/// Cheap to clone; all clones share the same table.
#[derive(Clone)]
pub struct ExecutionRegistry {
    records: Arc<RwLock<HashMap<Uuid, ExecutionRecord>>>,
    executor: ExecutorSlot,
    limits: LimitsConfig,
    seq: Arc<AtomicU64>,
}

impl ExecutionRegistry {
    pub fn new(limits: LimitsConfig, executor: ExecutorSlot) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            executor,
            limits,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Validate, register, and dispatch one script execution.
    ///
    /// The record is inserted before the executor is called. If the executor
    /// rejects the job the record is sealed as failed and kept for listing.
    pub async fn start(&self, request: StartRequest) -> Result<ExecutionHandle, RegistryError> {
        if request.duration_ms < self.limits.min_duration_ms
            || request.duration_ms > self.limits.max_duration_ms
        {
            return Err(RegistryError::InvalidDuration {
                requested_ms: request.duration_ms,
                min_ms: self.limits.min_duration_ms,
                max_ms: self.limits.max_duration_ms,
            });
        }
        if request.context_id.trim().is_empty() {
            return Err(RegistryError::InvalidPayload(
                "context id is empty".to_string(),
            ));
        }
        let (body, payload_label) = request.source.resolve(request.duration_ms)?;
        let executor = match &self.executor {
            ExecutorSlot::Ready(executor) => Arc::clone(executor),
            ExecutorSlot::Unavailable(reason) => {
                return Err(RegistryError::ExecutorUnavailable(reason.clone()))
            }
        };

        let execution_id = Uuid::new_v4();
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let record = ExecutionRecord::new(
            execution_id,
            request.context_id.clone(),
            payload_label.clone(),
            request.duration_ms,
            seq,
        );
        let registered_at = tokio::time::Instant::now();
        {
            let mut records = self.records.write().await;
            records.insert(execution_id, record);
        }
        info!(
            execution_id = %execution_id,
            context_id = %request.context_id,
            payload = %payload_label,
            duration_ms = request.duration_ms,
            "execution registered"
        );

        let job = DispatchJob {
            execution_id,
            context_id: request.context_id.clone(),
            body,
            duration_ms: request.duration_ms,
        };
        match executor.dispatch(job).await {
            Ok(ticket) => {
                let deadline = registered_at
                    + Duration::from_millis(
                        request.duration_ms.saturating_add(self.limits.grace_ms),
                    );
                self.spawn_watcher(execution_id, deadline, ticket);
                Ok(ExecutionHandle {
                    execution_id,
                    context_id: request.context_id,
                })
            }
            Err(e) => {
                let reason = e.to_string();
                self.seal(execution_id, ExecutionStatus::Failed, Some(reason.clone()))
                    .await;
                Err(RegistryError::DispatchRejected(reason))
            }
        }
    }

    /// Accept a cancel request against `identifier` and relay it.
    ///
    /// The identifier is resolved against the executor's cancel scope: an
    /// execution id for per-execution executors, a context id for
    /// per-context ones. The record is sealed as terminated in the same
    /// critical section that resolves it; the executor call happens after,
    /// and its failure is reported in the outcome rather than rolling back.
    pub async fn cancel(&self, identifier: &str) -> Result<CancelOutcome, RegistryError> {
        let executor = match &self.executor {
            ExecutorSlot::Ready(executor) => Arc::clone(executor),
            ExecutorSlot::Unavailable(reason) => {
                return Err(RegistryError::ExecutorUnavailable(reason.clone()))
            }
        };
        let scope = executor.cancel_scope();

        let (execution_id, target) = {
            let mut records = self.records.write().await;
            let (execution_id, target) = resolve_cancel_target(&records, scope, identifier)?;
            if let Some(record) = records.get_mut(&execution_id) {
                record.seal(ExecutionStatus::Terminated, None);
            }
            (execution_id, target)
        };
        info!(
            execution_id = %execution_id,
            identifier = %identifier,
            "execution terminated by request"
        );

        match executor.cancel(&target).await {
            Ok(acknowledged) => {
                debug!(
                    execution_id = %execution_id,
                    acknowledged,
                    "cancel relayed to executor"
                );
                Ok(CancelOutcome {
                    execution_id,
                    executor_acknowledged: acknowledged,
                    executor_error: None,
                })
            }
            Err(e) => {
                warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "cancel not delivered to executor"
                );
                Ok(CancelOutcome {
                    execution_id,
                    executor_acknowledged: false,
                    executor_error: Some(e.to_string()),
                })
            }
        }
    }

    /// Point-in-time copies of every tracked record, in start order.
    pub async fn snapshot(&self) -> Vec<ExecutionSnapshot> {
        let records = self.records.read().await;
        let mut ordered: Vec<&ExecutionRecord> = records.values().collect();
        ordered.sort_by_key(|record| record.seq);
        ordered.iter().map(|record| record.to_snapshot()).collect()
    }

    pub async fn find(&self, execution_id: Uuid) -> Option<ExecutionSnapshot> {
        let records = self.records.read().await;
        records.get(&execution_id).map(ExecutionRecord::to_snapshot)
    }

    /// Drop records whose start time has aged past the retention window,
    /// returning how many went.
    pub async fn sweep(&self) -> usize {
        // Saturate rather than wrap on absurd configured retentions.
        let retention_ms = self
            .limits
            .retention_secs
            .checked_mul(1000)
            .and_then(|ms| i64::try_from(ms).ok())
            .unwrap_or(i64::MAX);
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| {
            now.signed_duration_since(record.started_at).num_milliseconds() <= retention_ms
        });
        let swept = before - records.len();
        if swept > 0 {
            info!(swept, remaining = records.len(), "swept aged execution records");
        }
        swept
    }

    pub fn executor_label(&self) -> String {
        self.executor.label().to_string()
    }

    /// One watcher per dispatched execution owns its outcome channel. The
    /// first of verdict-or-deadline seals the record; a dropped channel is
    /// not a verdict, so that case holds out for the deadline too.
    fn spawn_watcher(
        &self,
        execution_id: Uuid,
        deadline: tokio::time::Instant,
        ticket: DispatchTicket,
    ) {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut outcome = ticket.outcome;
            tokio::select! {
                verdict = &mut outcome => match verdict {
                    Ok(ExecutionOutcome::Completed) => {
                        registry
                            .seal(execution_id, ExecutionStatus::Completed, None)
                            .await;
                    }
                    Ok(ExecutionOutcome::Failed(reason)) => {
                        registry
                            .seal(execution_id, ExecutionStatus::Failed, Some(reason))
                            .await;
                    }
                    Err(_) => {
                        tokio::time::sleep_until(deadline).await;
                        registry
                            .seal(execution_id, ExecutionStatus::Completed, None)
                            .await;
                    }
                },
                _ = tokio::time::sleep_until(deadline) => {
                    registry
                        .seal(execution_id, ExecutionStatus::Completed, None)
                        .await;
                }
            }
        });
    }

    /// Apply a terminal transition. No-op when the record was already sealed
    /// by a competing path or swept away.
    async fn seal(&self, execution_id: Uuid, status: ExecutionStatus, error: Option<String>) -> bool {
        let mut records = self.records.write().await;
        match records.get_mut(&execution_id) {
            Some(record) => {
                if record.seal(status, error) {
                    debug!(execution_id = %execution_id, status = %status, "execution sealed");
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }
}

fn resolve_cancel_target(
    records: &HashMap<Uuid, ExecutionRecord>,
    scope: CancelScope,
    identifier: &str,
) -> Result<(Uuid, CancelTarget), RegistryError> {
    match scope {
        CancelScope::Execution => {
            let execution_id = Uuid::parse_str(identifier)
                .map_err(|_| RegistryError::NotFound(identifier.to_string()))?;
            let record = records
                .get(&execution_id)
                .ok_or_else(|| RegistryError::NotFound(identifier.to_string()))?;
            if record.status.is_terminal() {
                return Err(RegistryError::NotRunning {
                    identifier: identifier.to_string(),
                    status: record.status,
                });
            }
            Ok((execution_id, CancelTarget::Execution(execution_id)))
        }
        CancelScope::Context => {
            let newest_running = records
                .values()
                .filter(|r| r.context_id == identifier && r.status == ExecutionStatus::Running)
                .max_by_key(|r| r.seq);
            if let Some(record) = newest_running {
                return Ok((
                    record.execution_id,
                    CancelTarget::Context(identifier.to_string()),
                ));
            }
            // Nothing running; report against the newest record so the caller
            // sees which terminal state the context reached.
            let newest = records
                .values()
                .filter(|r| r.context_id == identifier)
                .max_by_key(|r| r.seq);
            match newest {
                Some(record) => Err(RegistryError::NotRunning {
                    identifier: identifier.to_string(),
                    status: record.status,
                }),
                None => Err(RegistryError::NotFound(identifier.to_string())),
            }
        }
    }
}
