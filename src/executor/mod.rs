//! Script executors.
//!
//! The registry never talks to a script runtime directly; it drives one of
//! the implementations behind the `ScriptExecutor` trait:
//! - `process`: scripts run as local interpreter child processes
//! - `bridge`: scripts are forwarded to a remote execution bridge over HTTP

pub mod bridge;
pub mod process;

pub use bridge::BridgeExecutor;
pub use process::ProcessExecutor;

use crate::config::{ExecutorConfig, ExecutorKind};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::oneshot;
use uuid::Uuid;

/// How an executor's cancel calls identify their target.
///
/// A deployment runs one executor, so exactly one scheme is ever in effect;
/// the registry resolves cancel identifiers against whichever one the
/// configured executor declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelScope {
    /// Cancel calls name a single execution.
    Execution,
    /// Cancel calls name a context; the newest running execution in that
    /// context is the one stopped.
    Context,
}

/// Everything an executor needs to start a script.
#[derive(Debug, Clone)]
pub struct DispatchJob {
    pub execution_id: Uuid,
    pub context_id: String,
    /// Fully rendered script body.
    pub body: String,
    pub duration_ms: u64,
}

/// Cancel call argument, shaped by the executor's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelTarget {
    Execution(Uuid),
    Context(String),
}

/// Terminal verdict reported back by an executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Failed(String),
}

/// Receipt for an accepted dispatch.
///
/// The `outcome` channel carries the execution's verdict when the executor
/// learns it. An executor that drops the sender without reporting leaves the
/// registry to conclude the record at its fallback deadline.
#[derive(Debug)]
pub struct DispatchTicket {
    pub outcome: oneshot::Receiver<ExecutionOutcome>,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The executor cannot be constructed or reached at all.
    #[error("{0}")]
    Unavailable(String),
    /// The executor refused or failed to start this job.
    #[error("{0}")]
    Dispatch(String),
    /// A cancel request could not be delivered.
    #[error("{0}")]
    Cancel(String),
}

/// Capability surface the registry drives.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Short name for logs and health output.
    fn label(&self) -> &'static str;

    /// Identification scheme this executor's cancel calls use.
    fn cancel_scope(&self) -> CancelScope;

    /// Start the script. `Ok` means the executor accepted the work; it says
    /// nothing about the script's eventual fate.
    async fn dispatch(&self, job: DispatchJob) -> Result<DispatchTicket, ExecutorError>;

    /// Deliver a cancel request. `Ok(true)` means the executor acknowledged
    /// it, `Ok(false)` means it had nothing left to stop. Neither implies the
    /// script actually died.
    async fn cancel(&self, target: &CancelTarget) -> Result<bool, ExecutorError>;
}

/// The executor a registry runs with, or the reason there is none.
///
/// Misconfiguration is not fatal at boot: an unavailable slot keeps the
/// daemon serving reads while every start attempt reports the reason.
#[derive(Clone)]
pub enum ExecutorSlot {
    Ready(Arc<dyn ScriptExecutor>),
    Unavailable(String),
}

impl ExecutorSlot {
    pub fn label(&self) -> &str {
        match self {
            ExecutorSlot::Ready(executor) => executor.label(),
            ExecutorSlot::Unavailable(_) => "unavailable",
        }
    }
}

/// Build the executor named by the configuration.
pub fn build_executor(config: &ExecutorConfig) -> ExecutorSlot {
    match config.kind {
        ExecutorKind::Process => match ProcessExecutor::new(&config.process) {
            Ok(executor) => ExecutorSlot::Ready(Arc::new(executor)),
            Err(e) => ExecutorSlot::Unavailable(e.to_string()),
        },
        ExecutorKind::Bridge => match BridgeExecutor::new(&config.bridge) {
            Ok(executor) => ExecutorSlot::Ready(Arc::new(executor)),
            Err(e) => ExecutorSlot::Unavailable(e.to_string()),
        },
        ExecutorKind::Disabled => {
            ExecutorSlot::Unavailable("script execution is disabled (executor kind \"none\")".to_string())
        }
    }
}
