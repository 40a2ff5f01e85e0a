//! Local process executor.
//!
//! Runs each script as an interpreter child process (`node -e <body>` by
//! default). Cancellation is scoped per execution: the child gets SIGTERM,
//! then SIGKILL if it lingers.

use super::{
    CancelScope, CancelTarget, DispatchJob, DispatchTicket, ExecutionOutcome, ExecutorError,
    ScriptExecutor,
};
use crate::config::ProcessExecutorConfig;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

/// How long a SIGTERM'd child gets before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(5);

/// Environment handed to every spawned script.
const ENV_EXECUTION_ID: &str = "WARDEN_EXECUTION_ID";
const ENV_CONTEXT_ID: &str = "WARDEN_CONTEXT_ID";

pub struct ProcessExecutor {
    interpreter: String,
    args: Vec<String>,
    /// Kill switches for children still running, by execution id.
    running: Arc<Mutex<HashMap<Uuid, oneshot::Sender<()>>>>,
}

impl ProcessExecutor {
    pub fn new(config: &ProcessExecutorConfig) -> Result<Self, ExecutorError> {
        if config.interpreter.is_empty() {
            return Err(ExecutorError::Unavailable(
                "process executor has no interpreter configured".to_string(),
            ));
        }
        if !interpreter_available(&config.interpreter) {
            return Err(ExecutorError::Unavailable(format!(
                "interpreter '{}' not found",
                config.interpreter
            )));
        }
        Ok(Self {
            interpreter: config.interpreter.clone(),
            args: config.args.clone(),
            running: Arc::new(Mutex::new(HashMap::new())),
        })
    }
}

#[async_trait]
impl ScriptExecutor for ProcessExecutor {
    fn label(&self) -> &'static str {
        "process"
    }

    fn cancel_scope(&self) -> CancelScope {
        CancelScope::Execution
    }

    async fn dispatch(&self, job: DispatchJob) -> Result<DispatchTicket, ExecutorError> {
        let mut command = Command::new(&self.interpreter);
        command
            .args(&self.args)
            .arg(&job.body)
            .env(ENV_EXECUTION_ID, job.execution_id.to_string())
            .env(ENV_CONTEXT_ID, &job.context_id)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command.spawn().map_err(|e| {
            ExecutorError::Dispatch(format!("failed to spawn '{}': {}", self.interpreter, e))
        })?;

        debug!(execution_id = %job.execution_id, pid = ?child.id(), "spawned interpreter");

        let (kill_tx, kill_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        {
            let mut running = self.running.lock().await;
            running.insert(job.execution_id, kill_tx);
        }
        tokio::spawn(monitor_child(
            job.execution_id,
            child,
            kill_rx,
            outcome_tx,
            Arc::clone(&self.running),
        ));

        Ok(DispatchTicket {
            outcome: outcome_rx,
        })
    }

    async fn cancel(&self, target: &CancelTarget) -> Result<bool, ExecutorError> {
        let execution_id = match target {
            CancelTarget::Execution(id) => *id,
            CancelTarget::Context(_) => {
                return Err(ExecutorError::Cancel(
                    "process executor cancels by execution id, not context".to_string(),
                ))
            }
        };
        let kill_tx = {
            let mut running = self.running.lock().await;
            running.remove(&execution_id)
        };
        match kill_tx {
            Some(tx) => Ok(tx.send(()).is_ok()),
            // Child already exited; nothing left to stop.
            None => Ok(false),
        }
    }
}

/// Waits out one child. A kill signal terminates it without a verdict (the
/// registry has already sealed the record by then); a natural exit reports
/// its outcome.
async fn monitor_child(
    execution_id: Uuid,
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    outcome_tx: oneshot::Sender<ExecutionOutcome>,
    running: Arc<Mutex<HashMap<Uuid, oneshot::Sender<()>>>>,
) {
    tokio::select! {
        biased;
        _ = kill_rx => {
            debug!(execution_id = %execution_id, "terminating child on cancel");
            terminate_child(&mut child).await;
        }
        status = child.wait() => {
            let outcome = match status {
                Ok(status) if status.success() => ExecutionOutcome::Completed,
                Ok(status) => {
                    ExecutionOutcome::Failed(format!("interpreter exited abnormally ({})", status))
                }
                Err(e) => ExecutionOutcome::Failed(format!("failed to reap interpreter: {}", e)),
            };
            let _ = outcome_tx.send(outcome);
        }
    }
    running.lock().await.remove(&execution_id);
}

/// SIGTERM, a short wait, then SIGKILL if the child is still around.
async fn terminate_child(child: &mut Child) {
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as i32, libc::SIGTERM);
        }
        if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_ok() {
            return;
        }
        warn!(pid, "child ignored SIGTERM, killing");
    }
    let _ = child.kill().await;
}

fn interpreter_available(name: &str) -> bool {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return candidate.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(name).is_file()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh_executor() -> ProcessExecutor {
        ProcessExecutor::new(&ProcessExecutorConfig {
            interpreter: "sh".to_string(),
            args: vec!["-c".to_string()],
        })
        .unwrap()
    }

    fn job(body: &str) -> DispatchJob {
        DispatchJob {
            execution_id: Uuid::new_v4(),
            context_id: "ctx-test".to_string(),
            body: body.to_string(),
            duration_ms: 5000,
        }
    }

    #[test]
    fn test_missing_interpreter_rejected() {
        let result = ProcessExecutor::new(&ProcessExecutorConfig {
            interpreter: "no-such-interpreter-anywhere".to_string(),
            args: vec![],
        });
        assert!(matches!(result, Err(ExecutorError::Unavailable(_))));
    }

    #[test]
    fn test_empty_interpreter_rejected() {
        let result = ProcessExecutor::new(&ProcessExecutorConfig {
            interpreter: String::new(),
            args: vec![],
        });
        assert!(matches!(result, Err(ExecutorError::Unavailable(_))));
    }

    #[test]
    fn test_interpreter_lookup() {
        assert!(interpreter_available("sh"));
        assert!(!interpreter_available("no-such-interpreter-anywhere"));
    }

    #[tokio::test]
    async fn test_clean_exit_reports_completed() {
        let executor = sh_executor();
        let ticket = executor.dispatch(job("exit 0")).await.unwrap();
        assert_eq!(ticket.outcome.await.unwrap(), ExecutionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_failed() {
        let executor = sh_executor();
        let ticket = executor.dispatch(job("exit 3")).await.unwrap();
        match ticket.outcome.await.unwrap() {
            ExecutionOutcome::Failed(reason) => assert!(reason.contains("3"), "{}", reason),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_script_sees_execution_env() {
        let executor = sh_executor();
        let ticket = executor
            .dispatch(job(
                "test -n \"$WARDEN_EXECUTION_ID\" && test -n \"$WARDEN_CONTEXT_ID\"",
            ))
            .await
            .unwrap();
        assert_eq!(ticket.outcome.await.unwrap(), ExecutionOutcome::Completed);
    }

    #[tokio::test]
    async fn test_cancel_kills_running_child() {
        let executor = sh_executor();
        let dispatched = job("sleep 30");
        let execution_id = dispatched.execution_id;
        let ticket = executor.dispatch(dispatched).await.unwrap();

        let delivered = executor
            .cancel(&CancelTarget::Execution(execution_id))
            .await
            .unwrap();
        assert!(delivered);

        // The monitor drops the outcome sender without a verdict.
        assert!(ticket.outcome.await.is_err());

        let second = executor
            .cancel(&CancelTarget::Execution(execution_id))
            .await
            .unwrap();
        assert!(!second);
    }

    #[tokio::test]
    async fn test_cancel_after_exit_reports_nothing_to_stop() {
        let executor = sh_executor();
        let dispatched = job("exit 0");
        let execution_id = dispatched.execution_id;
        let ticket = executor.dispatch(dispatched).await.unwrap();
        assert_eq!(ticket.outcome.await.unwrap(), ExecutionOutcome::Completed);

        let delivered = executor
            .cancel(&CancelTarget::Execution(execution_id))
            .await
            .unwrap();
        assert!(!delivered);
    }

    #[tokio::test]
    async fn test_context_target_rejected() {
        let executor = sh_executor();
        let result = executor
            .cancel(&CancelTarget::Context("ctx-test".to_string()))
            .await;
        assert!(matches!(result, Err(ExecutorError::Cancel(_))));
    }
}
