//! Registry lifecycle tests against the public API, including the timing
//! behavior of fallback completion under a paused clock.

use scriptwarden::config::LimitsConfig;
use scriptwarden::executor::{
    CancelScope, CancelTarget, DispatchJob, DispatchTicket, ExecutionOutcome, ExecutorError,
    ExecutorSlot, ScriptExecutor,
};
use scriptwarden::registry::{
    ExecutionRegistry, ExecutionStatus, RegistryError, ScriptSource, StartRequest,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Executor double that accepts every dispatch and never reports on its own.
/// Tests either resolve the parked sender by hand or configure the executor
/// to drop it outright.
struct SilentExecutor {
    drop_senders: bool,
    senders: Mutex<Vec<(Uuid, oneshot::Sender<ExecutionOutcome>)>>,
    cancels: Mutex<Vec<CancelTarget>>,
}

impl SilentExecutor {
    fn holding() -> Arc<Self> {
        Arc::new(Self {
            drop_senders: false,
            senders: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
        })
    }

    fn dropping() -> Arc<Self> {
        Arc::new(Self {
            drop_senders: true,
            senders: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
        })
    }

    fn resolve(&self, execution_id: Uuid, outcome: ExecutionOutcome) {
        let mut senders = self.senders.lock().unwrap();
        let position = senders
            .iter()
            .position(|(id, _)| *id == execution_id)
            .expect("no pending dispatch for execution");
        let (_, tx) = senders.remove(position);
        tx.send(outcome).unwrap();
    }

    fn cancel_count(&self) -> usize {
        self.cancels.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ScriptExecutor for SilentExecutor {
    fn label(&self) -> &'static str {
        "silent"
    }

    fn cancel_scope(&self) -> CancelScope {
        CancelScope::Execution
    }

    async fn dispatch(&self, job: DispatchJob) -> Result<DispatchTicket, ExecutorError> {
        let (tx, rx) = oneshot::channel();
        if !self.drop_senders {
            self.senders.lock().unwrap().push((job.execution_id, tx));
        }
        Ok(DispatchTicket { outcome: rx })
    }

    async fn cancel(&self, target: &CancelTarget) -> Result<bool, ExecutorError> {
        self.cancels.lock().unwrap().push(target.clone());
        Ok(true)
    }
}

fn registry(executor: Arc<SilentExecutor>) -> ExecutionRegistry {
    ExecutionRegistry::new(LimitsConfig::default(), ExecutorSlot::Ready(executor))
}

fn start_request(duration_ms: u64) -> StartRequest {
    StartRequest {
        context_id: "tab-1".to_string(),
        source: ScriptSource::Template("busy-loop".to_string()),
        duration_ms,
    }
}

async fn status_of(registry: &ExecutionRegistry, execution_id: Uuid) -> ExecutionStatus {
    registry.find(execution_id).await.unwrap().status
}

#[tokio::test]
async fn test_cancel_lifecycle_end_to_end() {
    let executor = SilentExecutor::holding();
    let registry = registry(Arc::clone(&executor));

    let handle = registry.start(start_request(5000)).await.unwrap();

    let listed = registry.snapshot().await;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].execution_id, handle.execution_id);
    assert_eq!(listed[0].payload_label, "busy-loop");
    assert_eq!(listed[0].requested_duration_ms, 5000);
    assert_eq!(listed[0].status, ExecutionStatus::Running);
    assert!(listed[0].ended_at.is_none());

    let outcome = registry
        .cancel(&handle.execution_id.to_string())
        .await
        .unwrap();
    assert!(outcome.executor_acknowledged);
    assert_eq!(executor.cancel_count(), 1);

    let record = registry.find(handle.execution_id).await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Terminated);
    let ended_at = record.ended_at.expect("terminated record has an end time");
    assert!(ended_at >= record.started_at);

    // A terminated record stays visible and cannot be cancelled again.
    assert_eq!(registry.snapshot().await.len(), 1);
    assert!(matches!(
        registry.cancel(&handle.execution_id.to_string()).await,
        Err(RegistryError::NotRunning { .. })
    ));
    assert_eq!(executor.cancel_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_fallback_completion_waits_out_the_window() {
    let executor = SilentExecutor::holding();
    let registry = registry(executor);

    let handle = registry.start(start_request(5000)).await.unwrap();

    // Just before the requested window closes: still running.
    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(
        status_of(&registry, handle.execution_id).await,
        ExecutionStatus::Running
    );

    // Inside the grace margin: still running.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(
        status_of(&registry, handle.execution_id).await,
        ExecutionStatus::Running
    );

    // Past duration + grace: the fallback sealed it as completed.
    tokio::time::sleep(Duration::from_millis(700)).await;
    let record = registry.find(handle.execution_id).await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert!(record.ended_at.is_some());
    assert!(record.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_lost_outcome_channel_still_waits_for_deadline() {
    let executor = SilentExecutor::dropping();
    let registry = registry(executor);

    let handle = registry.start(start_request(5000)).await.unwrap();

    // The executor dropped its reporting channel immediately, but that is
    // not a verdict; the record must hold until the fallback deadline.
    tokio::time::sleep(Duration::from_millis(5900)).await;
    assert_eq!(
        status_of(&registry, handle.execution_id).await,
        ExecutionStatus::Running
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        status_of(&registry, handle.execution_id).await,
        ExecutionStatus::Completed
    );
}

#[tokio::test(start_paused = true)]
async fn test_executor_verdict_beats_the_deadline() {
    let executor = SilentExecutor::holding();
    let registry = registry(Arc::clone(&executor));

    let handle = registry.start(start_request(5000)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    executor.resolve(handle.execution_id, ExecutionOutcome::Completed);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let record = registry.find(handle.execution_id).await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    let sealed_at = record.ended_at.unwrap();

    // The deadline passing later must not reseal the record.
    tokio::time::sleep(Duration::from_secs(10)).await;
    let record = registry.find(handle.execution_id).await.unwrap();
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.ended_at.unwrap(), sealed_at);
}

#[tokio::test]
async fn test_sweep_honors_retention_window() {
    let executor = SilentExecutor::holding();
    let limits = LimitsConfig {
        retention_secs: 0,
        ..LimitsConfig::default()
    };
    let registry = ExecutionRegistry::new(limits, ExecutorSlot::Ready(executor));

    let handle = registry.start(start_request(5000)).await.unwrap();
    registry
        .cancel(&handle.execution_id.to_string())
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(registry.sweep().await, 1);
    assert!(registry.snapshot().await.is_empty());
    assert!(registry.find(handle.execution_id).await.is_none());
}
