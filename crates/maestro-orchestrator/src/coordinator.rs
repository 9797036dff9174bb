use crate::engine::RunStateMachine;
use crate::monitor::SpecialistMonitor;
use crate::runs::RunTable;
use crate::types::{FinalAnswer, Run, RunEvent, RunId, RunStatus};
use maestro_agent::{ReasoningStep, RunConfig};
use maestro_core::{MaestroError, MaestroResult};
use maestro_skills::SpecialistRegistry;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// Public entry point: one query in, one [`FinalAnswer`] (or failure) out.
///
/// Holds the shared specialist registry and reasoning step. Each submitted
/// query gets its own [`RunStateMachine`] on a separate task, so runs never
/// share context or results.
pub struct OrchestrationCoordinator {
    registry: Arc<SpecialistRegistry>,
    reasoner: Arc<dyn ReasoningStep>,
    config: RunConfig,
    monitor: Arc<SpecialistMonitor>,
    events: broadcast::Sender<RunEvent>,
    runs: Arc<RunTable>,
}

impl OrchestrationCoordinator {
    pub fn new(
        registry: SpecialistRegistry,
        reasoner: Arc<dyn ReasoningStep>,
        config: RunConfig,
    ) -> MaestroResult<Self> {
        Self::with_shared_registry(Arc::new(registry), reasoner, config)
    }

    pub fn with_shared_registry(
        registry: Arc<SpecialistRegistry>,
        reasoner: Arc<dyn ReasoningStep>,
        config: RunConfig,
    ) -> MaestroResult<Self> {
        config.validate()?;
        let monitor = Arc::new(SpecialistMonitor::new(
            registry.list().into_iter().map(|b| b.id.clone()),
        ));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            registry,
            reasoner,
            config,
            monitor,
            events,
            runs: Arc::new(RunTable::new()),
        })
    }

    pub fn registry(&self) -> &Arc<SpecialistRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn monitor(&self) -> &Arc<SpecialistMonitor> {
        &self.monitor
    }

    /// Receive step and run completion events of every run.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Run a query to completion.
    ///
    /// Dropping the returned future cancels the run and its result is
    /// discarded once it finishes.
    pub async fn submit(&self, query: impl Into<String>) -> MaestroResult<FinalAnswer> {
        self.submit_with_cancel(query, CancellationToken::new()).await
    }

    /// Run a query to completion, cancelling it when `token` fires.
    pub async fn submit_with_cancel(
        &self,
        query: impl Into<String>,
        token: CancellationToken,
    ) -> MaestroResult<FinalAnswer> {
        let handle = self.start_with_cancel(query, token.child_token());
        let mut guard = DiscardOnDrop {
            run_id: handle.run_id,
            cancel: handle.cancel.clone(),
            runs: Arc::clone(&self.runs),
            armed: true,
        };
        let result = handle.wait().await;
        guard.armed = false;
        result
    }

    /// Start a run in the background and return a handle to it.
    pub fn start(&self, query: impl Into<String>) -> RunHandle {
        self.start_with_cancel(query, CancellationToken::new())
    }

    pub fn start_with_cancel(&self, query: impl Into<String>, token: CancellationToken) -> RunHandle {
        let run_id = Uuid::new_v4();
        let machine = RunStateMachine::new(
            run_id,
            query,
            Arc::clone(&self.registry),
            Arc::clone(&self.reasoner),
            self.config.clone(),
        )
        .with_cancellation(token.clone())
        .with_events(self.events.clone())
        .with_monitor(Arc::clone(&self.monitor));

        let status = machine.status_watch();
        self.runs.insert(run_id, token.clone(), status.clone());
        info!(run_id = %run_id, active = self.runs.active_count(), "Run submitted");

        let runs = Arc::clone(&self.runs);
        let join = tokio::spawn(async move {
            let run = machine.run().await;
            runs.complete(run);
        });

        RunHandle {
            run_id,
            cancel: token,
            status,
            join,
            runs: Arc::clone(&self.runs),
        }
    }

    /// Request cancellation of a live run. Returns false if the run is
    /// unknown or already finished.
    pub fn cancel(&self, run_id: RunId) -> bool {
        let cancelled = self.runs.cancel(run_id);
        if cancelled {
            info!(run_id = %run_id, "Run cancellation requested");
        }
        cancelled
    }

    pub fn status(&self, run_id: RunId) -> Option<RunStatus> {
        self.runs.status(run_id)
    }

    /// Take a finished run whose handle was dropped without waiting.
    pub fn take_run(&self, run_id: RunId) -> Option<Run> {
        self.runs.take(run_id)
    }

    pub fn active_runs(&self) -> usize {
        self.runs.active_count()
    }

    /// Runs still held in the table, live or finished but not yet taken.
    pub fn tracked_runs(&self) -> usize {
        self.runs.len()
    }
}

/// Cancels a submitted run whose caller stopped waiting for it.
struct DiscardOnDrop {
    run_id: RunId,
    cancel: CancellationToken,
    runs: Arc<RunTable>,
    armed: bool,
}

impl Drop for DiscardOnDrop {
    fn drop(&mut self) {
        if self.armed {
            warn!(run_id = %self.run_id, "Submit dropped before completion, cancelling run");
            self.cancel.cancel();
            self.runs.discard_on_finish(self.run_id);
        }
    }
}

/// Handle to a run started with [`OrchestrationCoordinator::start`].
///
/// Dropping the handle does not stop the run; its result stays available
/// through [`OrchestrationCoordinator::take_run`].
pub struct RunHandle {
    run_id: RunId,
    cancel: CancellationToken,
    status: watch::Receiver<RunStatus>,
    join: JoinHandle<()>,
    runs: Arc<RunTable>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    /// Receiver that observes every status change of this run.
    pub fn status_watch(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    /// Wait until the run reaches `Completed` or `Failed`.
    pub async fn wait_terminal(&mut self) -> RunStatus {
        if let Ok(status) = self.status.wait_for(RunStatus::is_terminal).await {
            return status.clone();
        }
        self.status.borrow().clone()
    }

    /// Wait for the run to finish and convert it into an answer.
    pub async fn wait(self) -> MaestroResult<FinalAnswer> {
        if let Err(e) = self.join.await {
            self.runs.remove(self.run_id);
            return Err(MaestroError::Orchestrator(format!(
                "run {} task failed: {e}",
                self.run_id
            )));
        }
        self.runs
            .take(self.run_id)
            .ok_or_else(|| {
                MaestroError::Orchestrator(format!("run {} was already taken", self.run_id))
            })?
            .into_answer()
    }
}
