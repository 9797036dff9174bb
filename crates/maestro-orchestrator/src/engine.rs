use crate::aggregator::ResultAggregator;
use crate::monitor::SpecialistMonitor;
use crate::types::{Run, RunEvent, RunId, RunStatus};
use futures_util::FutureExt;
use maestro_agent::{Decision, ReasoningStep, RunConfig};
use maestro_core::{FailureReason, InvocationFailure, ToolInvocation, ToolResult};
use maestro_skills::SpecialistRegistry;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Drives a single run from `Queued` to `Completed` or `Failed`.
///
/// Each iteration calls the reasoning step once. A tool-requesting decision
/// dispatches every request concurrently and waits for all of them (or the
/// step deadline) before the next iteration. Results enter the context in
/// the order the invocations were created.
pub struct RunStateMachine {
    registry: Arc<SpecialistRegistry>,
    reasoner: Arc<dyn ReasoningStep>,
    config: RunConfig,
    cancel: CancellationToken,
    status_tx: watch::Sender<RunStatus>,
    events: Option<broadcast::Sender<RunEvent>>,
    monitor: Option<Arc<SpecialistMonitor>>,
    run: Run,
}

impl RunStateMachine {
    pub fn new(
        run_id: RunId,
        query: impl Into<String>,
        registry: Arc<SpecialistRegistry>,
        reasoner: Arc<dyn ReasoningStep>,
        config: RunConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(RunStatus::Queued);
        Self {
            registry,
            reasoner,
            config,
            cancel: CancellationToken::new(),
            status_tx,
            events: None,
            monitor: None,
            run: Run::with_id(run_id, query),
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_events(mut self, events: broadcast::Sender<RunEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<SpecialistMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn run_id(&self) -> RunId {
        self.run.id
    }

    /// Receiver that observes every status change of this run.
    pub fn status_watch(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    /// Execute the run to a terminal status and return it.
    pub async fn run(mut self) -> Run {
        let run_id = self.run.id;
        let limit = self.config.max_iterations;
        let specialists = self.registry.bindings();
        info!(
            run_id = %run_id,
            query = %self.run.context.query(),
            specialists = specialists.len(),
            max_iterations = limit,
            "Run started"
        );

        loop {
            if self.cancel.is_cancelled() {
                return self.fail(FailureReason::Cancelled);
            }
            self.transition(RunStatus::Reasoning);
            self.run.iterations += 1;
            let step = self.run.iterations;
            debug!(run_id = %run_id, step, "Reasoning");

            let cancel = self.cancel.clone();
            let reasoner = Arc::clone(&self.reasoner);
            let decided = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                decided = AssertUnwindSafe(reasoner.decide(&self.run.context, &specialists))
                    .catch_unwind() => Some(decided),
            };
            let Some(decided) = decided else {
                info!(run_id = %run_id, step, "Run cancelled during reasoning");
                return self.fail(FailureReason::Cancelled);
            };
            let decision = match decided {
                Ok(Ok(decision)) => decision,
                Ok(Err(e)) => Decision::failure(e.to_string()),
                Err(_) => {
                    error!(run_id = %run_id, step, "Reasoning step panicked");
                    Decision::failure("reasoning step panicked")
                }
            };
            let kind = decision.kind();

            match decision {
                Decision::FinalAnswer { text } => {
                    self.run.context.push_answer(step, text);
                    self.emit_step(step, kind, 0, 0);
                    return self.finish(RunStatus::Completed);
                }
                Decision::ReasoningFailure { reason } => {
                    warn!(run_id = %run_id, step, reason = %reason, "Reasoning failed");
                    self.emit_step(step, kind, 0, 0);
                    return self.fail(FailureReason::ReasoningFailure { reason });
                }
                Decision::ToolRequests { requests, .. } if requests.is_empty() => {
                    self.emit_step(step, kind, 0, 0);
                    return self.fail(FailureReason::ReasoningFailure {
                        reason: "no tool requests".to_string(),
                    });
                }
                Decision::ToolRequests { .. } if step >= limit => {
                    warn!(run_id = %run_id, step, limit, "Iteration limit reached with tools still requested");
                    self.emit_step(step, kind, 0, 0);
                    return self.fail(FailureReason::IterationLimitExceeded { limit });
                }
                Decision::ToolRequests {
                    rationale,
                    requests,
                } => {
                    let invocations = self.run.context.record_requests(
                        step,
                        rationale,
                        requests
                            .into_iter()
                            .map(|r| (r.specialist_id, r.arguments))
                            .collect(),
                    );
                    let dispatched = invocations.len();
                    self.transition(RunStatus::AwaitingTools);

                    let Some(results) = self.await_tools(step, invocations).await else {
                        info!(run_id = %run_id, step, "Run cancelled while awaiting tools");
                        return self.fail(FailureReason::Cancelled);
                    };
                    let failures = results.iter().filter(|r| r.is_error()).count();
                    for result in results {
                        if let Err(e) = self.run.context.push_result(result) {
                            error!(run_id = %run_id, step, error = %e, "Could not record result");
                            return self.fail(FailureReason::Internal {
                                reason: e.to_string(),
                            });
                        }
                    }
                    info!(
                        run_id = %run_id,
                        step,
                        invocations = dispatched,
                        failures,
                        "Step completed"
                    );
                    self.emit_step(step, kind, dispatched, failures);
                }
            }
        }
    }

    /// Fan out one step's invocations and wait for all of them.
    ///
    /// Returns `None` if the run was cancelled. In-flight invocations are
    /// detached rather than aborted, and their results are discarded.
    async fn await_tools(
        &self,
        step: u32,
        invocations: Vec<ToolInvocation>,
    ) -> Option<Vec<ToolResult>> {
        let mut aggregator = ResultAggregator::new(invocations.clone());
        let mut tasks = JoinSet::new();
        let mut by_task = HashMap::new();
        let timeout = self.config.invocation_timeout();

        for invocation in invocations {
            if let Some(monitor) = &self.monitor {
                monitor.start_invocation(&invocation.specialist_id).await;
            }
            let registry = Arc::clone(&self.registry);
            let task_invocation = invocation.clone();
            let handle =
                tasks.spawn(async move { registry.invoke(&task_invocation, timeout).await });
            by_task.insert(handle.id(), invocation);
        }

        let deadline = tokio::time::sleep(self.config.step_timeout());
        tokio::pin!(deadline);

        // Ready results are taken before the deadline is checked.
        while !aggregator.is_complete() {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tasks.detach_all();
                    if let Some(monitor) = &self.monitor {
                        for invocation in aggregator.unresolved() {
                            monitor.abandon(&invocation.specialist_id).await;
                        }
                    }
                    return None;
                }
                joined = tasks.join_next_with_id() => {
                    let result = match joined {
                        Some(Ok((id, result))) => {
                            by_task.remove(&id);
                            result
                        }
                        Some(Err(join_err)) => {
                            let Some(invocation) = by_task.remove(&join_err.id()) else {
                                continue;
                            };
                            error!(
                                run_id = %self.run.id,
                                specialist = %invocation.specialist_id,
                                error = %join_err,
                                "Specialist task panicked"
                            );
                            ToolResult::failure(
                                &invocation,
                                InvocationFailure::Specialist {
                                    reason: "specialist task panicked".to_string(),
                                },
                            )
                        }
                        None => break,
                    };
                    if let Some(monitor) = &self.monitor {
                        monitor.finish_invocation(&result).await;
                    }
                    if let Err(e) = aggregator.accept(result) {
                        warn!(run_id = %self.run.id, step, error = %e, "Discarded result");
                    }
                }
                _ = &mut deadline => {
                    warn!(
                        run_id = %self.run.id,
                        step,
                        unresolved = aggregator.len() - aggregator.resolved_count(),
                        "Step timeout elapsed with invocations outstanding"
                    );
                    tasks.detach_all();
                    break;
                }
            }
        }

        let unresolved: HashSet<Uuid> = aggregator.unresolved().iter().map(|inv| inv.id).collect();
        let results = aggregator.finish(self.config.step_timeout_ms);
        if let Some(monitor) = &self.monitor {
            for result in results.iter().filter(|r| unresolved.contains(&r.invocation_id)) {
                monitor.finish_invocation(result).await;
            }
        }
        Some(results)
    }

    fn transition(&mut self, next: RunStatus) -> bool {
        if !self.run.status.can_transition_to(&next) {
            error!(
                run_id = %self.run.id,
                from = %self.run.status,
                to = %next,
                "Illegal run status transition"
            );
            return false;
        }
        debug!(run_id = %self.run.id, from = %self.run.status, to = %next, "Run status changed");
        self.run.status = next.clone();
        self.status_tx.send_replace(next);
        true
    }

    fn fail(self, reason: FailureReason) -> Run {
        self.finish(RunStatus::Failed { reason })
    }

    fn finish(mut self, status: RunStatus) -> Run {
        self.transition(status);
        if self.run.ended_at.is_none() {
            self.run.ended_at = Some(chrono::Utc::now());
        }
        match &self.run.status {
            RunStatus::Failed { reason } => warn!(
                run_id = %self.run.id,
                iterations = self.run.iterations,
                reason = %reason,
                "Run failed"
            ),
            status => info!(
                run_id = %self.run.id,
                iterations = self.run.iterations,
                duration_ms = self.run.duration_ms().unwrap_or(0),
                status = %status,
                "Run finished"
            ),
        }
        self.emit(RunEvent::RunFinished {
            run_id: self.run.id,
            status: self.run.status.clone(),
        });
        self.run
    }

    fn emit_step(&self, step: u32, decision: &str, invocations: usize, failures: usize) {
        self.emit(RunEvent::StepCompleted {
            run_id: self.run.id,
            step,
            decision: decision.to_string(),
            invocations,
            failures,
        });
    }

    fn emit(&self, event: RunEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }
}
