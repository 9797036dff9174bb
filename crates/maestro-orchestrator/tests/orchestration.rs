#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use maestro_agent::{
    ConversationContext, Decision, ReasoningStep, RunConfig, StagedConfig, StagedReasoner,
    ToolRequest,
};
use maestro_builtins::{CatalogEntry, CatalogSpecialist, CodeMetricsSpecialist, RepositoryMetrics};
use maestro_core::{FailureReason, InvocationFailure, MaestroError, MaestroResult, ToolResult};
use maestro_orchestrator::{OrchestrationCoordinator, RunEvent, RunStatus};
use maestro_skills::{FnSpecialist, SpecialistBinding, SpecialistRegistry};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

type DecideFn = dyn Fn(&ConversationContext, &[SpecialistBinding]) -> Decision + Send + Sync;

/// Reasoner driven by a plain closure; counts how often it is asked.
struct FnReasoner {
    decide: Box<DecideFn>,
    calls: AtomicU32,
}

impl FnReasoner {
    fn new(
        f: impl Fn(&ConversationContext, &[SpecialistBinding]) -> Decision + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            decide: Box::new(f),
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningStep for FnReasoner {
    async fn decide(
        &self,
        context: &ConversationContext,
        specialists: &[SpecialistBinding],
    ) -> MaestroResult<Decision> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.decide)(context, specialists))
    }
}

/// Request every listed specialist on the first step, answer afterwards.
fn ask_once(ids: &'static [&'static str]) -> Arc<FnReasoner> {
    FnReasoner::new(move |ctx, _| {
        if ctx.invocations().next().is_none() {
            Decision::tools(
                ids.iter()
                    .map(|id| ToolRequest::new(*id, serde_json::json!({ "query": ctx.query() })))
                    .collect(),
            )
        } else {
            let parts: Vec<String> = ctx
                .results()
                .map(|r| match r.output() {
                    Some(out) => format!("{}={out}", r.specialist_id),
                    None => format!("{}=!", r.specialist_id),
                })
                .collect();
            Decision::answer(parts.join(";"))
        }
    })
}

fn constant(id: &str, output: &str) -> Arc<FnSpecialist> {
    Arc::new(FnSpecialist::constant(
        SpecialistBinding::new(id, id, "test specialist"),
        output,
    ))
}

fn delayed(id: &str, millis: u64) -> Arc<FnSpecialist> {
    let output = format!("{id} done");
    Arc::new(FnSpecialist::new(
        SpecialistBinding::new(id, id, "slow test specialist"),
        move |_| {
            let output = output.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(output)
            }
        },
    ))
}

fn failing(id: &str, reason: &'static str) -> Arc<FnSpecialist> {
    Arc::new(FnSpecialist::new(
        SpecialistBinding::new(id, id, "always fails"),
        move |_| async move { Err(MaestroError::Specialist(reason.to_string())) },
    ))
}

fn results_of(turns: &[maestro_core::Turn]) -> Vec<&ToolResult> {
    turns.iter().filter_map(|t| t.as_result()).collect()
}

// ---------------------------------------------------------------------------
// 1. Fan-out to three specialists, fan-in, final answer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn three_specialists_fan_out_and_in() {
    let mut registry = SpecialistRegistry::new();
    registry.register(constant("code-metrics", "metrics")).unwrap();
    registry.register(constant("repo-search", "repos")).unwrap();
    registry.register(constant("docs-lookup", "docs")).unwrap();

    let reasoner = ask_once(&["code-metrics", "repo-search", "docs-lookup"]);
    let coordinator =
        OrchestrationCoordinator::new(registry, reasoner.clone(), RunConfig::default()).unwrap();

    let answer = coordinator
        .submit("Analyze Python machine learning projects")
        .await
        .unwrap();

    assert_eq!(
        answer.text,
        "code-metrics=metrics;repo-search=repos;docs-lookup=docs"
    );
    assert_eq!(answer.invocation_count(), 3);
    assert_eq!(answer.result_count(), 3);
    assert_eq!(answer.iterations, 2);
    assert_eq!(reasoner.calls(), 2);

    let sequences: Vec<u64> = answer
        .turns
        .iter()
        .filter_map(|t| t.as_invocation())
        .map(|inv| inv.sequence)
        .collect();
    assert_eq!(sequences, vec![0, 1, 2]);
    assert_eq!(
        answer.contributors,
        vec!["code-metrics", "repo-search", "docs-lookup"]
    );
}

// ---------------------------------------------------------------------------
// 2. Iteration bound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn endless_tool_requests_hit_the_iteration_limit() {
    let mut registry = SpecialistRegistry::new();
    registry.register(constant("echo", "pong")).unwrap();
    let reasoner = FnReasoner::new(|_, _| {
        Decision::tools(vec![ToolRequest::new("echo", serde_json::json!({}))])
    });
    let coordinator = OrchestrationCoordinator::new(
        registry,
        reasoner.clone(),
        RunConfig::default().with_max_iterations(3),
    )
    .unwrap();

    let err = coordinator.submit("loop forever").await.unwrap_err();
    match err {
        MaestroError::RunFailed { reason, .. } => {
            assert_eq!(reason, FailureReason::IterationLimitExceeded { limit: 3 })
        }
        other => panic!("expected RunFailed, got {other}"),
    }
    assert_eq!(reasoner.calls(), 3);
    let totals = coordinator.monitor().aggregate_metrics().await;
    assert_eq!(totals.invocations, 2);
}

#[tokio::test]
async fn answer_on_the_last_allowed_iteration_completes() {
    let mut registry = SpecialistRegistry::new();
    registry.register(constant("echo", "pong")).unwrap();
    let reasoner = FnReasoner::new(|ctx, _| {
        if ctx.invocations().count() < 2 {
            Decision::tools(vec![ToolRequest::new("echo", serde_json::json!({}))])
        } else {
            Decision::answer("made it")
        }
    });
    let coordinator = OrchestrationCoordinator::new(
        registry,
        reasoner.clone(),
        RunConfig::default().with_max_iterations(3),
    )
    .unwrap();

    let answer = coordinator.submit("just in time").await.unwrap();
    assert_eq!(answer.text, "made it");
    assert_eq!(answer.iterations, 3);
}

// ---------------------------------------------------------------------------
// 3. Partial failure still completes the barrier
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_specialist_yields_failed_result_not_failed_run() {
    let mut registry = SpecialistRegistry::new();
    registry.register(constant("repo-search", "repos")).unwrap();
    registry
        .register(failing("docs-lookup", "service unavailable"))
        .unwrap();
    registry.register(constant("code-metrics", "metrics")).unwrap();

    let coordinator = OrchestrationCoordinator::new(
        registry,
        ask_once(&["repo-search", "docs-lookup", "code-metrics"]),
        RunConfig::default(),
    )
    .unwrap();

    let answer = coordinator.submit("python ml").await.unwrap();
    let results = results_of(&answer.turns);
    assert_eq!(results.len(), 3);
    assert_eq!(
        results[1].failure_reason(),
        Some(&InvocationFailure::Specialist {
            reason: "service unavailable".into()
        })
    );
    assert_eq!(answer.contributors, vec!["repo-search", "code-metrics"]);
    assert_eq!(answer.text, "repo-search=repos;docs-lookup=!;code-metrics=metrics");
}

#[tokio::test]
async fn unknown_specialist_becomes_failed_result() {
    let mut registry = SpecialistRegistry::new();
    registry.register(constant("repo-search", "repos")).unwrap();
    let coordinator = OrchestrationCoordinator::new(
        registry,
        ask_once(&["repo-search", "ghost"]),
        RunConfig::default(),
    )
    .unwrap();

    let answer = coordinator.submit("anything").await.unwrap();
    let results = results_of(&answer.turns);
    assert_eq!(
        results[1].failure_reason(),
        Some(&InvocationFailure::UnknownSpecialist {
            specialist_id: "ghost".into()
        })
    );
}

#[tokio::test]
async fn unknown_specialist_ids_do_not_grow_the_monitor() {
    let mut registry = SpecialistRegistry::new();
    registry.register(constant("echo", "pong")).unwrap();
    let reasoner = FnReasoner::new(|ctx, _| {
        if ctx.invocations().next().is_none() {
            Decision::tools(vec![ToolRequest::new(
                ctx.query().to_string(),
                serde_json::json!({}),
            )])
        } else {
            Decision::answer("done")
        }
    });
    let coordinator =
        OrchestrationCoordinator::new(registry, reasoner, RunConfig::default()).unwrap();

    for n in 0..20 {
        coordinator.submit(format!("ghost-{n}")).await.unwrap();
    }
    let monitor = coordinator.monitor();
    let states = monitor.snapshot().await;
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].specialist_id, "echo");
    assert_eq!(monitor.unknown_invocations(), 20);
}

// ---------------------------------------------------------------------------
// 4. Timeouts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn slow_specialist_times_out_individually() {
    let mut registry = SpecialistRegistry::new();
    registry.register(delayed("slow", 10_000)).unwrap();
    registry.register(constant("fast", "quick")).unwrap();
    let config = RunConfig::default().with_invocation_timeout(Duration::from_millis(50));
    let coordinator =
        OrchestrationCoordinator::new(registry, ask_once(&["slow", "fast"]), config).unwrap();

    let answer = coordinator.submit("race").await.unwrap();
    let results = results_of(&answer.turns);
    assert_eq!(
        results[0].failure_reason(),
        Some(&InvocationFailure::Timeout { timeout_ms: 50 })
    );
    assert_eq!(results[1].output(), Some("quick"));
}

// ---------------------------------------------------------------------------
// 5. Ordering is independent of completion order
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn staggered_latencies_keep_request_order() {
    let mut registry = SpecialistRegistry::new();
    registry.register(delayed("a", 30)).unwrap();
    registry.register(delayed("b", 10)).unwrap();
    registry.register(delayed("c", 20)).unwrap();
    let coordinator = OrchestrationCoordinator::new(
        registry,
        ask_once(&["a", "b", "c"]),
        RunConfig::default(),
    )
    .unwrap();

    let first = coordinator.submit("order").await.unwrap();
    let second = coordinator.submit("order").await.unwrap();

    let ids = |turns: &[maestro_core::Turn]| -> Vec<String> {
        results_of(turns)
            .iter()
            .map(|r| r.specialist_id.clone())
            .collect()
    };
    assert_eq!(ids(&first.turns), vec!["a", "b", "c"]);
    assert_eq!(ids(&first.turns), ids(&second.turns));
    assert_eq!(first.text, second.text);
}

// ---------------------------------------------------------------------------
// 6. Cancellation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_while_awaiting_tools() {
    let started = Arc::new(Notify::new());
    let signal = Arc::clone(&started);
    let mut registry = SpecialistRegistry::new();
    registry
        .register(Arc::new(FnSpecialist::new(
            SpecialistBinding::new("stuck", "Stuck", "never returns in time"),
            move |_| {
                let signal = Arc::clone(&signal);
                async move {
                    signal.notify_one();
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("too late".to_string())
                }
            },
        )))
        .unwrap();

    let reasoner = ask_once(&["stuck"]);
    let coordinator =
        OrchestrationCoordinator::new(registry, reasoner.clone(), RunConfig::default()).unwrap();

    let handle = coordinator.start("hang");
    let run_id = handle.run_id();
    started.notified().await;
    assert_eq!(coordinator.status(run_id), Some(RunStatus::AwaitingTools));
    assert!(coordinator.cancel(run_id));

    match handle.wait().await {
        Err(MaestroError::RunFailed { reason, .. }) => {
            assert_eq!(reason, FailureReason::Cancelled)
        }
        other => panic!("expected cancelled run, got {other:?}"),
    }
    assert_eq!(reasoner.calls(), 1);
    let state = coordinator.monitor().get_state("stuck").await.unwrap();
    assert_eq!(state.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn abandoned_submit_cancels_and_releases_the_run() {
    let mut registry = SpecialistRegistry::new();
    registry.register(delayed("slow", 1_000)).unwrap();
    let reasoner = ask_once(&["slow"]);
    let coordinator =
        OrchestrationCoordinator::new(registry, reasoner.clone(), RunConfig::default()).unwrap();

    let outcome =
        tokio::time::timeout(Duration::from_millis(500), coordinator.submit("give up")).await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(reasoner.calls(), 1);
    assert_eq!(coordinator.active_runs(), 0);
    assert_eq!(coordinator.tracked_runs(), 0);
    let state = coordinator.monitor().get_state("slow").await.unwrap();
    assert_eq!(state.in_flight, 0);
    assert_eq!(state.metrics.invocations, 0);
}

// ---------------------------------------------------------------------------
// 7. Concurrent runs stay isolated
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_runs_do_not_share_context() {
    let mut registry = SpecialistRegistry::new();
    registry
        .register(Arc::new(FnSpecialist::new(
            SpecialistBinding::new("echo", "Echo", "repeats the query"),
            |args| async move { Ok(args["query"].as_str().unwrap_or_default().to_string()) },
        )))
        .unwrap();
    let coordinator =
        OrchestrationCoordinator::new(registry, ask_once(&["echo"]), RunConfig::default()).unwrap();

    let (left, right) = tokio::join!(coordinator.submit("left"), coordinator.submit("right"));
    let (left, right) = (left.unwrap(), right.unwrap());
    assert_ne!(left.run_id, right.run_id);
    assert_eq!(left.text, "echo=left");
    assert_eq!(right.text, "echo=right");
    assert_eq!(coordinator.active_runs(), 0);
}

// ---------------------------------------------------------------------------
// 8. Events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribers_see_steps_and_completion() {
    let mut registry = SpecialistRegistry::new();
    registry.register(constant("echo", "pong")).unwrap();
    let coordinator =
        OrchestrationCoordinator::new(registry, ask_once(&["echo"]), RunConfig::default()).unwrap();
    let mut events = coordinator.subscribe();

    let answer = coordinator.submit("ping").await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(seen.len(), 3);
    assert_eq!(
        seen.last(),
        Some(&RunEvent::RunFinished {
            run_id: answer.run_id,
            status: RunStatus::Completed
        })
    );
}

// ---------------------------------------------------------------------------
// 9. Staged reasoner with built-in specialists
// ---------------------------------------------------------------------------

#[tokio::test]
async fn staged_reasoner_with_builtin_specialists() {
    let repos = CatalogSpecialist::new(
        SpecialistBinding::new("repo-search", "GitHub Explorer", "Finds repositories"),
        vec![
            CatalogEntry::new("pytorch/pytorch")
                .with_tags(&["python", "machine", "learning"])
                .with_attribute("language", serde_json::json!("Python"))
                .with_attribute("size", serde_json::json!(900))
                .with_attribute("stargazers_count", serde_json::json!(5_000))
                .with_attribute("open_issues_count", serde_json::json!(12)),
            CatalogEntry::new("rust-lang/rust")
                .with_tags(&["rust", "compiler"])
                .with_attribute("language", serde_json::json!("Rust")),
        ],
    );
    let docs = CatalogSpecialist::new(
        SpecialistBinding::new("docs-lookup", "Documentation Expert", "Searches documentation"),
        vec![CatalogEntry::new("Train Python machine learning models")
            .with_summary("Guide to training models with Python")
            .with_tags(&["python", "machine", "learning"])],
    );

    let mut registry = SpecialistRegistry::new();
    registry.register(Arc::new(repos)).unwrap();
    registry.register(Arc::new(docs)).unwrap();
    registry.register(Arc::new(CodeMetricsSpecialist::new())).unwrap();

    let reasoner = StagedReasoner::new(StagedConfig {
        stages: vec![
            vec!["repo-search".into(), "docs-lookup".into()],
            vec!["code-metrics".into()],
        ],
        max_retries: 1,
    });
    let coordinator =
        OrchestrationCoordinator::new(registry, Arc::new(reasoner), RunConfig::default()).unwrap();

    let answer = coordinator
        .submit("Analyze Python machine learning projects")
        .await
        .unwrap();

    assert_eq!(answer.iterations, 3);
    assert_eq!(
        answer.contributors,
        vec!["repo-search", "docs-lookup", "code-metrics"]
    );
    assert!(answer.text.contains("## Code Analyst (code-metrics)"));
    assert!(answer.text.ends_with("Summary: 3 of 3 specialists contributed."));

    let metrics_output = results_of(&answer.turns)
        .into_iter()
        .find(|r| r.specialist_id == "code-metrics")
        .and_then(|r| r.output())
        .unwrap();
    let metrics: Vec<RepositoryMetrics> = serde_json::from_str(metrics_output).unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(
        metrics[0].complexity_summary,
        "Small Python project with high popularity"
    );
}
