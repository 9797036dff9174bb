use maestro_core::{InvocationFailure, ToolResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Whether a specialist currently has invocations in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistStatus {
    Idle,
    Busy,
}

/// Counters accumulated for one specialist across all runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialistMetrics {
    pub invocations: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub duration_ms: u64,
}

/// Live view of one specialist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistState {
    pub specialist_id: String,
    pub in_flight: usize,
    pub status: SpecialistStatus,
    pub metrics: SpecialistMetrics,
}

impl SpecialistState {
    fn new(specialist_id: String) -> Self {
        Self {
            specialist_id,
            in_flight: 0,
            status: SpecialistStatus::Idle,
            metrics: SpecialistMetrics::default(),
        }
    }

    fn settle(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
        if self.in_flight == 0 {
            self.status = SpecialistStatus::Idle;
        }
    }
}

/// Tracks invocation activity and metrics for every registered specialist.
///
/// Shared by all runs of a coordinator. Only the ids given at construction
/// are tracked; results for any other id are counted as unknown.
pub struct SpecialistMonitor {
    states: Arc<RwLock<HashMap<String, SpecialistState>>>,
    unknown: AtomicU64,
}

impl SpecialistMonitor {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let states = ids
            .into_iter()
            .map(|id| {
                let id = id.into();
                (id.clone(), SpecialistState::new(id))
            })
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
            unknown: AtomicU64::new(0),
        }
    }

    /// Mark one invocation of a specialist as started.
    pub async fn start_invocation(&self, specialist_id: &str) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(specialist_id) {
            state.in_flight += 1;
            state.status = SpecialistStatus::Busy;
        }
    }

    /// Record the result of a finished invocation.
    pub async fn finish_invocation(&self, result: &ToolResult) {
        let mut states = self.states.write().await;
        let Some(state) = states.get_mut(&result.specialist_id) else {
            self.unknown.fetch_add(1, Ordering::Relaxed);
            return;
        };
        state.settle();
        state.metrics.invocations += 1;
        state.metrics.duration_ms += result.duration_ms;
        match result.failure_reason() {
            Some(InvocationFailure::Timeout { .. }) => state.metrics.timeouts += 1,
            Some(_) => state.metrics.failures += 1,
            None => {}
        }
    }

    /// Release an in-flight slot for an invocation whose result was never
    /// observed (cancelled run).
    pub async fn abandon(&self, specialist_id: &str) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(specialist_id) {
            state.settle();
        }
    }

    /// Snapshot of all specialist states, sorted by id.
    pub async fn snapshot(&self) -> Vec<SpecialistState> {
        let states = self.states.read().await;
        let mut all: Vec<SpecialistState> = states.values().cloned().collect();
        all.sort_by(|a, b| a.specialist_id.cmp(&b.specialist_id));
        all
    }

    /// Invocations that named a specialist this monitor does not track.
    pub fn unknown_invocations(&self) -> u64 {
        self.unknown.load(Ordering::Relaxed)
    }

    pub async fn get_state(&self, specialist_id: &str) -> Option<SpecialistState> {
        let states = self.states.read().await;
        states.get(specialist_id).cloned()
    }

    /// Totals across all specialists.
    pub async fn aggregate_metrics(&self) -> SpecialistMetrics {
        let states = self.states.read().await;
        let mut total = SpecialistMetrics::default();
        for state in states.values() {
            total.invocations += state.metrics.invocations;
            total.failures += state.metrics.failures;
            total.timeouts += state.metrics.timeouts;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "specialists": states,
            "aggregate": aggregate,
            "unknown_invocations": self.unknown_invocations(),
        })
    }
}
