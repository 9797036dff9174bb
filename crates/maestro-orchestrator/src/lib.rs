//! Multi-agent orchestration: one query in, one merged answer out.
//!
//! A run alternates between a reasoning step, which decides which specialists
//! to consult, and a fan-out/fan-in barrier that invokes them concurrently and
//! folds their results back into the run's context in request order.
//!
//! # Main types
//!
//! - [`OrchestrationCoordinator`]: Public entry point; `submit(query)`.
//! - [`RunStateMachine`]: Drives one run to `Completed` or `Failed`.
//! - [`ResultAggregator`]: Orders concurrently completed results by creation order.
//! - [`SpecialistMonitor`]: Per-specialist invocation metrics.
//! - [`Run`], [`RunStatus`], [`FinalAnswer`], [`RunEvent`]: Run bookkeeping.

/// Fan-in ordering of tool results.
pub mod aggregator;
/// Public orchestration entry point.
pub mod coordinator;
/// The run state machine.
pub mod engine;
/// Specialist invocation metrics.
pub mod monitor;
/// Table of runs owned by a coordinator.
pub mod runs;
/// Shared orchestration types (Run, RunStatus, FinalAnswer, RunEvent).
pub mod types;

pub use aggregator::ResultAggregator;
pub use coordinator::{OrchestrationCoordinator, RunHandle};
pub use engine::RunStateMachine;
pub use monitor::{SpecialistMetrics, SpecialistMonitor, SpecialistState, SpecialistStatus};
pub use runs::RunTable;
pub use types::{FinalAnswer, Run, RunEvent, RunId, RunStatus};
