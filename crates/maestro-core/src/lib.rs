//! Core types and error definitions for the Maestro orchestration engine.
//!
//! This crate provides the foundational types shared across all Maestro crates,
//! including error handling, tool invocation records and conversation turns.
//!
//! # Main types
//!
//! - [`MaestroError`]: Unified error enum for all Maestro subsystems.
//! - [`MaestroResult`]: Convenience alias for `Result<T, MaestroError>`.
//! - [`FailureReason`]: Why a run ended in the `Failed` status.
//! - [`ToolInvocation`]: A reasoning-requested call to one specialist.
//! - [`ToolResult`]: The single result produced for a [`ToolInvocation`].
//! - [`Turn`]: One appended unit of a run's conversation context.

/// Conversation turn types.
pub mod turn;

pub use turn::{Turn, TurnKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Maestro engine.
///
/// Registry misuse (`DuplicateId`, `UnknownSpecialist`) is reported
/// synchronously. Everything that goes wrong inside a run ends up as a
/// [`FailureReason`] carried by [`MaestroError::RunFailed`].
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    /// A specialist with this id is already registered.
    #[error("Duplicate specialist id: {0}")]
    DuplicateId(String),

    /// No specialist with this id is registered.
    #[error("Unknown specialist: {0}")]
    UnknownSpecialist(String),

    /// A specialist did not answer within its invocation timeout.
    #[error("Specialist '{specialist}' timed out after {timeout_ms}ms")]
    InvokerTimeout {
        /// Id of the specialist that timed out.
        specialist: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A specialist reported a failure for an invocation.
    #[error("Specialist error: {0}")]
    Specialist(String),

    /// The reasoning collaborator could not produce a decision.
    #[error("Reasoning error: {0}")]
    Reasoning(String),

    /// A conversation context invariant would have been violated.
    #[error("Context error: {0}")]
    Context(String),

    /// A run reached the terminal `Failed` status.
    #[error("Run {run_id} failed: {reason}")]
    RunFailed {
        /// Id of the failed run.
        run_id: Uuid,
        /// Terminal failure reason recorded on the run.
        reason: FailureReason,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from the orchestration coordinator itself.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`MaestroError`].
pub type MaestroResult<T> = Result<T, MaestroError>;

/// Terminal failure reason of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The reasoning collaborator returned a failure instead of a decision.
    ReasoningFailure {
        /// Reason reported by the collaborator.
        reason: String,
    },
    /// The run needed more reasoning passes than allowed.
    IterationLimitExceeded {
        /// The configured iteration limit.
        limit: u32,
    },
    /// The run's cancellation signal was raised.
    Cancelled,
    /// The state machine hit an internal inconsistency.
    Internal {
        /// Description of the inconsistency.
        reason: String,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ReasoningFailure { reason } => write!(f, "reasoning failure: {reason}"),
            FailureReason::IterationLimitExceeded { limit } => {
                write!(f, "iteration limit of {limit} exceeded")
            }
            FailureReason::Cancelled => write!(f, "cancelled"),
            FailureReason::Internal { reason } => write!(f, "internal error: {reason}"),
        }
    }
}

// --- Tool types ---

/// A request from the reasoning step to invoke one specialist.
///
/// `sequence` is the run-wide creation ordinal and defines the order in which
/// results are folded back into the context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Unique identifier of this invocation.
    pub id: Uuid,
    /// Creation ordinal within the run, starting at 0.
    pub sequence: u64,
    /// Id of the specialist to invoke.
    pub specialist_id: String,
    /// JSON arguments passed to the specialist.
    pub arguments: serde_json::Value,
    /// Reasoning iteration (1-based) that requested this invocation.
    pub requested_at_step: u32,
    /// UTC timestamp of when the invocation was created.
    pub created_at: DateTime<Utc>,
}

impl ToolInvocation {
    /// Creates a new invocation with a fresh id.
    pub fn new(
        sequence: u64,
        specialist_id: impl Into<String>,
        arguments: serde_json::Value,
        requested_at_step: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence,
            specialist_id: specialist_id.into(),
            arguments,
            requested_at_step,
            created_at: Utc::now(),
        }
    }
}

/// Why an invocation did not produce output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationFailure {
    /// The invocation or its dispatch step ran out of time.
    Timeout {
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },
    /// The requested specialist is not registered.
    UnknownSpecialist {
        /// The id that failed to resolve.
        specialist_id: String,
    },
    /// The specialist itself reported a failure.
    Specialist {
        /// Failure reason reported by the specialist.
        reason: String,
    },
}

impl InvocationFailure {
    /// Maps an invoker error onto the failure recorded in a [`ToolResult`].
    pub fn from_error(err: &MaestroError) -> Self {
        match err {
            MaestroError::InvokerTimeout { timeout_ms, .. } => InvocationFailure::Timeout {
                timeout_ms: *timeout_ms,
            },
            MaestroError::UnknownSpecialist(id) => InvocationFailure::UnknownSpecialist {
                specialist_id: id.clone(),
            },
            MaestroError::Specialist(reason) => InvocationFailure::Specialist {
                reason: reason.clone(),
            },
            other => InvocationFailure::Specialist {
                reason: other.to_string(),
            },
        }
    }
}

impl fmt::Display for InvocationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationFailure::Timeout { timeout_ms } => write!(f, "timed out after {timeout_ms}ms"),
            InvocationFailure::UnknownSpecialist { specialist_id } => {
                write!(f, "unknown specialist '{specialist_id}'")
            }
            InvocationFailure::Specialist { reason } => write!(f, "{reason}"),
        }
    }
}

/// Output or failure of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// The specialist produced output.
    Output {
        /// Textual output of the specialist.
        content: String,
    },
    /// The invocation failed.
    Failure {
        /// What went wrong.
        failure: InvocationFailure,
    },
}

/// The result returned after executing a [`ToolInvocation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// The id of the [`ToolInvocation`] this result corresponds to.
    pub invocation_id: Uuid,
    /// The specialist that was invoked.
    pub specialist_id: String,
    /// Output or failure.
    pub outcome: ToolOutcome,
    /// UTC timestamp of when the result was produced.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock time spent in the invocation.
    pub duration_ms: u64,
}

impl ToolResult {
    /// Creates a successful tool result for an invocation.
    pub fn success(invocation: &ToolInvocation, content: impl Into<String>) -> Self {
        Self::with_outcome(
            invocation,
            ToolOutcome::Output {
                content: content.into(),
            },
        )
    }

    /// Creates a failed tool result for an invocation.
    pub fn failure(invocation: &ToolInvocation, failure: InvocationFailure) -> Self {
        Self::with_outcome(invocation, ToolOutcome::Failure { failure })
    }

    /// Creates a timeout result for an invocation that never resolved.
    pub fn timed_out(invocation: &ToolInvocation, timeout_ms: u64) -> Self {
        Self::failure(invocation, InvocationFailure::Timeout { timeout_ms })
    }

    fn with_outcome(invocation: &ToolInvocation, outcome: ToolOutcome) -> Self {
        Self {
            invocation_id: invocation.id,
            specialist_id: invocation.specialist_id.clone(),
            outcome,
            completed_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// Sets the measured duration.
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Whether the invocation ended in a failure.
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Failure { .. })
    }

    /// The specialist output, if the invocation succeeded.
    pub fn output(&self) -> Option<&str> {
        match &self.outcome {
            ToolOutcome::Output { content } => Some(content),
            ToolOutcome::Failure { .. } => None,
        }
    }

    /// The failure, if the invocation failed.
    pub fn failure_reason(&self) -> Option<&InvocationFailure> {
        match &self.outcome {
            ToolOutcome::Output { .. } => None,
            ToolOutcome::Failure { failure } => Some(failure),
        }
    }
}
