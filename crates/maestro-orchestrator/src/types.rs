use chrono::{DateTime, Utc};
use maestro_agent::ConversationContext;
use maestro_core::{FailureReason, MaestroError, MaestroResult, Turn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one orchestration run.
pub type RunId = Uuid;

/// Lifecycle status of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Reasoning,
    AwaitingTools,
    Completed,
    Failed { reason: FailureReason },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed { .. })
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: &RunStatus) -> bool {
        match (self, next) {
            (RunStatus::Queued, RunStatus::Reasoning | RunStatus::Failed { .. }) => true,
            (
                RunStatus::Reasoning,
                RunStatus::AwaitingTools | RunStatus::Completed | RunStatus::Failed { .. },
            ) => true,
            (RunStatus::AwaitingTools, RunStatus::Reasoning | RunStatus::Failed { .. }) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Queued => write!(f, "queued"),
            RunStatus::Reasoning => write!(f, "reasoning"),
            RunStatus::AwaitingTools => write!(f, "awaiting_tools"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

/// One orchestration attempt for a single query.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub id: RunId,
    pub status: RunStatus,
    pub context: ConversationContext,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Number of reasoning calls made.
    pub iterations: u32,
}

impl Run {
    pub fn new(query: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), query)
    }

    pub fn with_id(id: RunId, query: impl Into<String>) -> Self {
        Self {
            id,
            status: RunStatus::Queued,
            context: ConversationContext::new(id, query),
            started_at: Utc::now(),
            ended_at: None,
            iterations: 0,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.status {
            RunStatus::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds().max(0) as u64)
    }

    /// Convert a finished run into the caller-facing answer or error.
    pub fn into_answer(self) -> MaestroResult<FinalAnswer> {
        match self.status {
            RunStatus::Completed => {
                let text = self.context.answer().unwrap_or_default().to_string();
                let contributors = self.context.contributors();
                Ok(FinalAnswer {
                    run_id: self.id,
                    text,
                    contributors,
                    iterations: self.iterations,
                    turns: self.context.into_turns(),
                })
            }
            RunStatus::Failed { reason } => Err(MaestroError::RunFailed {
                run_id: self.id,
                reason,
            }),
            other => Err(MaestroError::Orchestrator(format!(
                "run {} ended in non-terminal status {other}",
                self.id
            ))),
        }
    }
}

/// The successful result of `submit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub run_id: RunId,
    pub text: String,
    /// Specialists that produced output, in order of their first success.
    pub contributors: Vec<String>,
    pub iterations: u32,
    /// Full turn history of the run.
    pub turns: Vec<Turn>,
}

impl FinalAnswer {
    pub fn invocation_count(&self) -> usize {
        self.turns.iter().filter(|t| t.as_invocation().is_some()).count()
    }

    pub fn result_count(&self) -> usize {
        self.turns.iter().filter(|t| t.as_result().is_some()).count()
    }
}

/// Step and run completion notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    /// A reasoning step and, if it requested tools, its dispatch finished.
    StepCompleted {
        run_id: RunId,
        step: u32,
        decision: String,
        invocations: usize,
        failures: usize,
    },
    /// The run reached a terminal status.
    RunFinished { run_id: RunId, status: RunStatus },
}
