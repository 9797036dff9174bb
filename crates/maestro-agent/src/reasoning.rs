use crate::context::ConversationContext;
use async_trait::async_trait;
use maestro_core::MaestroResult;
use maestro_skills::SpecialistBinding;
use serde::{Deserialize, Serialize};

/// One specialist call requested by a reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub specialist_id: String,
    pub arguments: serde_json::Value,
}

impl ToolRequest {
    pub fn new(specialist_id: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            specialist_id: specialist_id.into(),
            arguments,
        }
    }
}

/// What a reasoning step decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    /// The run is done; this is the answer.
    FinalAnswer { text: String },
    /// These specialists must be invoked before reasoning continues.
    ToolRequests {
        #[serde(default)]
        rationale: Option<String>,
        requests: Vec<ToolRequest>,
    },
    /// No decision could be made.
    ReasoningFailure { reason: String },
}

impl Decision {
    pub fn answer(text: impl Into<String>) -> Self {
        Decision::FinalAnswer { text: text.into() }
    }

    pub fn tools(requests: Vec<ToolRequest>) -> Self {
        Decision::ToolRequests {
            rationale: None,
            requests,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Decision::ReasoningFailure {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Decision::FinalAnswer { .. } => "final_answer",
            Decision::ToolRequests { .. } => "tool_requests",
            Decision::ReasoningFailure { .. } => "reasoning_failure",
        }
    }
}

/// The black-box decision maker that drives a run.
///
/// Implementations may call a model, follow a script, or anything else; the
/// state machine only needs one [`Decision`] per call. An `Err` is treated the
/// same as [`Decision::ReasoningFailure`].
#[async_trait]
pub trait ReasoningStep: Send + Sync {
    async fn decide(
        &self,
        context: &ConversationContext,
        specialists: &[SpecialistBinding],
    ) -> MaestroResult<Decision>;
}
