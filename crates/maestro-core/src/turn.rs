use crate::{ToolInvocation, ToolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a [`Turn`] records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnKind {
    /// The user query that started the run.
    Query {
        /// Query text.
        text: String,
    },
    /// A reasoning decision that requested tool invocations.
    Decision {
        /// Optional explanation returned alongside the requests.
        rationale: Option<String>,
        /// Invocations created for this decision, in request order.
        invocation_ids: Vec<Uuid>,
    },
    /// A tool invocation issued to a specialist.
    Invocation(ToolInvocation),
    /// The result of a tool invocation.
    Result(ToolResult),
    /// The final answer of the run.
    Answer {
        /// Answer text.
        text: String,
    },
}

impl TurnKind {
    /// Short label used in logs and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            TurnKind::Query { .. } => "query",
            TurnKind::Decision { .. } => "decision",
            TurnKind::Invocation(_) => "invocation",
            TurnKind::Result(_) => "result",
            TurnKind::Answer { .. } => "answer",
        }
    }
}

/// One appended unit of a run's conversation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Position of this turn in the context, starting at 0.
    pub index: usize,
    /// Reasoning iteration this turn belongs to (0 for the query).
    pub step: u32,
    /// UTC timestamp of when the turn was appended.
    pub at: DateTime<Utc>,
    /// The recorded content.
    pub kind: TurnKind,
}

impl Turn {
    /// Creates a turn stamped with the current time.
    pub fn new(index: usize, step: u32, kind: TurnKind) -> Self {
        Self {
            index,
            step,
            at: Utc::now(),
            kind,
        }
    }

    /// The invocation recorded by this turn, if any.
    pub fn as_invocation(&self) -> Option<&ToolInvocation> {
        match &self.kind {
            TurnKind::Invocation(inv) => Some(inv),
            _ => None,
        }
    }

    /// The result recorded by this turn, if any.
    pub fn as_result(&self) -> Option<&ToolResult> {
        match &self.kind {
            TurnKind::Result(result) => Some(result),
            _ => None,
        }
    }
}
