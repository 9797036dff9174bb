//! The coordinating side of an orchestration run: what the reasoning
//! collaborator sees, what it may answer, and how a run is bounded.
//!
//! # Main types
//!
//! - [`ReasoningStep`]: Contract of the black-box decision maker.
//! - [`Decision`]: Final answer, tool requests, or reasoning failure.
//! - [`ConversationContext`]: Append-only turn history of one run.
//! - [`RunConfig`]: Iteration bound and timeouts.
//! - [`StagedReasoner`]: Deterministic reasoner that fans out configured stages.

pub mod config;
pub mod context;
pub mod reasoning;
pub mod staged;

pub use config::RunConfig;
pub use context::ConversationContext;
pub use reasoning::{Decision, ReasoningStep, ToolRequest};
pub use staged::{StagedConfig, StagedReasoner};
