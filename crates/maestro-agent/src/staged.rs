use crate::context::ConversationContext;
use crate::reasoning::{Decision, ReasoningStep, ToolRequest};
use async_trait::async_trait;
use maestro_core::MaestroResult;
use maestro_skills::SpecialistBinding;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::{debug, warn};

/// Configuration of the [`StagedReasoner`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedConfig {
    /// Groups of specialist ids requested together, in order. Empty means a
    /// single stage containing every available specialist.
    #[serde(default)]
    pub stages: Vec<Vec<String>>,
    /// How many times a failed specialist is asked again.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    1
}

impl Default for StagedConfig {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            max_retries: default_max_retries(),
        }
    }
}

/// A deterministic reasoning step that works through stages of specialists.
///
/// Each reasoning call either requests the next unfinished stage (new
/// specialists plus failed ones with retries left) or, once every stage is
/// settled, composes a sectioned answer attributed to each specialist.
/// Later stages receive earlier outputs under `inputs`, keyed by specialist id.
pub struct StagedReasoner {
    config: StagedConfig,
}

impl StagedReasoner {
    pub fn new(config: StagedConfig) -> Self {
        Self { config }
    }

    /// Stages restricted to available specialists; empty stages dropped.
    fn resolve_stages(&self, specialists: &[SpecialistBinding]) -> Vec<Vec<String>> {
        if self.config.stages.is_empty() {
            let all: Vec<String> = specialists.iter().map(|s| s.id.clone()).collect();
            return if all.is_empty() { Vec::new() } else { vec![all] };
        }
        self.config
            .stages
            .iter()
            .map(|stage| {
                stage
                    .iter()
                    .filter(|id| {
                        let known = specialists.iter().any(|s| &s.id == *id);
                        if !known {
                            warn!(specialist = %id, "Stage names an unavailable specialist, skipping");
                        }
                        known
                    })
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|stage| !stage.is_empty())
            .collect()
    }

    fn needs_request(&self, context: &ConversationContext, id: &str) -> bool {
        let attempts = context.attempts(id);
        if attempts == 0 {
            return true;
        }
        let succeeded = context.last_output_for(id).is_some();
        !succeeded && attempts <= self.config.max_retries as usize
    }

    fn arguments(context: &ConversationContext, requested: &[String]) -> serde_json::Value {
        let mut inputs = serde_json::Map::new();
        for id in context.contributors() {
            if requested.contains(&id) {
                continue;
            }
            if let Some(output) = context.last_output_for(&id) {
                let value = serde_json::from_str(output)
                    .unwrap_or_else(|_| serde_json::Value::String(output.to_string()));
                inputs.insert(id, value);
            }
        }
        let mut args = serde_json::json!({ "query": context.query() });
        if !inputs.is_empty() {
            args["inputs"] = serde_json::Value::Object(inputs);
        }
        args
    }

    fn compose(context: &ConversationContext, specialists: &[SpecialistBinding]) -> String {
        let mut out = format!("Findings for: {}\n", context.query());
        let mut contributed = 0;
        let mut consulted = 0;
        for binding in specialists {
            let Some(last) = context.last_result_for(&binding.id) else {
                continue;
            };
            consulted += 1;
            let _ = write!(out, "\n## {} ({})\n", binding.name, binding.id);
            match context.last_output_for(&binding.id) {
                Some(output) => {
                    contributed += 1;
                    let _ = writeln!(out, "{output}");
                }
                None => {
                    let reason = last
                        .failure_reason()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    let _ = writeln!(out, "Unavailable: {reason}");
                }
            }
        }
        let _ = write!(
            out,
            "\nSummary: {contributed} of {consulted} specialists contributed."
        );
        out
    }
}

impl Default for StagedReasoner {
    fn default() -> Self {
        Self::new(StagedConfig::default())
    }
}

#[async_trait]
impl ReasoningStep for StagedReasoner {
    async fn decide(
        &self,
        context: &ConversationContext,
        specialists: &[SpecialistBinding],
    ) -> MaestroResult<Decision> {
        let stages = self.resolve_stages(specialists);
        if stages.is_empty() {
            return Ok(Decision::failure("no specialists available"));
        }

        for (n, stage) in stages.iter().enumerate() {
            let requested: Vec<String> = stage
                .iter()
                .filter(|id| self.needs_request(context, id))
                .cloned()
                .collect();
            if requested.is_empty() {
                continue;
            }

            let args = Self::arguments(context, &requested);
            debug!(stage = n + 1, specialists = ?requested, "Requesting stage");
            return Ok(Decision::ToolRequests {
                rationale: Some(format!("stage {} of {}", n + 1, stages.len())),
                requests: requested
                    .into_iter()
                    .map(|id| ToolRequest::new(id, args.clone()))
                    .collect(),
            });
        }

        Ok(Decision::answer(Self::compose(context, specialists)))
    }
}
