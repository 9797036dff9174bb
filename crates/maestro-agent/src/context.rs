use maestro_core::{MaestroError, MaestroResult, ToolInvocation, ToolResult, Turn, TurnKind};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// Append-only turn history of one run.
///
/// Owned by the run's state machine. Turns are never removed or rewritten;
/// every result must answer a previously issued, still unresolved invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationContext {
    run_id: Uuid,
    turns: Vec<Turn>,
    #[serde(skip)]
    issued: HashMap<Uuid, usize>,
    #[serde(skip)]
    resolved: HashSet<Uuid>,
    #[serde(skip)]
    next_sequence: u64,
}

impl ConversationContext {
    /// Start a context whose first turn is the user query.
    pub fn new(run_id: Uuid, query: impl Into<String>) -> Self {
        let mut ctx = Self {
            run_id,
            turns: Vec::new(),
            issued: HashMap::new(),
            resolved: HashSet::new(),
            next_sequence: 0,
        };
        ctx.push(0, TurnKind::Query { text: query.into() });
        ctx
    }

    fn push(&mut self, step: u32, kind: TurnKind) {
        let index = self.turns.len();
        self.turns.push(Turn::new(index, step, kind));
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The query that started the run.
    pub fn query(&self) -> &str {
        match self.turns.first().map(|t| &t.kind) {
            Some(TurnKind::Query { text }) => text,
            _ => "",
        }
    }

    /// Record a tool-requesting decision followed by one invocation per
    /// request, each with the next creation ordinal.
    pub fn record_requests(
        &mut self,
        step: u32,
        rationale: Option<String>,
        requests: Vec<(String, serde_json::Value)>,
    ) -> Vec<ToolInvocation> {
        let invocations: Vec<ToolInvocation> = requests
            .into_iter()
            .map(|(specialist_id, arguments)| {
                let inv = ToolInvocation::new(self.next_sequence, specialist_id, arguments, step);
                self.next_sequence += 1;
                inv
            })
            .collect();

        self.push(
            step,
            TurnKind::Decision {
                rationale,
                invocation_ids: invocations.iter().map(|inv| inv.id).collect(),
            },
        );
        for inv in &invocations {
            self.issued.insert(inv.id, self.turns.len());
            self.push(step, TurnKind::Invocation(inv.clone()));
        }
        invocations
    }

    /// Record a single-request decision and return its invocation.
    #[cfg(test)]
    pub(crate) fn issue_invocation(
        &mut self,
        step: u32,
        specialist_id: impl Into<String>,
        arguments: serde_json::Value,
    ) -> ToolInvocation {
        let mut issued = self.record_requests(step, None, vec![(specialist_id.into(), arguments)]);
        issued.remove(0)
    }

    /// Record a result for a pending invocation.
    pub fn push_result(&mut self, result: ToolResult) -> MaestroResult<()> {
        let Some(&turn_index) = self.issued.get(&result.invocation_id) else {
            return Err(MaestroError::Context(format!(
                "result for unknown invocation {}",
                result.invocation_id
            )));
        };
        if !self.resolved.insert(result.invocation_id) {
            return Err(MaestroError::Context(format!(
                "duplicate result for invocation {}",
                result.invocation_id
            )));
        }
        let step = self.turns[turn_index].step;
        self.push(step, TurnKind::Result(result));
        Ok(())
    }

    /// Record the final answer.
    pub fn push_answer(&mut self, step: u32, text: impl Into<String>) {
        self.push(step, TurnKind::Answer { text: text.into() });
    }

    pub fn invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.turns.iter().filter_map(Turn::as_invocation)
    }

    pub fn results(&self) -> impl Iterator<Item = &ToolResult> {
        self.turns.iter().filter_map(Turn::as_result)
    }

    /// Issued invocations that have no result yet, in creation order.
    pub fn pending(&self) -> Vec<&ToolInvocation> {
        self.invocations()
            .filter(|inv| !self.resolved.contains(&inv.id))
            .collect()
    }

    /// Results of the most recent step that produced any.
    #[cfg(test)]
    pub(crate) fn latest_results(&self) -> Vec<&ToolResult> {
        let Some(last_step) = self
            .turns
            .iter()
            .filter(|t| t.as_result().is_some())
            .map(|t| t.step)
            .max()
        else {
            return Vec::new();
        };
        self.turns
            .iter()
            .filter(|t| t.step == last_step)
            .filter_map(Turn::as_result)
            .collect()
    }

    /// Number of invocations issued to a specialist so far.
    pub fn attempts(&self, specialist_id: &str) -> usize {
        self.invocations()
            .filter(|inv| inv.specialist_id == specialist_id)
            .count()
    }

    /// Most recent result from a specialist.
    pub fn last_result_for(&self, specialist_id: &str) -> Option<&ToolResult> {
        self.results()
            .filter(|r| r.specialist_id == specialist_id)
            .last()
    }

    /// Most recent successful output from a specialist.
    pub fn last_output_for(&self, specialist_id: &str) -> Option<&str> {
        self.results()
            .filter(|r| r.specialist_id == specialist_id)
            .filter_map(ToolResult::output)
            .last()
    }

    /// Specialists with at least one successful result, in order of their
    /// first success.
    pub fn contributors(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for result in self.results().filter(|r| !r.is_error()) {
            if !seen.contains(&result.specialist_id) {
                seen.push(result.specialist_id.clone());
            }
        }
        seen
    }

    /// The final answer, once recorded.
    pub fn answer(&self) -> Option<&str> {
        match self.turns.last().map(|t| &t.kind) {
            Some(TurnKind::Answer { text }) => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use maestro_core::InvocationFailure;

    fn ctx() -> ConversationContext {
        ConversationContext::new(Uuid::new_v4(), "Analyze Python machine learning projects")
    }

    #[test]
    fn test_query_is_first_turn() {
        let ctx = ctx();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.query(), "Analyze Python machine learning projects");
        assert_eq!(ctx.turns()[0].step, 0);
    }

    #[test]
    fn test_invocations_get_increasing_sequence() {
        let mut ctx = ctx();
        let a = ctx.issue_invocation(1, "repo-search", serde_json::json!({}));
        let b = ctx.issue_invocation(1, "docs-lookup", serde_json::json!({}));
        let c = ctx.issue_invocation(2, "repo-search", serde_json::json!({}));
        assert_eq!((a.sequence, b.sequence, c.sequence), (0, 1, 2));
        assert_eq!(ctx.pending().len(), 3);
        assert_eq!(ctx.attempts("repo-search"), 2);
    }

    #[test]
    fn test_result_must_match_issued_invocation() {
        let mut ctx = ctx();
        let stray = ToolInvocation::new(0, "ghost", serde_json::json!({}), 1);
        let err = ctx.push_result(ToolResult::success(&stray, "x")).unwrap_err();
        assert!(matches!(err, MaestroError::Context(_)));
    }

    #[test]
    fn test_duplicate_result_rejected() {
        let mut ctx = ctx();
        let inv = ctx.issue_invocation(1, "repo-search", serde_json::json!({}));
        ctx.push_result(ToolResult::success(&inv, "first")).unwrap();
        let err = ctx.push_result(ToolResult::success(&inv, "second")).unwrap_err();
        assert!(err.to_string().contains("duplicate result"));
        assert_eq!(ctx.results().count(), 1);
        assert!(ctx.pending().is_empty());
    }

    #[test]
    fn test_contributors_and_latest_results() {
        let mut ctx = ctx();
        let a = ctx.issue_invocation(1, "repo-search", serde_json::json!({}));
        let b = ctx.issue_invocation(1, "docs-lookup", serde_json::json!({}));
        ctx.push_result(ToolResult::failure(
            &b,
            InvocationFailure::Timeout { timeout_ms: 5 },
        ))
        .unwrap();
        ctx.push_result(ToolResult::success(&a, "repos")).unwrap();

        let c = ctx.issue_invocation(2, "docs-lookup", serde_json::json!({}));
        ctx.push_result(ToolResult::success(&c, "docs")).unwrap();

        assert_eq!(ctx.contributors(), vec!["repo-search", "docs-lookup"]);
        let latest = ctx.latest_results();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].output(), Some("docs"));
        assert_eq!(ctx.last_output_for("docs-lookup"), Some("docs"));
        assert!(ctx.last_result_for("repo-search").is_some());
    }

    #[test]
    fn test_answer_is_last_turn() {
        let mut ctx = ctx();
        assert!(ctx.answer().is_none());
        ctx.push_answer(1, "done");
        assert_eq!(ctx.answer(), Some("done"));
    }

    #[test]
    fn test_decision_precedes_its_invocations() {
        let mut ctx = ctx();
        let issued = ctx.record_requests(
            1,
            Some("fan out".into()),
            vec![
                ("repo-search".into(), serde_json::json!({})),
                ("docs-lookup".into(), serde_json::json!({})),
            ],
        );
        let labels: Vec<&str> = ctx.turns().iter().map(|t| t.kind.label()).collect();
        assert_eq!(labels, vec!["query", "decision", "invocation", "invocation"]);
        match &ctx.turns()[1].kind {
            TurnKind::Decision { invocation_ids, rationale } => {
                assert_eq!(rationale.as_deref(), Some("fan out"));
                assert_eq!(invocation_ids, &vec![issued[0].id, issued[1].id]);
            }
            other => panic!("expected decision, got {other:?}"),
        }
    }
}
