use maestro_core::{MaestroError, MaestroResult, ToolInvocation, ToolResult};
use std::collections::HashMap;
use uuid::Uuid;

/// Collects the results of one dispatch step and releases them in invocation
/// creation order, regardless of the order in which they completed.
///
/// Also serves as the fan-in barrier's completion count: the step is done
/// once [`ResultAggregator::is_complete`] holds.
pub struct ResultAggregator {
    batch: Vec<ToolInvocation>,
    slots: Vec<Option<ToolResult>>,
    positions: HashMap<Uuid, usize>,
    resolved: usize,
}

impl ResultAggregator {
    pub fn new(mut batch: Vec<ToolInvocation>) -> Self {
        batch.sort_by_key(|inv| inv.sequence);
        let positions = batch
            .iter()
            .enumerate()
            .map(|(pos, inv)| (inv.id, pos))
            .collect();
        let slots = vec![None; batch.len()];
        Self {
            batch,
            slots,
            positions,
            resolved: 0,
        }
    }

    /// Accept one completed result. Rejects results that belong to no
    /// invocation of this batch and second results for the same invocation.
    pub fn accept(&mut self, result: ToolResult) -> MaestroResult<()> {
        let Some(&pos) = self.positions.get(&result.invocation_id) else {
            return Err(MaestroError::Context(format!(
                "result for invocation {} is not part of this step",
                result.invocation_id
            )));
        };
        let slot = &mut self.slots[pos];
        if slot.is_some() {
            return Err(MaestroError::Context(format!(
                "duplicate result for invocation {}",
                result.invocation_id
            )));
        }
        *slot = Some(result);
        self.resolved += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved
    }

    pub fn is_complete(&self) -> bool {
        self.resolved == self.batch.len()
    }

    /// Invocations still waiting for a result, in creation order.
    pub fn unresolved(&self) -> Vec<&ToolInvocation> {
        self.batch
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.is_none())
            .map(|(inv, _)| inv)
            .collect()
    }

    /// Release all results in creation order. Invocations that never
    /// resolved are reported as timed out after `timeout_ms`.
    pub fn finish(self, timeout_ms: u64) -> Vec<ToolResult> {
        self.batch
            .iter()
            .zip(self.slots)
            .map(|(inv, slot)| slot.unwrap_or_else(|| ToolResult::timed_out(inv, timeout_ms)))
            .collect()
    }
}
