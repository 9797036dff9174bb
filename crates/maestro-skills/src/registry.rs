use crate::specialist::{Specialist, SpecialistBinding};
use maestro_core::{
    InvocationFailure, MaestroError, MaestroResult, ToolInvocation, ToolResult,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Central registry for all invocable specialists.
///
/// Specialists are kept in registration order, which is the order reasoning
/// steps see them in. Registration happens before any run starts; once the
/// registry is shared with a coordinator it is only ever read.
pub struct SpecialistRegistry {
    specialists: Vec<Arc<dyn Specialist>>,
    index: HashMap<String, usize>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self {
            specialists: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a specialist. Fails with [`MaestroError::DuplicateId`] if the
    /// id is taken; the earlier registration stays in place.
    pub fn register(&mut self, specialist: Arc<dyn Specialist>) -> MaestroResult<()> {
        let id = specialist.binding().id.clone();
        if self.index.contains_key(&id) {
            warn!(specialist = %id, "Rejected duplicate specialist registration");
            return Err(MaestroError::DuplicateId(id));
        }
        info!(specialist = %id, "Registered specialist");
        self.index.insert(id, self.specialists.len());
        self.specialists.push(specialist);
        Ok(())
    }

    /// Look up the binding for a specialist id.
    pub fn resolve(&self, id: &str) -> MaestroResult<&SpecialistBinding> {
        self.get(id)
            .map(|s| s.binding())
            .ok_or_else(|| MaestroError::UnknownSpecialist(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Specialist>> {
        self.index.get(id).map(|&i| &self.specialists[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All bindings in registration order.
    pub fn list(&self) -> Vec<&SpecialistBinding> {
        self.specialists.iter().map(|s| s.binding()).collect()
    }

    /// Owned copies of all bindings, in registration order.
    pub fn bindings(&self) -> Vec<SpecialistBinding> {
        self.specialists.iter().map(|s| s.binding().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.specialists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialists.is_empty()
    }

    /// Execute one invocation against its specialist.
    ///
    /// Always returns exactly one [`ToolResult`]: the specialist's output, its
    /// reported failure, an unknown-specialist failure, or a timeout once
    /// `timeout` has elapsed. Never retries.
    pub async fn invoke(&self, invocation: &ToolInvocation, timeout: Duration) -> ToolResult {
        let Some(specialist) = self.get(&invocation.specialist_id) else {
            warn!(
                specialist = %invocation.specialist_id,
                invocation_id = %invocation.id,
                "Invocation names an unregistered specialist"
            );
            let err = MaestroError::UnknownSpecialist(invocation.specialist_id.clone());
            return ToolResult::failure(invocation, InvocationFailure::from_error(&err));
        };

        debug!(
            specialist = %invocation.specialist_id,
            invocation_id = %invocation.id,
            timeout_ms = timeout.as_millis() as u64,
            "Invoking specialist"
        );

        let start = Instant::now();
        let outcome =
            match tokio::time::timeout(timeout, specialist.invoke(invocation.arguments.clone()))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(MaestroError::InvokerTimeout {
                    specialist: invocation.specialist_id.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }),
            };
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => ToolResult::success(invocation, output).with_duration(duration_ms),
            Err(e) => {
                warn!(
                    specialist = %invocation.specialist_id,
                    invocation_id = %invocation.id,
                    error = %e,
                    "Specialist invocation failed"
                );
                ToolResult::failure(invocation, InvocationFailure::from_error(&e))
                    .with_duration(duration_ms)
            }
        }
    }
}

impl Default for SpecialistRegistry {
    fn default() -> Self {
        Self::new()
    }
}
