use async_trait::async_trait;
use maestro_core::MaestroResult;
use serde::{Deserialize, Serialize};

/// Metadata describing a specialist's identity and input contract.
///
/// This is what the reasoning step sees when deciding whom to call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistBinding {
    pub id: String,
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl SpecialistBinding {
    /// Creates a binding that accepts any JSON object.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({ "type": "object" }),
        }
    }

    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Trait that all specialists must implement.
///
/// A specialist is opaque to the orchestrator: it receives JSON arguments and
/// either produces textual output or reports a failure. Timeouts are applied
/// by the caller, see [`crate::SpecialistRegistry::invoke`].
#[async_trait]
pub trait Specialist: Send + Sync {
    fn binding(&self) -> &SpecialistBinding;

    async fn invoke(&self, arguments: serde_json::Value) -> MaestroResult<String>;
}
