use crate::specialist::{Specialist, SpecialistBinding};
use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use std::future::Future;
use std::pin::Pin;

type InvokeFn = Box<
    dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = MaestroResult<String>> + Send>>
        + Send
        + Sync,
>;

/// A specialist whose behaviour is an async closure.
///
/// Useful for wiring remote agents behind a thin adapter, and for tests.
pub struct FnSpecialist {
    binding: SpecialistBinding,
    invoke_fn: InvokeFn,
}

impl FnSpecialist {
    pub fn new<F, Fut>(binding: SpecialistBinding, f: F) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MaestroResult<String>> + Send + 'static,
    {
        Self {
            binding,
            invoke_fn: Box::new(move |args| Box::pin(f(args))),
        }
    }

    /// A specialist that always answers with the same output.
    pub fn constant(binding: SpecialistBinding, output: impl Into<String>) -> Self {
        let output = output.into();
        Self::new(binding, move |_| {
            let output = output.clone();
            async move { Ok::<_, MaestroError>(output) }
        })
    }
}

#[async_trait]
impl Specialist for FnSpecialist {
    fn binding(&self) -> &SpecialistBinding {
        &self.binding
    }

    async fn invoke(&self, arguments: serde_json::Value) -> MaestroResult<String> {
        (self.invoke_fn)(arguments).await
    }
}
