//! Specialist bindings and the registry the orchestrator dispatches through.
//!
//! # Main types
//!
//! - [`Specialist`]: Trait every invocable specialist agent implements.
//! - [`SpecialistBinding`]: Id, name, description and input schema of a specialist.
//! - [`SpecialistRegistry`]: Ordered, id-unique set of specialists with timed invocation.
//! - [`FnSpecialist`]: Specialist backed by an async closure.

/// Closure-backed specialists.
pub mod function;
/// The specialist registry.
pub mod registry;
/// Specialist trait and binding metadata.
pub mod specialist;

pub use function::FnSpecialist;
pub use registry::SpecialistRegistry;
pub use specialist::{Specialist, SpecialistBinding};
