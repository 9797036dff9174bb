//! Built-in specialists shipped with Maestro.
//!
//! - [`CodeMetricsSpecialist`]: classifies repository data by size, popularity and activity.
//! - [`CatalogSpecialist`]: keyword lookup over a configured list of entries
//!   (repositories, documentation pages, ...).

pub mod catalog;
pub mod code_metrics;

pub use catalog::{CatalogEntry, CatalogSpecialist};
pub use code_metrics::{analyze_repository, CodeMetricsSpecialist, RepositoryMetrics};
