//! `maestro.toml` loading and registry assembly.

use maestro_agent::{RunConfig, StagedConfig};
use maestro_builtins::{CatalogEntry, CatalogSpecialist, CodeMetricsSpecialist};
use maestro_core::MaestroResult;
use maestro_skills::{SpecialistBinding, SpecialistRegistry};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct MaestroConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub reasoner: StagedConfig,
    #[serde(default)]
    pub code_metrics: CodeMetricsConfig,
    #[serde(default)]
    pub catalogs: Vec<CatalogConfig>,
}

#[derive(Debug, Deserialize)]
pub struct CodeMetricsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for CodeMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

/// A catalog-backed specialist declared under `[[catalogs]]`.
#[derive(Debug, Deserialize)]
pub struct CatalogConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub entries: Vec<CatalogEntry>,
}

fn default_enabled() -> bool {
    true
}

impl MaestroConfig {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let config: MaestroConfig = toml::from_str(text)?;
        config.run.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;
        Self::parse(&text)
    }

    /// Register the built-in code metrics specialist (if enabled) followed by
    /// every configured catalog, in file order.
    pub fn build_registry(&self) -> MaestroResult<SpecialistRegistry> {
        let mut registry = SpecialistRegistry::new();
        if self.code_metrics.enabled {
            registry.register(Arc::new(CodeMetricsSpecialist::new()))?;
        }
        for catalog in &self.catalogs {
            let binding = SpecialistBinding::new(
                catalog.id.clone(),
                catalog.name.clone(),
                catalog.description.clone(),
            );
            let mut specialist = CatalogSpecialist::new(binding, catalog.entries.clone());
            if let Some(max) = catalog.max_results {
                specialist = specialist.with_max_results(max);
            }
            registry.register(Arc::new(specialist))?;
        }
        Ok(registry)
    }
}
