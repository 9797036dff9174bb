use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use maestro_skills::{Specialist, SpecialistBinding};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

const DEFAULT_MAX_RESULTS: usize = 5;

/// One searchable catalog entry.
///
/// Any extra fields (e.g. `language`, `size`, `stargazers_count` for
/// repositories) are kept in `attributes` and returned with the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, flatten)]
    pub attributes: serde_json::Map<String, Value>,
}

impl CatalogEntry {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: None,
            summary: String::new(),
            tags: Vec::new(),
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| (*t).to_string()).collect();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Number of distinct query terms found in title, tags or summary.
    fn score(&self, terms: &[String]) -> usize {
        let haystack = format!(
            "{} {} {}",
            self.title,
            self.tags.join(" "),
            self.summary
        )
        .to_lowercase();
        terms.iter().filter(|t| haystack.contains(t.as_str())).count()
    }
}

/// Lowercased query words of three or more characters.
fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

/// Specialist answering keyword queries from a fixed catalog.
///
/// Expects `{"query": "..."}` and returns the best matching entries as a JSON
/// array, best first. Ties keep catalog order.
pub struct CatalogSpecialist {
    binding: SpecialistBinding,
    entries: Vec<CatalogEntry>,
    max_results: usize,
}

impl CatalogSpecialist {
    pub fn new(binding: SpecialistBinding, entries: Vec<CatalogEntry>) -> Self {
        let binding = binding.with_input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Keywords to search for" }
            },
            "required": ["query"]
        }));
        Self {
            binding,
            entries,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Entries matching the query, best first.
    pub fn search(&self, query: &str) -> Vec<&CatalogEntry> {
        let terms = query_terms(query);
        let mut scored: Vec<(usize, &CatalogEntry)> = self
            .entries
            .iter()
            .map(|e| (e.score(&terms), e))
            .filter(|(score, _)| *score > 0)
            .collect();
        // stable: equal scores keep catalog order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored
            .into_iter()
            .take(self.max_results)
            .map(|(_, e)| e)
            .collect()
    }
}

#[async_trait]
impl Specialist for CatalogSpecialist {
    fn binding(&self) -> &SpecialistBinding {
        &self.binding
    }

    async fn invoke(&self, arguments: Value) -> MaestroResult<String> {
        let query = arguments["query"]
            .as_str()
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| MaestroError::Specialist("query is required".to_string()))?;

        let hits = self.search(query);
        debug!(
            specialist = %self.binding.id,
            query = %query,
            hits = hits.len(),
            "Catalog lookup"
        );
        Ok(serde_json::to_string(&hits)?)
    }
}
