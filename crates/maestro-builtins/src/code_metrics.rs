use async_trait::async_trait;
use maestro_core::{MaestroError, MaestroResult};
use maestro_skills::{Specialist, SpecialistBinding};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::info;

/// Project size bucket, by repository size in KB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectSize {
    Small,
    Medium,
    Large,
}

impl ProjectSize {
    fn from_kb(size_kb: u64) -> Self {
        if size_kb < 1_000 {
            ProjectSize::Small
        } else if size_kb < 10_000 {
            ProjectSize::Medium
        } else {
            ProjectSize::Large
        }
    }
}

/// Popularity bucket, by star count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Popularity {
    Low,
    Medium,
    High,
}

impl Popularity {
    fn from_stars(stars: u64) -> Self {
        if stars < 100 {
            Popularity::Low
        } else if stars < 1_000 {
            Popularity::Medium
        } else {
            Popularity::High
        }
    }
}

/// Activity bucket, by open issue count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activity {
    Active,
    Moderate,
    Low,
}

impl Activity {
    fn from_open_issues(issues: u64) -> Self {
        if issues > 10 {
            Activity::Active
        } else if issues > 0 {
            Activity::Moderate
        } else {
            Activity::Low
        }
    }
}

impl fmt::Display for ProjectSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl fmt::Display for Popularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Metrics derived from one repository record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub main_language: String,
    pub project_size: ProjectSize,
    pub popularity_level: Popularity,
    pub activity_level: Activity,
    pub repository_size_kb: u64,
    pub stars: u64,
    pub forks: u64,
    pub open_issues: u64,
    pub complexity_summary: String,
}

const REPOSITORY_FIELDS: [&str; 5] = [
    "language",
    "size",
    "stargazers_count",
    "forks_count",
    "open_issues_count",
];

/// Analyze a GitHub-style repository record.
///
/// Reads `language`, `size`, `stargazers_count`, `forks_count` and
/// `open_issues_count`; missing fields count as zero / `"Unknown"`.
/// Returns `None` for anything that is not a non-empty JSON object.
pub fn analyze_repository(repo: &Value) -> Option<RepositoryMetrics> {
    let obj = repo.as_object().filter(|o| !o.is_empty())?;
    let count = |key: &str| obj.get(key).and_then(Value::as_u64).unwrap_or(0);

    let language = obj
        .get("language")
        .and_then(Value::as_str)
        .unwrap_or("Unknown")
        .to_string();
    let size_kb = count("size");
    let stars = count("stargazers_count");
    let forks = count("forks_count");
    let issues = count("open_issues_count");

    let project_size = ProjectSize::from_kb(size_kb);
    let popularity = Popularity::from_stars(stars);

    Some(RepositoryMetrics {
        repository: obj
            .get("full_name")
            .or_else(|| obj.get("name"))
            .or_else(|| obj.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string),
        complexity_summary: format!(
            "{project_size} {language} project with {} popularity",
            popularity.to_string().to_lowercase()
        ),
        main_language: language,
        project_size,
        popularity_level: popularity,
        activity_level: Activity::from_open_issues(issues),
        repository_size_kb: size_kb,
        stars,
        forks,
        open_issues: issues,
    })
}

/// Collect repository records from invocation arguments.
///
/// Accepts `repository` (object), `repositories` (array), and arrays under
/// `inputs` (outputs of earlier specialists). Records from `inputs` must
/// carry at least one repository field.
fn collect_repositories(arguments: &Value) -> Vec<&Value> {
    let mut repos = Vec::new();
    if let Some(repo) = arguments.get("repository").filter(|r| r.is_object()) {
        repos.push(repo);
    }
    if let Some(list) = arguments.get("repositories").and_then(Value::as_array) {
        repos.extend(list.iter().filter(|r| r.is_object()));
    }
    if let Some(inputs) = arguments.get("inputs").and_then(Value::as_object) {
        for value in inputs.values() {
            let list = value
                .as_array()
                .or_else(|| value.get("repositories").and_then(Value::as_array));
            if let Some(list) = list {
                repos.extend(list.iter().filter(|r| looks_like_repository(r)));
            }
        }
    }
    repos
}

fn looks_like_repository(value: &Value) -> bool {
    REPOSITORY_FIELDS
        .iter()
        .any(|key| value.get(key).is_some())
}

/// Specialist that turns repository records into complexity metrics.
pub struct CodeMetricsSpecialist {
    binding: SpecialistBinding,
}

impl CodeMetricsSpecialist {
    pub fn new() -> Self {
        Self::with_id("code-metrics")
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            binding: SpecialistBinding::new(
                id,
                "Code Analyst",
                "Analyzes code metrics and complexity of repositories. Provides project size, \
                 main language, popularity and activity levels.",
            )
            .with_input_schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "repository": {
                        "type": "object",
                        "description": "A repository record (GitHub API shape)"
                    },
                    "repositories": {
                        "type": "array",
                        "items": { "type": "object" },
                        "description": "Several repository records"
                    },
                    "inputs": {
                        "type": "object",
                        "description": "Outputs of earlier specialists keyed by specialist id"
                    }
                }
            })),
        }
    }
}

impl Default for CodeMetricsSpecialist {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Specialist for CodeMetricsSpecialist {
    fn binding(&self) -> &SpecialistBinding {
        &self.binding
    }

    async fn invoke(&self, arguments: Value) -> MaestroResult<String> {
        let metrics: Vec<RepositoryMetrics> = collect_repositories(&arguments)
            .into_iter()
            .filter_map(analyze_repository)
            .collect();

        if metrics.is_empty() {
            return Err(MaestroError::Specialist(
                "No repository data provided".to_string(),
            ));
        }

        info!(repositories = metrics.len(), "Computed repository metrics");
        Ok(serde_json::to_string(&metrics)?)
    }
}
