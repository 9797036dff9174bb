use maestro_core::{MaestroError, MaestroResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied to every orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum number of reasoning calls per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Timeout applied to each individual specialist invocation.
    #[serde(default = "default_invocation_timeout_ms")]
    pub invocation_timeout_ms: u64,
    /// Timeout for the whole fan-out/fan-in barrier of one step.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
}

fn default_max_iterations() -> u32 {
    8
}

fn default_invocation_timeout_ms() -> u64 {
    30_000
}

fn default_step_timeout_ms() -> u64 {
    120_000
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            invocation_timeout_ms: default_invocation_timeout_ms(),
            step_timeout_ms: default_step_timeout_ms(),
        }
    }
}

impl RunConfig {
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Reject limits that would make every run fail immediately.
    pub fn validate(&self) -> MaestroResult<()> {
        if self.max_iterations == 0 {
            return Err(MaestroError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if self.invocation_timeout_ms == 0 || self.step_timeout_ms == 0 {
            return Err(MaestroError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
