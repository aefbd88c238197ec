use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use simeval_types::ModelKind;

use crate::metric::DEFAULT_BATCH_SIZE;
use crate::metrics::judge::DEFAULT_JUDGE_CONCURRENCY;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimevalConfig {
    /// Per-request timeout for model servers. No timeout when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_judge_concurrency")]
    pub judge_concurrency: usize,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_judge_concurrency() -> usize {
    DEFAULT_JUDGE_CONCURRENCY
}

impl Default for SimevalConfig {
    fn default() -> Self {
        Self {
            timeout_secs: None,
            batch_size: default_batch_size(),
            judge_concurrency: default_judge_concurrency(),
            models: Vec::new(),
        }
    }
}

/// A model served by one HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub endpoint: String,
    /// Probed from the server's `/info` route when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ModelKind>,
    /// Environment variable holding a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl SimevalConfig {
    /// Reads YAML (or JSON, which YAML accepts) and validates it.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: SimevalConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            bail!("batch_size must be greater than zero");
        }
        if self.judge_concurrency == 0 {
            bail!("judge_concurrency must be greater than zero");
        }
        let mut seen = HashSet::new();
        for entry in &self.models {
            if entry.name.trim().is_empty() {
                bail!("model entry with empty name");
            }
            if entry.endpoint.trim().is_empty() {
                bail!("model `{}` has no endpoint", entry.name);
            }
            if !seen.insert(entry.name.as_str()) {
                bail!("model `{}` is configured more than once", entry.name);
            }
        }
        Ok(())
    }

    pub fn model(&self, name: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.name == name)
    }
}
