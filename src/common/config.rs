//! Run configuration, read from `stackcheck.toml` and overridden by CLI flags.

use crate::common::error::StackcheckError;
use crate::domain::verifier::SpawnPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "stackcheck.toml";
pub const DEFAULT_MARKER: &str = "stackcheck:";

/// What to do when a label has more than one root comment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateRootPolicy {
    /// The last root comment encountered wins.
    #[default]
    LastWins,
    /// Abort the run with a configuration error.
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct CheckConfig {
    /// Comment prefix that introduces an annotation
    pub marker: String,
    pub spawn_policy: SpawnPolicy,
    pub duplicate_roots: DuplicateRootPolicy,
    /// Last path segments (or method names) that start a concurrent activity
    pub spawn_functions: Vec<String>,
    /// Keep `#[test]` functions and `#[cfg(test)]` modules in the call graph
    pub include_tests: bool,
    /// Verify (label, guard) pairs on the rayon pool
    pub parallel: bool,
    /// Worker count; `None` lets the thread pool pick
    pub jobs: Option<usize>,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            spawn_policy: SpawnPolicy::default(),
            duplicate_roots: DuplicateRootPolicy::default(),
            spawn_functions: vec![
                "spawn".to_string(),
                "spawn_blocking".to_string(),
                "spawn_local".to_string(),
            ],
            include_tests: false,
            parallel: true,
            jobs: None,
        }
    }
}

impl CheckConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CheckConfig = toml::from_str(text).context("Failed to parse stackcheck config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("In config file {}", path.display()))
    }

    /// Load `path` if given, else `stackcheck.toml` in `dir` if present, else defaults.
    pub fn discover(path: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let candidate = dir.join(DEFAULT_CONFIG_FILE);
        if candidate.is_file() {
            log::info!("using config {}", candidate.display());
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), StackcheckError> {
        if self.marker.trim().is_empty() {
            return Err(StackcheckError::InvalidConfig("marker must not be empty".into()));
        }
        if self.jobs == Some(0) {
            return Err(StackcheckError::InvalidConfig("jobs must be at least 1".into()));
        }
        Ok(())
    }
}
