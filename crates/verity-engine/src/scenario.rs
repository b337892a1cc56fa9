use std::path::{Path, PathBuf};
use thiserror::Error;
use verity_common::flow::Flow;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse scenario file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid scenario search pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("no scenario files found at {0}")]
    Empty(String),
}

pub struct ScenarioLoader;

impl ScenarioLoader {
    /// Load one flow definition from a YAML file.
    pub async fn load_file(path: &Path) -> Result<Flow, ScenarioError> {
        let content = tokio::fs::read_to_string(path).await?;
        let flow: Flow = serde_yaml::from_str(&content)?;
        Ok(flow)
    }

    /// Load a single file, or every `*.yaml`/`*.yml` directly under a
    /// directory, in filename order so runs stay deterministic.
    pub async fn load(path: &Path) -> Result<Vec<Flow>, ScenarioError> {
        if path.is_file() {
            return Ok(vec![Self::load_file(path).await?]);
        }

        let mut entries: Vec<PathBuf> = Vec::new();
        for extension in ["yaml", "yml"] {
            let pattern = format!("{}/*.{}", path.display(), extension);
            entries.extend(glob::glob(&pattern)?.filter_map(Result::ok));
        }
        entries.sort();

        let mut flows = Vec::with_capacity(entries.len());
        for entry in &entries {
            flows.push(Self::load_file(entry).await?);
        }
        if flows.is_empty() {
            return Err(ScenarioError::Empty(path.display().to_string()));
        }
        Ok(flows)
    }
}
