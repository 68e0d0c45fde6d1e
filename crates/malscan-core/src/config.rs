//! JSON configuration shared by the library entry points and the CLI.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MalscanError, Result};
use crate::features::ExtractorConfig;
use crate::model::ModelOptions;
use crate::pipeline::DEFAULT_GENERIC_TOP_K;
use crate::router::{ModelPaths, DEFAULT_TOP_K};
use crate::score::VerdictThresholds;

/// Generic-path artifacts: a model and the schema it was trained against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericModelConfig {
    pub model: PathBuf,
    pub schema: PathBuf,
    #[serde(flatten)]
    pub options: ModelOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MalscanConfig {
    /// Type-specific models used by the router.
    pub models: ModelPaths,
    pub generic: Option<GenericModelConfig>,
    /// Optional training metadata, shown by `malscan info`.
    pub metadata: Option<PathBuf>,
    pub thresholds: VerdictThresholds,
    pub extractor: ExtractorConfig,
    pub top_k: usize,
    pub generic_top_k: usize,
}

impl Default for MalscanConfig {
    fn default() -> Self {
        Self {
            models: ModelPaths::default(),
            generic: None,
            metadata: None,
            thresholds: VerdictThresholds::default(),
            extractor: ExtractorConfig::default(),
            top_k: DEFAULT_TOP_K,
            generic_top_k: DEFAULT_GENERIC_TOP_K,
        }
    }
}

impl MalscanConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| MalscanError::io(path, e))?;
        let config: Self = serde_json::from_str(&data)?;
        Ok(config)
    }
}
