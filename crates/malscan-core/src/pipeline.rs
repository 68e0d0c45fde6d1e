//! Generic scoring path: named byte features projected through a schema.
//!
//! This path is kept separate from the router's type-specific models. It
//! has its own schema, its own dimensionality and its own model.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MalscanError, Result};
use crate::explain::explain;
use crate::features::{ByteFeatureExtractor, Evidence, ExtractorConfig, FeatureMap};
use crate::model::{load_model, LoadedModel, ModelOptions};
use crate::router::{detect_file_type, InferenceResult, Reasons};
use crate::schema::{vectorize, Schema};
use crate::score::{score_percent, VerdictThresholds};

pub const GENERIC_MODEL_NAME: &str = "generic";
pub const DEFAULT_GENERIC_TOP_K: usize = 8;

/// A scored sample with the features and evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericScan {
    pub result: InferenceResult,
    pub features: FeatureMap,
    pub evidence: Evidence,
}

pub struct GenericPipeline {
    extractor: ByteFeatureExtractor,
    schema: Schema,
    model: LoadedModel,
    thresholds: VerdictThresholds,
    top_k: usize,
}

impl GenericPipeline {
    pub fn new(extractor: ByteFeatureExtractor, schema: Schema, model: LoadedModel) -> Self {
        Self {
            extractor,
            schema,
            model,
            thresholds: VerdictThresholds::default(),
            top_k: DEFAULT_GENERIC_TOP_K,
        }
    }

    /// Load model and schema artifacts. The schema is checked first so a
    /// missing schema is reported even when the model is also missing.
    pub fn load(
        model_path: &Path,
        schema_path: &Path,
        options: &ModelOptions,
        extractor: &ExtractorConfig,
    ) -> Result<Self> {
        let schema = Schema::load(schema_path)?;
        let model = load_model(model_path, GENERIC_MODEL_NAME, options)?;
        Ok(Self::new(ByteFeatureExtractor::new(extractor)?, schema, model))
    }

    pub fn with_thresholds(mut self, thresholds: VerdictThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn scan_file(&self, path: &Path, mime_hint: &str) -> Result<GenericScan> {
        let data = fs::read(path).map_err(|e| MalscanError::io(path, e))?;
        self.scan(&data, path, mime_hint)
    }

    /// Score in-memory bytes; the detected type comes from the MIME hint only.
    pub fn scan_bytes(&self, data: &[u8], mime_hint: &str) -> Result<GenericScan> {
        self.scan(data, Path::new(""), mime_hint)
    }

    fn scan(&self, data: &[u8], path: &Path, mime_hint: &str) -> Result<GenericScan> {
        let (features, evidence) = self.extractor.extract(data, mime_hint);
        let x = vectorize(&features, &self.schema);

        let probability = self.model.score(&x)?;
        let score = score_percent(probability);
        let verdict = self.thresholds.verdict(score);
        tracing::debug!(probability, score, %verdict, "scored generic sample");

        let result = InferenceResult {
            detected_type: detect_file_type(path, mime_hint),
            score_percent: score,
            verdict,
            model_used: self.model.name().to_string(),
            reasons: Reasons {
                model: self.model.name().to_string(),
                top_contributions: explain(&self.model, &x, self.schema.names(), self.top_k),
                notes: Vec::new(),
                error: None,
            },
        };

        Ok(GenericScan {
            result,
            features,
            evidence,
        })
    }
}
