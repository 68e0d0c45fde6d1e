//! Feature-name schemas and projection of named features onto vectors.

use std::fs;
use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{MalscanError, Result};
use crate::features::FeatureMap;

/// Fixed-length, ordered model input.
pub type FeatureVector = Array1<f32>;

/// Ordered feature names; position defines the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(Vec<String>);

impl Schema {
    pub fn new(names: Vec<String>) -> Self {
        Self(names)
    }

    /// Sorted key set of a feature map, as persisted next to a trained model.
    pub fn from_feature_map(features: &FeatureMap) -> Self {
        Self(features.names().map(str::to_string).collect())
    }

    /// Positional names `f0 .. f{dim-1}` for unnamed high-dimensional vectors.
    pub fn positional(dim: usize) -> Self {
        Self((0..dim).map(|i| format!("f{i}")).collect())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(MalscanError::SchemaNotFound(path.to_path_buf()));
        }
        let data = fs::read_to_string(path).map_err(|e| MalscanError::io(path, e))?;
        let names: Vec<String> =
            serde_json::from_str(&data).map_err(|e| MalscanError::MalformedSchema {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), len = names.len(), "loaded schema");
        Ok(Self(names))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.0)?;
        fs::write(path, json).map_err(|e| MalscanError::io(path, e))
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }
}

/// Project `features` through `schema`. Missing names become 0.0 and names
/// outside the schema are ignored.
pub fn vectorize(features: &FeatureMap, schema: &Schema) -> FeatureVector {
    schema
        .names()
        .iter()
        .map(|name| features.get(name).unwrap_or(0.0))
        .collect()
}
