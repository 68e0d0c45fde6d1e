//! Error taxonomy for the scoring pipeline.
//!
//! Feature extraction has no error path: every byte-level computation is
//! defined for empty and arbitrary input. Errors here come from loading
//! artifacts and from running a model.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum MalscanError {
    /// Model artifact path does not exist.
    #[error("model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// Feature-name schema path does not exist.
    #[error("schema not found: {}", .0.display())]
    SchemaNotFound(PathBuf),

    /// Model exposes neither a probability nor a decision-score output.
    #[error("unsupported model kind: {0} exposes neither probabilities nor a decision function")]
    UnsupportedModelKind(String),

    /// Model artifact exists but its content is unusable.
    #[error("malformed model {}: {reason}", .path.display())]
    MalformedModel { path: PathBuf, reason: String },

    /// Schema artifact exists but is not a JSON array of strings.
    #[error("malformed schema {}: {reason}", .path.display())]
    MalformedSchema { path: PathBuf, reason: String },

    /// Feature vector length does not match what the model was trained on.
    #[error("feature vector has {actual} dimensions, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Classifier produced NaN or an infinite score.
    #[error("model {model} produced a non-finite score ({value})")]
    InvalidScore { model: String, value: f64 },

    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// An indicator pattern supplied through configuration did not compile.
    #[error("invalid indicator pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[cfg(feature = "onnx")]
    #[error("onnx runtime error: {0}")]
    Onnx(String),
}

pub type Result<T> = std::result::Result<T, MalscanError>;

impl MalscanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
