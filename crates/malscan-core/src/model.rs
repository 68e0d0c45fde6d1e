//! Classifier capabilities, artifact loading and the probability adapter.
//!
//! A loaded classifier is described once, at load time, by [`Capabilities`]:
//! which output it produces (a class probability or a raw decision score)
//! and which explanation data it carries (linear weights or feature
//! importances). Scoring dispatches on that descriptor and never probes the
//! classifier again.

use std::fmt;
use std::fs;
use std::path::Path;

use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

use crate::error::{MalscanError, Result};
use crate::forest::RandomForest;
use crate::linear::{LinearClassifier, LinearModel};
use crate::schema::FeatureVector;

/// What a classifier emits for a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Probability of the positive (malicious) class.
    Probability,
    /// Signed margin; mapped through the logistic function.
    #[serde(alias = "decision")]
    DecisionScore,
}

/// Per-feature data a classifier exposes for explanations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplanationKind {
    LinearWeights,
    FeatureImportances,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub output: Option<OutputKind>,
    pub explanation: Option<ExplanationKind>,
}

/// A trained classifier. Implementations override only the capabilities
/// they actually have; the defaults report the capability as absent.
pub trait Classifier: Send + Sync {
    /// Short family name used in diagnostics, e.g. `logistic_regression`.
    fn kind(&self) -> &str;

    fn output(&self) -> Option<OutputKind>;

    /// Positive-class probability for one sample.
    fn predict_proba(&self, _x: ArrayView1<'_, f32>) -> Result<f64> {
        Err(MalscanError::UnsupportedModelKind(self.kind().to_string()))
    }

    /// Raw decision score for one sample.
    fn decision_function(&self, _x: ArrayView1<'_, f32>) -> Result<f64> {
        Err(MalscanError::UnsupportedModelKind(self.kind().to_string()))
    }

    fn coefficients(&self) -> Option<&[f32]> {
        None
    }

    fn feature_importances(&self) -> Option<&[f32]> {
        None
    }
}

/// A classifier together with its identifier and capability descriptor.
pub struct LoadedModel {
    name: String,
    capabilities: Capabilities,
    classifier: Box<dyn Classifier>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .field("kind", &self.classifier.kind())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl LoadedModel {
    pub fn new(name: impl Into<String>, classifier: Box<dyn Classifier>) -> Self {
        let explanation = if classifier.coefficients().is_some() {
            Some(ExplanationKind::LinearWeights)
        } else if classifier.feature_importances().is_some() {
            Some(ExplanationKind::FeatureImportances)
        } else {
            None
        };
        let capabilities = Capabilities {
            output: classifier.output(),
            explanation,
        };
        Self {
            name: name.into(),
            capabilities,
            classifier,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        self.classifier.kind()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    /// Probability that `x` is malicious, in `[0, 1]`.
    pub fn score(&self, x: &FeatureVector) -> Result<f64> {
        let view = x.view();
        let p = match self.capabilities.output {
            Some(OutputKind::Probability) => self.classifier.predict_proba(view)?,
            Some(OutputKind::DecisionScore) => sigmoid(self.classifier.decision_function(view)?),
            None => {
                return Err(MalscanError::UnsupportedModelKind(
                    self.classifier.kind().to_string(),
                ))
            }
        };
        if !p.is_finite() {
            return Err(MalscanError::InvalidScore {
                model: self.name.clone(),
                value: p,
            });
        }
        Ok(p.clamp(0.0, 1.0))
    }
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Load-time options for artifacts that cannot describe themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Output kind of an ONNX graph's scored tensor.
    pub onnx_output: OutputKind,
    /// ONNX output tensor to read; the first declared output when unset.
    pub onnx_output_name: Option<String>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            onnx_output: OutputKind::Probability,
            onnx_output_name: None,
        }
    }
}

/// Serialized native classifier, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression(LinearModel),
    LinearSvm(LinearModel),
    RandomForest(RandomForest),
}

impl ModelArtifact {
    pub fn into_classifier(self) -> std::result::Result<Box<dyn Classifier>, String> {
        Ok(match self {
            Self::LogisticRegression(m) => {
                Box::new(LinearClassifier::logistic(m)?) as Box<dyn Classifier>
            }
            Self::LinearSvm(m) => Box::new(LinearClassifier::svm(m)?),
            Self::RandomForest(f) => {
                f.validate()?;
                Box::new(f)
            }
        })
    }
}

/// Load a classifier from `path`. `.onnx` files go through the ONNX
/// runtime; anything else is read as a JSON [`ModelArtifact`].
pub fn load_model(path: &Path, name: &str, options: &ModelOptions) -> Result<LoadedModel> {
    if !path.exists() {
        return Err(MalscanError::ModelNotFound(path.to_path_buf()));
    }

    let is_onnx = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("onnx"));

    let classifier: Box<dyn Classifier> = if is_onnx {
        load_onnx(path, options)?
    } else {
        let data = fs::read_to_string(path).map_err(|e| MalscanError::io(path, e))?;
        let artifact: ModelArtifact =
            serde_json::from_str(&data).map_err(|e| MalscanError::MalformedModel {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        artifact
            .into_classifier()
            .map_err(|reason| MalscanError::MalformedModel {
                path: path.to_path_buf(),
                reason,
            })?
    };

    let model = LoadedModel::new(name, classifier);
    tracing::info!(
        path = %path.display(),
        name,
        kind = model.kind(),
        capabilities = ?model.capabilities(),
        "loaded model"
    );
    Ok(model)
}

#[cfg(feature = "onnx")]
fn load_onnx(path: &Path, options: &ModelOptions) -> Result<Box<dyn Classifier>> {
    Ok(Box::new(crate::inference::OnnxClassifier::load(path, options)?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(_path: &Path, _options: &ModelOptions) -> Result<Box<dyn Classifier>> {
    Err(MalscanError::UnsupportedModelKind(
        "onnx (built without the `onnx` feature)".into(),
    ))
}

/// Training provenance written next to the model artifacts. Informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetadata {
    pub version: String,
    pub notes: Vec<String>,
    pub models: std::collections::BTreeMap<String, ModelProvenance>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelProvenance {
    pub name: String,
    pub model: String,
    pub dim: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

impl ModelMetadata {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| MalscanError::io(path, e))?;
        Ok(serde_json::from_str(&data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    struct DecisionOnly(f64);

    impl Classifier for DecisionOnly {
        fn kind(&self) -> &str {
            "decision_only"
        }
        fn output(&self) -> Option<OutputKind> {
            Some(OutputKind::DecisionScore)
        }
        fn decision_function(&self, _x: ArrayView1<'_, f32>) -> Result<f64> {
            Ok(self.0)
        }
    }

    struct NoOutput;

    impl Classifier for NoOutput {
        fn kind(&self) -> &str {
            "transformer"
        }
        fn output(&self) -> Option<OutputKind> {
            None
        }
    }

    fn write_json(dir: &tempfile::TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn zero_decision_score_is_even_odds() {
        let model = LoadedModel::new("svm", Box::new(DecisionOnly(0.0)));
        assert_eq!(model.score(&array![1.0, 2.0]).unwrap(), 0.5);
    }

    #[test]
    fn large_decision_scores_saturate() {
        let model = LoadedModel::new("svm", Box::new(DecisionOnly(1000.0)));
        assert_eq!(model.score(&array![0.0]).unwrap(), 1.0);
        let model = LoadedModel::new("svm", Box::new(DecisionOnly(-1000.0)));
        assert_eq!(model.score(&array![0.0]).unwrap(), 0.0);
    }

    #[test]
    fn model_without_output_is_unsupported() {
        let model = LoadedModel::new("x", Box::new(NoOutput));
        assert_eq!(model.capabilities().output, None);
        let err = model.score(&array![1.0]).unwrap_err();
        assert!(matches!(err, MalscanError::UnsupportedModelKind(k) if k == "transformer"));
    }

    #[test]
    fn non_finite_score_is_rejected() {
        let model = LoadedModel::new("x", Box::new(DecisionOnly(f64::NAN)));
        assert!(model.score(&array![1.0]).is_err());
    }

    #[test]
    fn missing_artifact_is_model_not_found() {
        let err = load_model(
            Path::new("/nonexistent/model.json"),
            "generic",
            &ModelOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, MalscanError::ModelNotFound(_)));
    }

    #[test]
    fn logistic_artifact_loads_with_probability_and_weights() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(
            &dir,
            "lr.json",
            r#"{"kind": "logistic_regression", "coef": [1.0, -1.0], "intercept": 0.0}"#,
        );
        let model = load_model(&path, "apk", &ModelOptions::default()).unwrap();
        assert_eq!(model.name(), "apk");
        assert_eq!(
            model.capabilities(),
            Capabilities {
                output: Some(OutputKind::Probability),
                explanation: Some(ExplanationKind::LinearWeights),
            }
        );
        assert_eq!(model.score(&array![2.0, 2.0]).unwrap(), 0.5);
    }

    #[test]
    fn svm_artifact_is_decision_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(
            &dir,
            "svm.json",
            r#"{"kind": "linear_svm", "coef": [0.5], "intercept": -1.0}"#,
        );
        let model = load_model(&path, "pdf", &ModelOptions::default()).unwrap();
        assert_eq!(model.capabilities().output, Some(OutputKind::DecisionScore));
        assert_eq!(model.score(&array![2.0]).unwrap(), 0.5);
    }

    #[test]
    fn unknown_kind_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(&dir, "m.json", r#"{"kind": "naive_bayes"}"#);
        let err = load_model(&path, "x", &ModelOptions::default()).unwrap_err();
        assert!(matches!(err, MalscanError::MalformedModel { .. }));
    }

    #[test]
    fn metadata_is_informational() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(
            &dir,
            "meta.json",
            r#"{"version": "v1", "notes": ["trained offline"],
                "models": {"apk": {"name": "APK", "model": "LogisticRegression(saga)", "dim": 618,
                                   "train_rows": 10, "test_rows": 2}}}"#,
        );
        let meta = ModelMetadata::load(&path).unwrap();
        assert_eq!(meta.version, "v1");
        assert_eq!(meta.models["apk"].dim, 618);
    }
}
