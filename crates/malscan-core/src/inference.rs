//! ONNX classifier loading and inference via the `ort` crate.

use std::path::Path;
use std::sync::Mutex;

use ndarray::{ArrayView1, Axis};
use ort::session::Session;
use ort::value::TensorRef;

use crate::error::{MalscanError, Result};
use crate::model::{Classifier, ModelOptions, OutputKind};

fn onnx_err(e: impl std::fmt::Display) -> MalscanError {
    MalscanError::Onnx(e.to_string())
}

/// A single-input ONNX graph scoring one row vector at a time.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    output: OutputKind,
}

impl OnnxClassifier {
    pub fn load(model_path: &Path, options: &ModelOptions) -> Result<Self> {
        let session = Session::builder()
            .map_err(onnx_err)?
            .with_intra_threads(4)
            .map_err(onnx_err)?
            .commit_from_file(model_path)
            .map_err(onnx_err)?;

        let malformed = |reason: &str| MalscanError::MalformedModel {
            path: model_path.to_path_buf(),
            reason: reason.to_string(),
        };
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| malformed("graph declares no inputs"))?;
        let declared: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        let output_name = resolve_output_name(&declared, options.onnx_output_name.as_deref())
            .map_err(|reason| malformed(&reason))?;

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            output: options.onnx_output,
        })
    }

    /// Run the graph on `x` reshaped to `(1, n)` and return the last value
    /// of the scored output, i.e. the positive-class column for `(1, 2)`
    /// probability outputs and the sole value for decision outputs.
    fn run(&self, x: ArrayView1<'_, f32>) -> Result<f64> {
        // Add batch dimension: (n,) -> (1, n)
        let input = x.to_owned().insert_axis(Axis(0));
        let input_tensor = TensorRef::from_array_view(&input).map_err(onnx_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| MalscanError::Onnx(format!("lock error: {e}")))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(onnx_err)?;

        let output_array = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(onnx_err)?;
        let score = output_array
            .iter()
            .last()
            .copied()
            .ok_or_else(|| MalscanError::Onnx(format!("output {} is empty", self.output_name)))?;

        Ok(score as f64)
    }
}

impl Classifier for OnnxClassifier {
    fn kind(&self) -> &str {
        "onnx"
    }

    fn output(&self) -> Option<OutputKind> {
        Some(self.output)
    }

    fn predict_proba(&self, x: ArrayView1<'_, f32>) -> Result<f64> {
        ensure_output(self.output, OutputKind::Probability)?;
        self.run(x)
    }

    fn decision_function(&self, x: ArrayView1<'_, f32>) -> Result<f64> {
        ensure_output(self.output, OutputKind::DecisionScore)?;
        self.run(x)
    }
}

/// The requested output if the graph declares it, else the first output.
fn resolve_output_name(
    declared: &[&str],
    requested: Option<&str>,
) -> std::result::Result<String, String> {
    match requested {
        Some(name) if declared.contains(&name) => Ok(name.to_string()),
        Some(name) => Err(format!("graph has no output named {name}")),
        None => declared
            .first()
            .map(|n| n.to_string())
            .ok_or_else(|| "graph declares no outputs".to_string()),
    }
}

/// A graph only answers for the output kind it was configured with.
fn ensure_output(configured: OutputKind, wanted: OutputKind) -> Result<()> {
    if configured == wanted {
        Ok(())
    } else {
        Err(MalscanError::UnsupportedModelKind("onnx".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_output_kind_gates_each_call() {
        let options: ModelOptions = serde_json::from_str(r#"{"onnx_output": "decision"}"#).unwrap();
        assert!(ensure_output(options.onnx_output, OutputKind::DecisionScore).is_ok());
        assert!(matches!(
            ensure_output(options.onnx_output, OutputKind::Probability),
            Err(MalscanError::UnsupportedModelKind(_))
        ));

        let defaults = ModelOptions::default();
        assert!(ensure_output(defaults.onnx_output, OutputKind::Probability).is_ok());
    }

    #[test]
    fn output_name_defaults_to_first_declared() {
        let declared = ["label", "probabilities"];
        assert_eq!(resolve_output_name(&declared, None).unwrap(), "label");
        assert_eq!(
            resolve_output_name(&declared, Some("probabilities")).unwrap(),
            "probabilities"
        );
    }

    #[test]
    fn unknown_or_missing_outputs_are_rejected() {
        assert!(resolve_output_name(&["label"], Some("score")).is_err());
        assert!(resolve_output_name(&[], None).is_err());
    }
}
