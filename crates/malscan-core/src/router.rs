//! File-type detection and dispatch to type-specific models.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{MalscanError, Result};
use crate::explain::{explain, Contribution};
use crate::extended::{ByteStatsExtractor, VectorExtractor};
use crate::model::{load_model, LoadedModel, ModelOptions};
use crate::score::{score_percent, Verdict, VerdictThresholds};

pub const DEFAULT_TOP_K: usize = 10;

const UNSUPPORTED_NOTE: &str =
    "Unsupported file type: no model and extractor are registered for it.";
const VECTOR_NOTES: [&str; 2] = [
    "Features are byte/string statistics vectors; 'f0..fN' are vector indices.",
    "APK and PDF models use general file info + byte statistics + string statistics.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    Apk,
    Pdf,
    Other,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Apk => "APK",
            FileType::Pdf => "PDF",
            FileType::Other => "OTHER",
        }
    }

    /// Identifier recorded as `model_used` for this type's model.
    pub fn model_name(self) -> &'static str {
        match self {
            FileType::Apk => "apk",
            FileType::Pdf => "pdf",
            FileType::Other => "",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// MIME hint first (substring match), then the file extension.
pub fn detect_file_type(path: &Path, mime_hint: &str) -> FileType {
    if !mime_hint.is_empty() {
        let mime = mime_hint.to_ascii_lowercase();
        if mime.contains("pdf") {
            return FileType::Pdf;
        }
        if mime.contains("android.package-archive") {
            return FileType::Apk;
        }
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => FileType::Pdf,
        Some("apk") => FileType::Apk,
        _ => FileType::Other,
    }
}

/// Human-auditable explanation attached to a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reasons {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_contributions: Vec<Contribution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub detected_type: FileType,
    pub score_percent: u8,
    pub verdict: Verdict,
    pub model_used: String,
    pub reasons: Reasons,
}

impl InferenceResult {
    /// Zero-score `unknown` result for a type with no registered model.
    pub fn unsupported(detected_type: FileType) -> Self {
        Self {
            detected_type,
            score_percent: 0,
            verdict: Verdict::Unknown,
            model_used: String::new(),
            reasons: Reasons {
                error: Some(UNSUPPORTED_NOTE.to_string()),
                ..Reasons::default()
            },
        }
    }
}

/// Model artifact for one file type plus how to load it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub path: PathBuf,
    #[serde(flatten)]
    pub options: ModelOptions,
}

impl ModelSpec {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: ModelOptions::default(),
        }
    }
}

/// Model artifacts keyed by the file type they score.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPaths {
    pub apk: Option<ModelSpec>,
    pub pdf: Option<ModelSpec>,
}

impl ModelPaths {
    pub fn get(&self, file_type: FileType) -> Option<&ModelSpec> {
        match file_type {
            FileType::Apk => self.apk.as_ref(),
            FileType::Pdf => self.pdf.as_ref(),
            FileType::Other => None,
        }
    }
}

struct Route {
    model: LoadedModel,
    extractor: Box<dyn VectorExtractor>,
}

/// Registered (model, extractor) pairs per file type. Immutable once built,
/// so one router can serve many threads.
pub struct Router {
    routes: HashMap<FileType, Route>,
    thresholds: VerdictThresholds,
    top_k: usize,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(VerdictThresholds::default(), DEFAULT_TOP_K)
    }
}

impl Router {
    pub fn new(thresholds: VerdictThresholds, top_k: usize) -> Self {
        Self {
            routes: HashMap::new(),
            thresholds,
            top_k,
        }
    }

    /// Load every configured model, pairing each with the byte-statistics
    /// extractor.
    pub fn from_paths(
        paths: &ModelPaths,
        thresholds: VerdictThresholds,
        top_k: usize,
    ) -> Result<Self> {
        let mut router = Self::new(thresholds, top_k);
        for file_type in [FileType::Apk, FileType::Pdf] {
            if let Some(spec) = paths.get(file_type) {
                let model = load_model(&spec.path, file_type.model_name(), &spec.options)?;
                router.register(file_type, model, Box::new(ByteStatsExtractor));
            }
        }
        Ok(router)
    }

    pub fn register(
        &mut self,
        file_type: FileType,
        model: LoadedModel,
        extractor: Box<dyn VectorExtractor>,
    ) {
        self.routes.insert(file_type, Route { model, extractor });
    }

    pub fn supports(&self, file_type: FileType) -> bool {
        self.routes.contains_key(&file_type)
    }

    pub fn infer(&self, file_path: &Path, mime_hint: &str) -> Result<InferenceResult> {
        let file_type = detect_file_type(file_path, mime_hint);
        if !self.supports(file_type) {
            tracing::warn!(path = %file_path.display(), %file_type, "unsupported file type");
            return Ok(InferenceResult::unsupported(file_type));
        }
        let data = fs::read(file_path).map_err(|e| MalscanError::io(file_path, e))?;
        self.score_as(file_type, &data)
    }

    /// Score in-memory bytes; `file_path` is only used for type detection.
    pub fn infer_bytes(
        &self,
        data: &[u8],
        file_path: &Path,
        mime_hint: &str,
    ) -> Result<InferenceResult> {
        let file_type = detect_file_type(file_path, mime_hint);
        self.score_as(file_type, data)
    }

    fn score_as(&self, file_type: FileType, data: &[u8]) -> Result<InferenceResult> {
        let Some(route) = self.routes.get(&file_type) else {
            tracing::warn!(%file_type, "unsupported file type");
            return Ok(InferenceResult::unsupported(file_type));
        };

        let x = Array1::from(route.extractor.feature_vector(data));
        let probability = route.model.score(&x)?;
        let score = score_percent(probability);
        let verdict = self.thresholds.verdict(score);
        tracing::debug!(%file_type, probability, score, %verdict, "scored sample");

        let reasons = Reasons {
            model: route.model.name().to_string(),
            top_contributions: explain(&route.model, &x, &[], self.top_k),
            notes: VECTOR_NOTES.iter().map(|s| s.to_string()).collect(),
            error: None,
        };

        Ok(InferenceResult {
            detected_type: file_type,
            score_percent: score,
            verdict,
            model_used: route.model.name().to_string(),
            reasons,
        })
    }
}

/// Detect the type of `file_path`, load that type's model and score the
/// file. Types without a configured model yield an `unknown` result.
pub fn infer(
    file_path: &Path,
    mime_hint: &str,
    model_paths: &ModelPaths,
) -> Result<InferenceResult> {
    let file_type = detect_file_type(file_path, mime_hint);
    let Some(spec) = model_paths.get(file_type) else {
        tracing::warn!(path = %file_path.display(), %file_type, "no model registered");
        return Ok(InferenceResult::unsupported(file_type));
    };

    let model = load_model(&spec.path, file_type.model_name(), &spec.options)?;
    let mut router = Router::default();
    router.register(file_type, model, Box::new(ByteStatsExtractor));
    router.infer(file_path, mime_hint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_fallback() {
        assert_eq!(detect_file_type(Path::new("a/report.pdf"), ""), FileType::Pdf);
        assert_eq!(detect_file_type(Path::new("app.APK"), ""), FileType::Apk);
        assert_eq!(detect_file_type(Path::new("setup.exe"), ""), FileType::Other);
        assert_eq!(detect_file_type(Path::new("noext"), ""), FileType::Other);
    }

    #[test]
    fn mime_takes_precedence() {
        assert_eq!(
            detect_file_type(Path::new("x.apk"), "application/pdf"),
            FileType::Pdf
        );
        assert_eq!(
            detect_file_type(Path::new("x.bin"), "application/vnd.android.package-archive"),
            FileType::Apk
        );
    }

    #[test]
    fn unrelated_mime_falls_back_to_extension() {
        assert_eq!(
            detect_file_type(Path::new("x.pdf"), "application/octet-stream"),
            FileType::Pdf
        );
        assert_eq!(
            detect_file_type(Path::new("x.zip"), "application/zip"),
            FileType::Other
        );
    }

    #[test]
    fn display_honours_width() {
        assert_eq!(format!("[{:<5}]", FileType::Pdf), "[PDF  ]");
        assert_eq!(format!("[{:>5}]", FileType::Other), "[OTHER]");
        assert_eq!(FileType::Apk.to_string(), "APK");
    }

    #[test]
    fn unsupported_result_shape() {
        let r = InferenceResult::unsupported(FileType::Other);
        assert_eq!(r.score_percent, 0);
        assert_eq!(r.verdict, Verdict::Unknown);
        assert!(r.model_used.is_empty());
        assert!(r.reasons.error.is_some());

        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["detected_type"], "OTHER");
        assert_eq!(json["verdict"], "unknown");
        assert!(json["reasons"].get("top_contributions").is_none());
    }

    #[test]
    fn unconfigured_type_is_unknown_without_reading_the_file() {
        let r = infer(Path::new("/nonexistent/doc.pdf"), "", &ModelPaths::default()).unwrap();
        assert_eq!(r.detected_type, FileType::Pdf);
        assert_eq!(r.verdict, Verdict::Unknown);
    }

    #[test]
    fn configured_but_missing_model_is_an_error() {
        let paths = ModelPaths {
            apk: Some(ModelSpec::new("/nonexistent/apk_model.json")),
            pdf: None,
        };
        let err = infer(Path::new("x.apk"), "", &paths).unwrap_err();
        assert!(matches!(err, MalscanError::ModelNotFound(_)));
    }

    #[test]
    fn model_spec_flattens_options() {
        let spec: ModelSpec = serde_json::from_str(
            r#"{"path": "m.onnx", "onnx_output": "decision", "onnx_output_name": "score"}"#,
        )
        .unwrap();
        assert_eq!(spec.path, PathBuf::from("m.onnx"));
        assert_eq!(spec.options.onnx_output, crate::model::OutputKind::DecisionScore);
        assert_eq!(spec.options.onnx_output_name.as_deref(), Some("score"));
    }
}
