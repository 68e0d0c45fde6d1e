//! Batch scanning over files and directory trees with progress tracking.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{MalscanError, Result};
use crate::report::ScanResult;
use crate::router::{detect_file_type, ModelPaths, Router, DEFAULT_TOP_K};
use crate::score::{Verdict, VerdictThresholds};

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub target_paths: Vec<PathBuf>,
    pub models: ModelPaths,
    pub thresholds: VerdictThresholds,
    pub top_k: usize,
    /// Applied to every file; empty means detect by extension.
    pub mime_hint: String,
    /// Skip files whose type has no registered model instead of reporting
    /// them as `unknown`.
    pub supported_only: bool,
}

impl ScanConfig {
    pub fn new(target_paths: Vec<PathBuf>, models: ModelPaths) -> Self {
        Self {
            target_paths,
            models,
            thresholds: VerdictThresholds::default(),
            top_k: DEFAULT_TOP_K,
            mime_hint: String::new(),
            supported_only: false,
        }
    }
}

/// Shared counters, updated lock-free from the worker threads.
#[derive(Debug, Default)]
pub struct ScanProgress {
    pub total_files: AtomicUsize,
    pub scanned_files: AtomicUsize,
    pub malicious_count: AtomicUsize,
    pub suspicious_count: AtomicUsize,
    pub error_count: AtomicUsize,
    pub cancel: AtomicBool,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, result: &ScanResult) {
        if result.error.is_some() {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        match result.verdict() {
            Some(Verdict::Malicious) => {
                self.malicious_count.fetch_add(1, Ordering::Relaxed);
            }
            Some(Verdict::Suspicious) => {
                self.suspicious_count.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        self.scanned_files.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let data = fs::read(path).map_err(|e| MalscanError::io(path, e))?;
    Ok(sha256_hex(&data))
}

/// Expand directories recursively, keeping the files `keep` accepts.
pub fn collect_files(paths: &[PathBuf], keep: impl Fn(&Path) -> bool) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_file() {
            if keep(path) {
                files.push(path.clone());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path).follow_links(false).into_iter().flatten() {
                let p = entry.into_path();
                if p.is_file() && keep(&p) {
                    files.push(p);
                }
            }
        } else {
            tracing::warn!(path = %path.display(), "skipping missing target");
        }
    }

    files.sort();
    files
}

/// Load the configured models once and score every target file in parallel.
/// Blocking; a failing file becomes an error row instead of aborting the run.
pub fn run_scan(config: &ScanConfig, progress: &Arc<ScanProgress>) -> Result<Vec<ScanResult>> {
    let router = Router::from_paths(&config.models, config.thresholds, config.top_k)?;
    run_scan_with(&router, config, progress)
}

pub fn run_scan_with(
    router: &Router,
    config: &ScanConfig,
    progress: &Arc<ScanProgress>,
) -> Result<Vec<ScanResult>> {
    let mime = config.mime_hint.as_str();
    let files = collect_files(&config.target_paths, |p| {
        !config.supported_only || router.supports(detect_file_type(p, mime))
    });
    progress.total_files.store(files.len(), Ordering::Relaxed);
    tracing::info!(files = files.len(), "starting scan");

    let results: Vec<ScanResult> = files
        .par_iter()
        .filter_map(|path| {
            if progress.cancel.load(Ordering::Relaxed) {
                return None;
            }
            let result = scan_one(router, path, mime);
            progress.record(&result);
            Some(result)
        })
        .collect();

    Ok(results)
}

fn scan_one(router: &Router, path: &Path, mime: &str) -> ScanResult {
    let mut row = ScanResult {
        path: path.to_path_buf(),
        sha256: None,
        size_bytes: 0,
        result: None,
        error: None,
    };

    // Unsupported types are reported without reading the file.
    let file_type = detect_file_type(path, mime);
    if !router.supports(file_type) {
        row.size_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        row.result = router.infer(path, mime).ok();
        return row;
    }

    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "read failed");
            row.error = Some(format!("read error: {e}"));
            return row;
        }
    };
    row.sha256 = Some(sha256_hex(&data));
    row.size_bytes = data.len() as u64;

    match router.infer_bytes(&data, path, mime) {
        Ok(result) => row.result = Some(result),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "inference failed");
            row.error = Some(format!("inference error: {e}"));
        }
    }
    row
}
