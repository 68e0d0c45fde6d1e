//! malscan - static malware triage from the command line.
//!
//! Usage:
//!   malscan scan ./samples --pdf-model pdf_model.json --apk-model apk_model.onnx
//!   malscan scan invoice.bin --mime application/pdf --config malscan.json --format json
//!   malscan features dropper.js
//!   malscan generic dropper.js --model model.json --schema schema.json
//!   malscan info --meta artifacts/meta.json

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use malscan_core::config::{GenericModelConfig, MalscanConfig};
use malscan_core::features::ByteFeatureExtractor;
use malscan_core::model::ModelMetadata;
use malscan_core::pipeline::GenericPipeline;
use malscan_core::report::{print_results, OutputFormat};
use malscan_core::router::ModelSpec;
use malscan_core::scan::{run_scan, ScanConfig, ScanProgress};

#[derive(Parser)]
#[command(name = "malscan")]
#[command(about = "Static malware triage for APK, PDF and arbitrary files")]
struct Cli {
    /// JSON config file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Score files or directories with the type-specific models
    Scan(ScanArgs),
    /// Print the named byte features and evidence for one file
    Features(FeaturesArgs),
    /// Score one file with a generic model and schema
    Generic(GenericArgs),
    /// Print training metadata for the model artifacts
    Info(InfoArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Paths to scan (files or directories)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Model artifact for APK files (.json or .onnx)
    #[arg(long)]
    apk_model: Option<PathBuf>,

    /// Model artifact for PDF files (.json or .onnx)
    #[arg(long)]
    pdf_model: Option<PathBuf>,

    /// MIME hint applied to every file
    #[arg(long, default_value = "")]
    mime: String,

    /// Number of contributions kept per result
    #[arg(long)]
    top_k: Option<usize>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    format: OutputFormat,

    /// Skip files whose type has no configured model
    #[arg(long)]
    supported_only: bool,
}

#[derive(Args)]
struct FeaturesArgs {
    file: PathBuf,

    #[arg(long, default_value = "")]
    mime: String,
}

#[derive(Args)]
struct GenericArgs {
    file: PathBuf,

    /// Generic model artifact (.json or .onnx)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Schema the model was trained against
    #[arg(short, long)]
    schema: Option<PathBuf>,

    #[arg(long, default_value = "")]
    mime: String,

    #[arg(long)]
    top_k: Option<usize>,
}

#[derive(Args)]
struct InfoArgs {
    /// Metadata file written alongside the model artifacts
    #[arg(long)]
    meta: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MalscanConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MalscanConfig::default(),
    };

    match cli.command {
        Command::Scan(args) => scan(config, args),
        Command::Features(args) => features(&config, &args),
        Command::Generic(args) => generic(config, args),
        Command::Info(args) => info(&config, args),
    }
}

fn scan(config: MalscanConfig, args: ScanArgs) -> Result<()> {
    let mut models = config.models;
    override_path(&mut models.apk, args.apk_model);
    override_path(&mut models.pdf, args.pdf_model);
    if models.apk.is_none() && models.pdf.is_none() {
        tracing::warn!("no APK or PDF model configured; every file will be reported as unknown");
    }

    for spec in [&models.apk, &models.pdf].into_iter().flatten() {
        eprintln!("[*] Loading model from {}...", spec.path.display());
    }

    let scan_config = ScanConfig {
        target_paths: args.paths,
        models,
        thresholds: config.thresholds,
        top_k: args.top_k.unwrap_or(config.top_k),
        mime_hint: args.mime,
        supported_only: args.supported_only,
    };

    let progress = Arc::new(ScanProgress::new());

    eprintln!("[*] Scanning...");
    let results = run_scan(&scan_config, &progress).context("scan failed")?;

    let total = progress.total_files.load(Ordering::Relaxed);
    eprintln!("[*] Scanned {} files", total);

    if results.is_empty() {
        eprintln!("[*] No files to scan.");
        return Ok(());
    }

    print_results(&results, args.format);

    Ok(())
}

/// Replace only the artifact path, keeping load options from the config file.
fn override_path(spec: &mut Option<ModelSpec>, path: Option<PathBuf>) {
    let Some(path) = path else {
        return;
    };
    match spec.as_mut() {
        Some(existing) => existing.path = path,
        None => *spec = Some(ModelSpec::new(path)),
    }
}

fn features(config: &MalscanConfig, args: &FeaturesArgs) -> Result<()> {
    let extractor =
        ByteFeatureExtractor::new(&config.extractor).context("invalid extractor config")?;
    let data = std::fs::read(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let (features, evidence) = extractor.extract(&data, &args.mime);

    let output = serde_json::json!({
        "features": features,
        "evidence": evidence,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn generic(config: MalscanConfig, args: GenericArgs) -> Result<()> {
    let artifacts = resolve_generic(config.generic, args.model, args.schema)?;

    let pipeline = GenericPipeline::load(
        &artifacts.model,
        &artifacts.schema,
        &artifacts.options,
        &config.extractor,
    )
    .context("loading generic model")?
    .with_thresholds(config.thresholds)
    .with_top_k(args.top_k.unwrap_or(config.generic_top_k));

    let scan = pipeline
        .scan_file(&args.file, &args.mime)
        .with_context(|| format!("scanning {}", args.file.display()))?;
    println!("{}", serde_json::to_string_pretty(&scan)?);
    Ok(())
}

fn resolve_generic(
    configured: Option<GenericModelConfig>,
    model: Option<PathBuf>,
    schema: Option<PathBuf>,
) -> Result<GenericModelConfig> {
    let options = configured
        .as_ref()
        .map(|c| c.options.clone())
        .unwrap_or_default();
    let model = model
        .or_else(|| configured.as_ref().map(|c| c.model.clone()))
        .context("no generic model given (use --model or the config file)")?;
    let schema = schema
        .or_else(|| configured.as_ref().map(|c| c.schema.clone()))
        .context("no schema given (use --schema or the config file)")?;
    Ok(GenericModelConfig {
        model,
        schema,
        options,
    })
}

fn info(config: &MalscanConfig, args: InfoArgs) -> Result<()> {
    let path = args
        .meta
        .or_else(|| config.metadata.clone())
        .context("no metadata file given (use --meta or the config file)")?;
    print_metadata(&path)
}

fn print_metadata(path: &Path) -> Result<()> {
    let meta = ModelMetadata::load(path)
        .with_context(|| format!("loading metadata {}", path.display()))?;

    println!("Version: {}", meta.version);
    for note in &meta.notes {
        println!("Note:    {note}");
    }
    for (key, m) in &meta.models {
        println!(
            "  {:<6} {:<24} kind={:<20} dim={:<5} train={} test={}",
            key, m.name, m.model, m.dim, m.train_rows, m.test_rows
        );
    }
    Ok(())
}
