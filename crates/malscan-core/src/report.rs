//! Output formatting for scan results.

use std::path::PathBuf;

use serde::Serialize;

use crate::router::InferenceResult;
use crate::score::Verdict;

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<InferenceResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanResult {
    pub fn verdict(&self) -> Option<Verdict> {
        self.result.as_ref().map(|r| r.verdict)
    }

    fn is(&self, verdict: Verdict) -> bool {
        self.verdict() == Some(verdict)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {s}. Use 'text' or 'json'.")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub malicious: usize,
    pub suspicious: usize,
    pub benign: usize,
    pub unsupported: usize,
    pub errors: usize,
}

pub fn summarize(results: &[ScanResult]) -> Summary {
    let count = |v: Verdict| results.iter().filter(|r| r.is(v)).count();
    Summary {
        total: results.len(),
        malicious: count(Verdict::Malicious),
        suspicious: count(Verdict::Suspicious),
        benign: count(Verdict::Benign),
        unsupported: count(Verdict::Unknown),
        errors: results.iter().filter(|r| r.error.is_some()).count(),
    }
}

pub fn render(results: &[ScanResult], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => render_text(results),
        OutputFormat::Json => render_json(results),
    }
}

pub fn print_results(results: &[ScanResult], format: OutputFormat) {
    println!("{}", render(results, format));
}

fn render_text(results: &[ScanResult]) -> String {
    let mut out = String::new();
    let rule = "=".repeat(70);
    let summary = summarize(results);

    out.push_str(&format!("\n{rule}\nSCAN RESULTS\n{rule}\n"));

    for (title, verdict) in [
        ("MALICIOUS FILES", Verdict::Malicious),
        ("SUSPICIOUS FILES", Verdict::Suspicious),
    ] {
        let hits: Vec<_> = results.iter().filter(|r| r.is(verdict)).collect();
        if hits.is_empty() {
            continue;
        }
        out.push_str(&format!("\n{title} ({}):\n", hits.len()));
        for r in hits {
            if let Some(res) = &r.result {
                out.push_str(&format!(
                    "  [{:>3}%] {:<5} {}\n",
                    res.score_percent,
                    res.detected_type,
                    r.path.display()
                ));
                for c in res.reasons.top_contributions.iter().take(3) {
                    let weight = c.contribution.or(c.importance).unwrap_or(0.0);
                    out.push_str(&format!(
                        "           {} = {} ({:+.4})\n",
                        c.feature, c.value, weight
                    ));
                }
            }
        }
    }

    let errors: Vec<_> = results.iter().filter(|r| r.error.is_some()).collect();
    if !errors.is_empty() {
        out.push_str(&format!("\nERRORS ({}):\n", errors.len()));
        for r in &errors {
            let err = r.error.as_deref().unwrap_or("unknown");
            out.push_str(&format!("  [ERR ] {} -- {}\n", r.path.display(), err));
        }
    }

    out.push_str("\nSUMMARY:\n");
    out.push_str(&format!("  Total files scanned: {}\n", summary.total));
    out.push_str(&format!("  Malicious:           {}\n", summary.malicious));
    out.push_str(&format!("  Suspicious:          {}\n", summary.suspicious));
    out.push_str(&format!("  Benign:              {}\n", summary.benign));
    out.push_str(&format!("  Unsupported type:    {}\n", summary.unsupported));
    out.push_str(&format!("  Errors:              {}\n", summary.errors));
    out.push_str(&rule);
    out
}

fn render_json(results: &[ScanResult]) -> String {
    let output = serde_json::json!({
        "results": results,
        "summary": summarize(results),
    });
    serde_json::to_string_pretty(&output).unwrap_or_default()
}
