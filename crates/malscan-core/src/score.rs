//! Probability → percentage → verdict.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Malicious,
    Suspicious,
    Benign,
    /// No model is registered for the detected file type.
    Unknown,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Malicious => "malicious",
            Verdict::Suspicious => "suspicious",
            Verdict::Benign => "benign",
            Verdict::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Lower bounds (inclusive, in percent) of the malicious and suspicious bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerdictThresholds {
    pub malicious: u8,
    pub suspicious: u8,
}

impl Default for VerdictThresholds {
    fn default() -> Self {
        Self {
            malicious: 70,
            suspicious: 30,
        }
    }
}

impl VerdictThresholds {
    /// Evaluated top-down: malicious first, then suspicious, else benign.
    pub fn verdict(&self, score_percent: u8) -> Verdict {
        if score_percent >= self.malicious {
            Verdict::Malicious
        } else if score_percent >= self.suspicious {
            Verdict::Suspicious
        } else {
            Verdict::Benign
        }
    }
}

/// `round(p * 100)`, halves rounded up, clamped to `0..=100`.
pub fn score_percent(probability: f64) -> u8 {
    if !probability.is_finite() {
        return 0;
    }
    (probability * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Verdict under the default 70 / 30 thresholds.
pub fn verdict_from_score(score_percent: u8) -> Verdict {
    VerdictThresholds::default().verdict(score_percent)
}
