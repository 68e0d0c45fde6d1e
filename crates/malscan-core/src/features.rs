//! Byte-level feature extraction for the generic scoring path.
//!
//! Every input buffer maps to a flat name → value table:
//! - `size_bytes`, `entropy` (Shannon, bits), `high_entropy_flag`
//! - `num_strings`, `total_string_bytes` over printable ASCII runs
//! - `url_count`, `ip_count`, `email_count`, `suspicious_kw_count`
//! - `hist_0` .. `hist_255`: fraction of bytes with each value
//!
//! Matched indicators are collected separately as [`Evidence`] and never
//! feed back into the numeric features.

use std::collections::{BTreeMap, BTreeSet};

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::indicators::{
    IndicatorPatterns, DEFAULT_SUSPICIOUS_KEYWORDS, EMAIL_PATTERN, IPV4_PATTERN, URL_PATTERN,
};

pub const NUM_BINS: usize = 256;
const PRINTABLE_MIN: u8 = 0x20;
const PRINTABLE_MAX: u8 = 0x7e;

/// Named numeric features. Ordered by name so serialization is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureMap(BTreeMap<String, f32>);

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f32) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, f32)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Observed indicators, each list capped at [`ExtractorConfig::evidence_cap`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub mime_type: String,
    pub suspicious_keywords: Vec<String>,
    pub urls: Vec<String>,
    pub ips: Vec<String>,
    pub emails: Vec<String>,
    pub entropy: f64,
}

/// Heuristic knobs for the extractor. All have working defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub suspicious_keywords: Vec<String>,
    /// Entropy (bits) at or above which content is flagged as packed/encrypted.
    pub high_entropy_threshold: f64,
    pub min_string_len: usize,
    pub evidence_cap: usize,
    pub url_pattern: String,
    pub ip_pattern: String,
    pub email_pattern: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            suspicious_keywords: DEFAULT_SUSPICIOUS_KEYWORDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            high_entropy_threshold: 7.2,
            min_string_len: 4,
            evidence_cap: 20,
            url_pattern: URL_PATTERN.to_string(),
            ip_pattern: IPV4_PATTERN.to_string(),
            email_pattern: EMAIL_PATTERN.to_string(),
        }
    }
}

/// Stateless extractor holding compiled patterns and immutable keyword lists.
#[derive(Debug, Clone)]
pub struct ByteFeatureExtractor {
    patterns: IndicatorPatterns,
    /// Lower-cased keywords; pattern ids in `keyword_matcher` index this list.
    keywords: Vec<String>,
    keyword_matcher: Option<AhoCorasick>,
    high_entropy_threshold: f64,
    min_string_len: usize,
    evidence_cap: usize,
}

impl Default for ByteFeatureExtractor {
    fn default() -> Self {
        let config = ExtractorConfig::default();
        Self::with_patterns(&config, IndicatorPatterns::default())
    }
}

impl ByteFeatureExtractor {
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        let patterns =
            IndicatorPatterns::new(&config.url_pattern, &config.ip_pattern, &config.email_pattern)?;
        Ok(Self::with_patterns(config, patterns))
    }

    pub fn with_patterns(config: &ExtractorConfig, patterns: IndicatorPatterns) -> Self {
        let keywords: Vec<String> = config
            .suspicious_keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| k.to_ascii_lowercase())
            .collect();
        let keyword_matcher = if keywords.is_empty() {
            None
        } else {
            match AhoCorasick::new(&keywords) {
                Ok(matcher) => Some(matcher),
                Err(e) => {
                    tracing::warn!(error = %e, "keyword matcher build failed; keywords disabled");
                    None
                }
            }
        };
        Self {
            patterns,
            keywords,
            keyword_matcher,
            high_entropy_threshold: config.high_entropy_threshold,
            // A zero minimum would count every gap between bytes as a string.
            min_string_len: config.min_string_len.max(1),
            evidence_cap: config.evidence_cap,
        }
    }

    /// Extract features and evidence from raw bytes. Never fails.
    pub fn extract(&self, data: &[u8], mime_hint: &str) -> (FeatureMap, Evidence) {
        let entropy = shannon_entropy(data);
        let hist = byte_histogram(data);

        let strings = printable_strings(data, self.min_string_len);
        let total_string_bytes: usize = strings.iter().map(|s| s.len()).sum();

        let lower = data.to_ascii_lowercase();
        let urls = self.scan(&self.patterns.url, &lower);
        let ips = self.scan(&self.patterns.ipv4, &lower);
        let emails = self.scan(&self.patterns.email, &lower);

        let keyword_hits = self.keyword_hits(&lower);

        let high_entropy = if entropy >= self.high_entropy_threshold {
            1.0
        } else {
            0.0
        };

        let mut features = FeatureMap::new();
        features.insert("size_bytes", data.len() as f32);
        features.insert("entropy", entropy as f32);
        features.insert("high_entropy_flag", high_entropy);
        features.insert("num_strings", strings.len() as f32);
        features.insert("total_string_bytes", total_string_bytes as f32);
        features.insert("url_count", urls.count as f32);
        features.insert("ip_count", ips.count as f32);
        features.insert("email_count", emails.count as f32);
        features.insert("suspicious_kw_count", keyword_hits.len() as f32);
        for (i, &v) in hist.iter().enumerate() {
            features.insert(format!("hist_{i}"), v);
        }

        let evidence = Evidence {
            mime_type: mime_hint.to_string(),
            suspicious_keywords: keyword_hits
                .iter()
                .take(self.evidence_cap)
                .map(|s| s.to_string())
                .collect(),
            urls: urls.samples,
            ips: ips.samples,
            emails: emails.samples,
            entropy,
        };

        tracing::debug!(
            size = data.len(),
            entropy,
            keywords = keyword_hits.len(),
            "extracted byte features"
        );

        (features, evidence)
    }

    /// Distinct keywords present in `lower`, in configuration order.
    fn keyword_hits(&self, lower: &[u8]) -> Vec<&str> {
        let Some(matcher) = &self.keyword_matcher else {
            return Vec::new();
        };
        let ids: BTreeSet<usize> = matcher
            .find_overlapping_iter(lower)
            .map(|m| m.pattern().as_usize())
            .collect();
        ids.into_iter().map(|id| self.keywords[id].as_str()).collect()
    }

    fn scan(&self, re: &regex::bytes::Regex, haystack: &[u8]) -> ScanHits {
        let mut hits = ScanHits::default();
        for m in re.find_iter(haystack) {
            if hits.samples.len() < self.evidence_cap {
                hits.samples.push(String::from_utf8_lossy(m.as_bytes()).into_owned());
            }
            hits.count += 1;
        }
        hits
    }
}

#[derive(Default)]
struct ScanHits {
    count: usize,
    samples: Vec<String>,
}

/// Shannon entropy of the byte-value distribution, in bits (0.0 ..= 8.0).
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; NUM_BINS];
    for &b in data {
        counts[b as usize] += 1;
    }
    entropy_from_counts(&counts, data.len() as u64)
}

pub(crate) fn entropy_from_counts(counts: &[u64], total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    let mut entropy = 0.0f64;
    for &c in counts {
        if c > 0 {
            let p = c as f64 / total;
            entropy -= p * p.log2();
        }
    }
    entropy.min(8.0)
}

/// Fraction of bytes holding each value; all zero for empty input.
pub fn byte_histogram(data: &[u8]) -> [f32; NUM_BINS] {
    let mut counts = [0u64; NUM_BINS];
    for &b in data {
        counts[b as usize] += 1;
    }

    let mut result = [0.0f32; NUM_BINS];
    if !data.is_empty() {
        let total = data.len() as f64;
        for i in 0..NUM_BINS {
            result[i] = (counts[i] as f64 / total) as f32;
        }
    }
    result
}

/// Maximal runs of printable ASCII (0x20..=0x7e) at least `min_len` long.
pub fn printable_strings(data: &[u8], min_len: usize) -> Vec<&[u8]> {
    let mut out = Vec::new();
    let mut start = None;

    for (i, &b) in data.iter().enumerate() {
        let printable = (PRINTABLE_MIN..=PRINTABLE_MAX).contains(&b);
        match (printable, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                if i - s >= min_len {
                    out.push(&data[s..i]);
                }
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        if data.len() - s >= min_len {
            out.push(&data[s..]);
        }
    }
    out
}
