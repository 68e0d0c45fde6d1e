//! High-dimensional byte and string statistics for the type-specific models.
//!
//! Layout of the 618-value vector:
//! - `[0, 2)`     general: size, whole-file entropy
//! - `[2, 258)`   byte histogram, normalized
//! - `[258, 514)` byte-entropy histogram: sliding 2048-byte windows (step
//!   1024), each window adds its bytes' high nibbles to the row of its
//!   entropy bucket (16 x 16), normalized
//! - `[514, 618)` strings: count, average length, printable total,
//!   96-bin printable distribution, character entropy, then counts of
//!   `c:\` paths, URLs, `HKEY_` registry keys and `MZ` markers

use std::sync::LazyLock;

use aho_corasick::AhoCorasick;

use crate::features::{byte_histogram, entropy_from_counts, printable_strings, shannon_entropy};

pub const GENERAL_DIM: usize = 2;
pub const HISTOGRAM_DIM: usize = 256;
pub const BYTE_ENTROPY_DIM: usize = 256;
pub const STRINGS_DIM: usize = 104;
pub const EXTENDED_DIM: usize = GENERAL_DIM + HISTOGRAM_DIM + BYTE_ENTROPY_DIM + STRINGS_DIM;

const WINDOW: usize = 2048;
const STEP: usize = 1024;
const ENTROPY_BUCKETS: usize = 16;
const NIBBLES: usize = 16;
const MIN_STRING_LEN: usize = 5;
const PRINTABLE_CHARS: usize = 96;

/// Lower-case string markers, counted in this order.
const MARKERS: [&str; 4] = ["c:\\", "http://", "https://", "hkey_"];

static MARKER_MATCHER: LazyLock<AhoCorasick> =
    LazyLock::new(|| AhoCorasick::new(MARKERS).unwrap());

/// Builds a fixed-length vector straight from bytes, with no named schema.
pub trait VectorExtractor: Send + Sync {
    fn dim(&self) -> usize;

    /// Always returns exactly `dim()` values.
    fn feature_vector(&self, data: &[u8]) -> Vec<f32>;
}

/// General file info + byte statistics + string statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteStatsExtractor;

impl VectorExtractor for ByteStatsExtractor {
    fn dim(&self) -> usize {
        EXTENDED_DIM
    }

    fn feature_vector(&self, data: &[u8]) -> Vec<f32> {
        let mut out = Vec::with_capacity(EXTENDED_DIM);
        out.push(data.len() as f32);
        out.push(shannon_entropy(data) as f32);
        out.extend_from_slice(&byte_histogram(data));
        out.extend_from_slice(&byte_entropy_histogram(data));
        out.extend(string_stats(data));
        debug_assert_eq!(out.len(), EXTENDED_DIM);
        out
    }
}

/// Joint (window entropy bucket, byte high nibble) distribution.
fn byte_entropy_histogram(data: &[u8]) -> [f32; BYTE_ENTROPY_DIM] {
    let mut counts = [0u64; BYTE_ENTROPY_DIM];

    let mut add_window = |window: &[u8]| {
        let mut nibble_counts = [0u64; NIBBLES];
        for &b in window {
            nibble_counts[(b >> 4) as usize] += 1;
        }
        // Nibble entropy is at most 4 bits; scale onto 16 buckets.
        let h = entropy_from_counts(&nibble_counts, window.len() as u64) * 4.0;
        let bucket = (h as usize).min(ENTROPY_BUCKETS - 1);
        for (n, &c) in nibble_counts.iter().enumerate() {
            counts[bucket * NIBBLES + n] += c;
        }
    };

    if data.len() < WINDOW {
        if !data.is_empty() {
            add_window(data);
        }
    } else {
        let mut start = 0;
        while start + WINDOW <= data.len() {
            add_window(&data[start..start + WINDOW]);
            start += STEP;
        }
    }

    normalize(&counts)
}

fn normalize<const N: usize>(counts: &[u64; N]) -> [f32; N] {
    let total: u64 = counts.iter().sum();
    let mut out = [0.0f32; N];
    if total > 0 {
        for (o, &c) in out.iter_mut().zip(counts.iter()) {
            *o = (c as f64 / total as f64) as f32;
        }
    }
    out
}

fn string_stats(data: &[u8]) -> Vec<f32> {
    let strings = printable_strings(data, MIN_STRING_LEN);

    let mut dist = [0u64; PRINTABLE_CHARS];
    let mut printables = 0u64;
    for s in &strings {
        for &b in *s {
            dist[(b - 0x20) as usize] += 1;
        }
        printables += s.len() as u64;
    }

    let avg_len = if strings.is_empty() {
        0.0
    } else {
        printables as f64 / strings.len() as f64
    };

    let lower = data.to_ascii_lowercase();
    let mut markers = [0u64; MARKERS.len()];
    for m in MARKER_MATCHER.find_overlapping_iter(&lower) {
        markers[m.pattern().as_usize()] += 1;
    }

    let mut out = Vec::with_capacity(STRINGS_DIM);
    out.push(strings.len() as f32);
    out.push(avg_len as f32);
    out.push(printables as f32);
    out.extend_from_slice(&normalize(&dist));
    out.push(entropy_from_counts(&dist, printables) as f32);
    out.push(markers[0] as f32);
    out.push((markers[1] + markers[2]) as f32);
    out.push(markers[3] as f32);
    // Case-sensitive: `mz` inside ordinary text is not a PE header.
    out.push(data.windows(2).filter(|w| *w == b"MZ").count() as f32);
    out
}
