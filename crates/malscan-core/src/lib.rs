//! malscan-core: static malware triage for byte buffers and files.
//!
//! Provides byte feature extraction, schema-driven vectorization, model
//! adapters (JSON linear/forest artifacts and ONNX), scoring with verdicts,
//! per-feature explanations, file-type routing and batch scanning used by
//! the CLI.

pub mod config;
pub mod error;
pub mod explain;
pub mod extended;
pub mod features;
pub mod forest;
pub mod indicators;
#[cfg(feature = "onnx")]
pub mod inference;
pub mod linear;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod router;
pub mod scan;
pub mod schema;
pub mod score;

pub use error::{MalscanError, Result};
pub use router::{infer, FileType, InferenceResult};
pub use score::Verdict;
