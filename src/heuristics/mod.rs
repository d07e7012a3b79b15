// src/heuristics/mod.rs

mod cascade;
pub mod patterns;
mod trace;

pub use cascade::{CascadeExtractor, normalize_text};
pub use trace::{
    ExtractionTrace, FallbackOutcome, FallbackTrace, FieldSource, FieldTrace, head_sample,
    sample_window,
};

use crate::measurements::MeasurementRecord;

/// Extract roof measurements from report text with the built-in pattern
/// library. The text is normalised first.
pub fn extract_measurements(text: &str) -> (MeasurementRecord, ExtractionTrace) {
    let normalized = normalize_text(text);
    CascadeExtractor::default().extract(&normalized)
}
