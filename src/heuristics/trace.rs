// src/heuristics/trace.rs

use crate::measurements::Field;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Characters of context kept on each side of a match.
const SAMPLE_RADIUS: usize = 60;
/// Characters kept from the start of the text when nothing matched.
const MISS_SAMPLE_LEN: usize = 200;

/// Where the final value of a field came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    Cascade,
    Fallback,
    Default,
    Derived,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldTrace {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<String>,
    /// Set when only half of a two-part field (length/count) matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<String>,
    pub source: FieldSource,
}

impl FieldTrace {
    pub fn hit(pattern_group: &str, sample: String) -> Self {
        Self {
            matched: true,
            pattern_group: Some(pattern_group.to_string()),
            sample: Some(sample),
            partial: None,
            source: FieldSource::Cascade,
        }
    }

    pub fn miss(sample: String) -> Self {
        Self {
            matched: false,
            pattern_group: None,
            sample: Some(sample),
            partial: None,
            source: FieldSource::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackOutcome {
    Succeeded,
    Failed,
    TimedOut,
    NotConfigured,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackTrace {
    pub outcome: FallbackOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fields the model supplied that made it into the final record.
    pub fields_filled: Vec<String>,
}

/// Diagnostic companion of a [`crate::measurements::MeasurementRecord`].
/// Never consulted by pricing.
///
/// Validation keys prefixed `cascade.` or `fallback.` describe values
/// rejected at that stage; bare field keys describe the final record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionTrace {
    pub text_digest: String,
    pub text_length: usize,
    pub fields: BTreeMap<String, FieldTrace>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waste_table_error: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub validation_errors: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub validation_warnings: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackTrace>,
}

impl ExtractionTrace {
    pub fn for_text(text: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        Self {
            text_digest: format!("{:x}", hasher.finalize()),
            text_length: text.chars().count(),
            ..Default::default()
        }
    }

    pub fn field(&self, field: Field) -> Option<&FieldTrace> {
        self.fields.get(field.as_str())
    }

    pub fn record(&mut self, field: Field, trace: FieldTrace) {
        self.fields.insert(field.as_str().to_string(), trace);
    }

    pub fn set_source(&mut self, field: Field, source: FieldSource) {
        self.fields
            .entry(field.as_str().to_string())
            .or_insert_with(|| FieldTrace {
                matched: false,
                pattern_group: None,
                sample: None,
                partial: None,
                source,
            })
            .source = source;
    }

    pub fn is_matched(&self, field: Field) -> bool {
        self.field(field).is_some_and(|t| t.matched)
    }
}

/// A window of `text` around the byte range `start..end`.
pub fn sample_window(text: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(SAMPLE_RADIUS);
    while !text.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + SAMPLE_RADIUS).min(text.len());
    while !text.is_char_boundary(to) {
        to += 1;
    }
    text[from..to].to_string()
}

/// The sample recorded when no pattern matched a field.
pub fn head_sample(text: &str) -> String {
    text.chars().take(MISS_SAMPLE_LEN).collect()
}
