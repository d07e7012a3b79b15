// src/validate.rs

use crate::measurements::{
    DEFAULT_STORIES, Field, LinearFeature, MeasurementRecord, pitch_numerator,
};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

pub const MIN_TOTAL_AREA: f64 = 100.0;
pub const MAX_TOTAL_AREA: f64 = 100_000.0;
pub const MAX_STORIES: u32 = 5;
/// Highest pitch numerator a report is expected to carry. Steeper pitches
/// are kept but flagged.
pub const MAX_EXPECTED_PITCH: u32 = 16;
/// Allowed absolute gap between the waste table's area sum and the total.
pub const WASTE_TABLE_TOLERANCE: f64 = 1.0;

/// Outcome of validating one record. `record` is the record with every
/// rejected field reset; `errors` says why.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: BTreeMap<String, String>,
    pub warnings: BTreeMap<String, String>,
    #[serde(skip)]
    pub record: MeasurementRecord,
}

impl ValidationResult {
    pub fn has_error(&self, field: Field) -> bool {
        self.errors.contains_key(field.as_str())
    }

    pub fn has_warning(&self, field: Field) -> bool {
        self.warnings.contains_key(field.as_str())
    }
}

/// Enforces domain ranges and cross-field consistency. Invalid values are
/// reset rather than clamped, and validation itself never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldValidator;

impl FieldValidator {
    pub fn validate(&self, mut record: MeasurementRecord) -> ValidationResult {
        let mut errors = BTreeMap::new();
        let mut warnings = BTreeMap::new();
        let mut reject = |field: Field, reason: String| {
            warn!(field = %field, reason = %reason, "Measurement rejected");
            errors.insert(field.to_string(), reason);
        };

        match record.total_area {
            None => reject(
                Field::TotalArea,
                "required measurement 'total_area' not found".to_string(),
            ),
            Some(area) if !(MIN_TOTAL_AREA..=MAX_TOTAL_AREA).contains(&area) => {
                record.total_area = None;
                reject(
                    Field::TotalArea,
                    format!("total area {area} outside [{MIN_TOTAL_AREA}, {MAX_TOTAL_AREA}]"),
                );
            }
            Some(_) => {}
        }

        match record.predominant_pitch.as_deref().map(pitch_numerator) {
            None => reject(
                Field::PredominantPitch,
                "required measurement 'predominant_pitch' not found".to_string(),
            ),
            Some(None) => {
                let raw = record.predominant_pitch.take().unwrap_or_default();
                reject(
                    Field::PredominantPitch,
                    format!("malformed pitch {raw:?}, expected N/12"),
                );
            }
            Some(Some(rise)) if rise > MAX_EXPECTED_PITCH => {
                warnings.insert(
                    Field::PredominantPitch.to_string(),
                    format!("unusual pitch {rise}/12, priced at the steepest tier"),
                );
            }
            Some(Some(_)) => {}
        }

        if let Some(stories) = record.number_of_stories {
            if !(1..=MAX_STORIES).contains(&stories) {
                record.number_of_stories = Some(DEFAULT_STORIES);
                reject(
                    Field::NumberOfStories,
                    format!("number of stories {stories} outside [1, {MAX_STORIES}], reset to {DEFAULT_STORIES}"),
                );
            }
        }

        if let Some(waste) = record.suggested_waste_percent {
            if !(0.0..=100.0).contains(&waste) {
                record.suggested_waste_percent = None;
                reject(
                    Field::SuggestedWastePercent,
                    format!("waste percentage {waste} outside [0, 100]"),
                );
            }
        }

        for field in Field::LINEAR {
            let Some(slot) = record.linear_mut(field) else {
                continue;
            };
            if let Some(feature) = slot.filter(|f| !f.is_consistent()) {
                *slot = Some(LinearFeature::default());
                reject(
                    field,
                    format!(
                        "invalid {field} measurement: length={}, count={}",
                        feature.length, feature.count
                    ),
                );
            }
        }

        if let Some(area) = record.total_penetrations_area {
            if area < 0.0 {
                record.total_penetrations_area = None;
                reject(
                    Field::TotalPenetrationsArea,
                    format!("negative penetrations area {area}"),
                );
            }
        }

        if let Some(perimeter) = record.total_penetrations_perimeter {
            if perimeter < 0.0 {
                record.total_penetrations_perimeter = None;
                reject(
                    Field::TotalPenetrationsPerimeter,
                    format!("negative penetrations perimeter {perimeter}"),
                );
            }
        }

        if let (Some(table), Some(total)) = (&record.waste_table, record.total_area) {
            let table_sum: f64 = table.iter().map(|e| e.area).sum();
            if (table_sum - total).abs() > WASTE_TABLE_TOLERANCE {
                warn!(table_sum, total, "Waste table does not add up to total area");
                warnings.insert(
                    Field::WasteTable.to_string(),
                    format!("total waste area ({table_sum}) does not match total area ({total})"),
                );
            }
        }

        ValidationResult {
            is_valid: record.total_area.is_some() && record.predominant_pitch.is_some(),
            errors,
            warnings,
            record,
        }
    }
}
