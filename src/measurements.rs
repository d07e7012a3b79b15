// src/measurements.rs

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_PITCH: &str = "4/12";
pub const DEFAULT_WASTE_PERCENT: f64 = 15.0;
pub const DEFAULT_STORIES: u32 = 1;

/// Every field the extraction stages know about. Used as the key of the
/// trace and of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    TotalArea,
    PredominantPitch,
    NumberOfStories,
    SuggestedWastePercent,
    Ridges,
    Hips,
    Valleys,
    Rakes,
    Eaves,
    Flashing,
    StepFlashing,
    WasteTable,
    TotalPenetrationsArea,
    TotalPenetrationsPerimeter,
    TotalPenetrations,
    TotalRoofFacets,
    PitchBreakdown,
    PropertyAddress,
}

impl Field {
    pub const LINEAR: [Field; 7] = [
        Field::Ridges,
        Field::Hips,
        Field::Valleys,
        Field::Rakes,
        Field::Eaves,
        Field::Flashing,
        Field::StepFlashing,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Field::TotalArea => "total_area",
            Field::PredominantPitch => "predominant_pitch",
            Field::NumberOfStories => "number_of_stories",
            Field::SuggestedWastePercent => "suggested_waste_percent",
            Field::Ridges => "ridges",
            Field::Hips => "hips",
            Field::Valleys => "valleys",
            Field::Rakes => "rakes",
            Field::Eaves => "eaves",
            Field::Flashing => "flashing",
            Field::StepFlashing => "step_flashing",
            Field::WasteTable => "waste_table",
            Field::TotalPenetrationsArea => "total_penetrations_area",
            Field::TotalPenetrationsPerimeter => "total_penetrations_perimeter",
            Field::TotalPenetrations => "total_penetrations",
            Field::TotalRoofFacets => "total_roof_facets",
            Field::PitchBreakdown => "pitch_breakdown",
            Field::PropertyAddress => "property_address",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A linear roof feature (ridge, eave, flashing and so on): total length in
/// feet and how many separate runs make it up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LinearFeature {
    pub length: f64,
    pub count: u32,
}

impl LinearFeature {
    /// A length without any counted run is not a real measurement.
    pub fn is_consistent(&self) -> bool {
        self.length >= 0.0 && (self.length <= 0.0 || self.count > 0)
    }
}

/// One row of the report's waste table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WasteTableEntry {
    pub percentage: u32,
    pub area: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub squares: Option<f64>,
    pub is_suggested: bool,
}

/// Area measured at a single pitch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitchArea {
    pub pitch: String,
    pub area: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
}

/// The canonical extraction output. Every field is optional while the
/// record moves through the stages; the assembler fills in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_area: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predominant_pitch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_stories: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_waste_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ridges: Option<LinearFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hips: Option<LinearFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valleys: Option<LinearFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rakes: Option<LinearFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eaves: Option<LinearFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flashing: Option<LinearFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_flashing: Option<LinearFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drip_edge: Option<LinearFeature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waste_table: Option<Vec<WasteTableEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_penetrations_area: Option<f64>,
    /// Linear feet around all penetrations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_penetrations_perimeter: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_penetrations: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_roof_facets: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pitch_breakdown: Vec<PitchArea>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_address: Option<String>,
}

impl MeasurementRecord {
    pub fn linear(&self, field: Field) -> Option<&LinearFeature> {
        match field {
            Field::Ridges => self.ridges.as_ref(),
            Field::Hips => self.hips.as_ref(),
            Field::Valleys => self.valleys.as_ref(),
            Field::Rakes => self.rakes.as_ref(),
            Field::Eaves => self.eaves.as_ref(),
            Field::Flashing => self.flashing.as_ref(),
            Field::StepFlashing => self.step_flashing.as_ref(),
            _ => None,
        }
    }

    pub fn linear_mut(&mut self, field: Field) -> Option<&mut Option<LinearFeature>> {
        match field {
            Field::Ridges => Some(&mut self.ridges),
            Field::Hips => Some(&mut self.hips),
            Field::Valleys => Some(&mut self.valleys),
            Field::Rakes => Some(&mut self.rakes),
            Field::Eaves => Some(&mut self.eaves),
            Field::Flashing => Some(&mut self.flashing),
            Field::StepFlashing => Some(&mut self.step_flashing),
            _ => None,
        }
    }

    /// Area of the roof measured at 0/12.
    pub fn flat_area(&self) -> f64 {
        self.pitch_breakdown
            .iter()
            .filter(|p| pitch_numerator(&p.pitch) == Some(0))
            .map(|p| p.area)
            .sum()
    }

    /// How many scalar fields were populated (out of the ones the cascade
    /// looks for).
    pub fn coverage(&self) -> (usize, usize) {
        let filled = [
            self.total_area.is_some(),
            self.predominant_pitch.is_some(),
            self.number_of_stories.is_some(),
            self.suggested_waste_percent.is_some(),
            self.ridges.is_some(),
            self.hips.is_some(),
            self.valleys.is_some(),
            self.rakes.is_some(),
            self.eaves.is_some(),
            self.flashing.is_some(),
            self.step_flashing.is_some(),
            self.waste_table.is_some(),
            self.total_penetrations_area.is_some(),
            self.total_penetrations_perimeter.is_some(),
            self.total_penetrations.is_some(),
            self.total_roof_facets.is_some(),
            !self.pitch_breakdown.is_empty(),
            self.property_address.is_some(),
        ];
        let total = filled.len();
        (filled.iter().filter(|&&v| v).count(), total)
    }
}

/// Numerator of an `N/12` pitch string.
pub fn pitch_numerator(pitch: &str) -> Option<u32> {
    let (rise, run) = pitch.trim().split_once('/')?;
    if run.trim() != "12" {
        return None;
    }
    rise.trim().parse().ok()
}

/// Canonical `N/12` form of a pitch given either as `"N/12"` or a bare
/// rise like `"6"`.
pub fn normalize_pitch(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let rise = if raw.contains('/') {
        pitch_numerator(raw)?
    } else {
        raw.parse::<u32>().ok()?
    };
    Some(format!("{rise}/12"))
}

/// Parse a report number, dropping thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pitch_numerator() {
        assert_eq!(pitch_numerator("6/12"), Some(6));
        assert_eq!(pitch_numerator(" 12 / 12 "), Some(12));
        assert_eq!(pitch_numerator("6/10"), None);
        assert_eq!(pitch_numerator("steep"), None);
    }

    #[test]
    fn test_normalize_pitch_accepts_bare_rise() {
        assert_eq!(normalize_pitch("7").as_deref(), Some("7/12"));
        assert_eq!(normalize_pitch("7/12").as_deref(), Some("7/12"));
        assert_eq!(normalize_pitch("7/8"), None);
    }

    #[test]
    fn test_parse_number_strips_separators() {
        assert_eq!(parse_number("2,500"), Some(2500.0));
        assert_eq!(parse_number("1,234,567.5"), Some(1_234_567.5));
        assert_eq!(parse_number("n/a"), None);
    }

    #[test]
    fn test_linear_feature_consistency() {
        assert!(LinearFeature { length: 0.0, count: 0 }.is_consistent());
        assert!(LinearFeature { length: 40.0, count: 2 }.is_consistent());
        assert!(!LinearFeature { length: 40.0, count: 0 }.is_consistent());
    }

    #[test]
    fn test_flat_area_sums_zero_pitch_rows() {
        let record = MeasurementRecord {
            pitch_breakdown: vec![
                PitchArea { pitch: "0/12".into(), area: 300.0, percent: None },
                PitchArea { pitch: "6/12".into(), area: 1700.0, percent: None },
                PitchArea { pitch: "0/12".into(), area: 50.0, percent: None },
            ],
            ..Default::default()
        };
        assert_eq!(record.flat_area(), 350.0);
    }

    #[test]
    fn test_record_serializes_camel_case_and_skips_absent() {
        let record = MeasurementRecord {
            total_area: Some(2500.0),
            predominant_pitch: Some("6/12".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["totalArea"], 2500.0);
        assert_eq!(json["predominantPitch"], "6/12");
        assert!(json.get("numberOfStories").is_none());
    }

    #[test]
    fn test_every_linear_field_has_a_slot() {
        let mut record = MeasurementRecord::default();
        for field in Field::LINEAR {
            let slot = record.linear_mut(field).unwrap();
            *slot = Some(LinearFeature { length: 10.0, count: 1 });
        }
        assert_eq!(record.step_flashing, Some(LinearFeature { length: 10.0, count: 1 }));
        assert!(Field::LINEAR.iter().all(|f| record.linear(*f).is_some()));
        assert!(record.linear(Field::TotalArea).is_none());
        assert_eq!(record.coverage(), (7, 18));
    }
}
