// src/assemble.rs

use crate::heuristics::{ExtractionTrace, FieldSource};
use crate::measurements::{
    DEFAULT_PITCH, DEFAULT_STORIES, DEFAULT_WASTE_PERCENT, Field, LinearFeature,
    MeasurementRecord,
};
use crate::validate::{FieldValidator, ValidationResult};
use tracing::{debug, info};

/// Fill `slot` from `value` only when `slot` is empty.
fn fill<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    if slot.is_none() && value.is_some() {
        *slot = value;
        true
    } else {
        false
    }
}

/// Merges cascade and fallback results into the final record.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeasurementAssembler {
    validator: FieldValidator,
}

impl MeasurementAssembler {
    /// `cascade` must already be validated. The fallback fragment is
    /// validated here; its values only fill fields that are still absent.
    /// Defaults come last, and the result is validated once more.
    pub fn assemble(
        &self,
        cascade: MeasurementRecord,
        trace: &mut ExtractionTrace,
        fallback: Option<MeasurementRecord>,
    ) -> ValidationResult {
        let mut record = cascade;

        if let Some(fragment) = fallback {
            let filled = self.merge_fallback(&mut record, fragment, trace);
            for field in &filled {
                trace.set_source(*field, FieldSource::Fallback);
            }
            if let Some(fb) = trace.fallback.as_mut() {
                fb.fields_filled = filled.iter().map(|f| f.to_string()).collect();
            }
            info!(filled = filled.len(), "Fallback values merged");
        }

        if let (Some(rakes), Some(eaves)) = (record.rakes, record.eaves) {
            let length = rakes.length + eaves.length;
            if length > 0.0 {
                record.drip_edge = Some(LinearFeature { length, count: 1 });
            }
        }

        if fill(&mut record.predominant_pitch, Some(DEFAULT_PITCH.to_string())) {
            trace.set_source(Field::PredominantPitch, FieldSource::Default);
        }
        if fill(&mut record.suggested_waste_percent, Some(DEFAULT_WASTE_PERCENT)) {
            trace.set_source(Field::SuggestedWastePercent, FieldSource::Default);
        }
        if fill(&mut record.number_of_stories, Some(DEFAULT_STORIES)) {
            trace.set_source(Field::NumberOfStories, FieldSource::Default);
        }

        let result = self.validator.validate(record);
        trace
            .validation_errors
            .extend(result.errors.iter().map(|(k, v)| (k.clone(), v.clone())));
        trace
            .validation_warnings
            .extend(result.warnings.iter().map(|(k, v)| (k.clone(), v.clone())));
        let (filled, total) = result.record.coverage();
        debug!(filled, total, is_valid = result.is_valid, "Measurements assembled");
        result
    }

    fn merge_fallback(
        &self,
        record: &mut MeasurementRecord,
        fragment: MeasurementRecord,
        trace: &mut ExtractionTrace,
    ) -> Vec<Field> {
        let offered = fragment.clone();
        let checked = self.validator.validate(fragment);
        // Only complain about values the model actually offered.
        for (field, reason) in checked.errors {
            let was_offered = match field.as_str() {
                "total_area" => offered.total_area.is_some(),
                "predominant_pitch" => offered.predominant_pitch.is_some(),
                "suggested_waste_percent" => offered.suggested_waste_percent.is_some(),
                _ => false,
            };
            if was_offered {
                trace
                    .validation_errors
                    .insert(format!("fallback.{field}"), reason);
            }
        }

        let fb = checked.record;
        let mut filled = Vec::new();
        let mut note = |field: Field, did_fill: bool| {
            if did_fill {
                filled.push(field);
            }
        };

        note(Field::TotalArea, fill(&mut record.total_area, fb.total_area));
        note(
            Field::PredominantPitch,
            fill(&mut record.predominant_pitch, fb.predominant_pitch),
        );
        note(
            Field::NumberOfStories,
            fill(&mut record.number_of_stories, fb.number_of_stories),
        );
        note(
            Field::SuggestedWastePercent,
            fill(&mut record.suggested_waste_percent, fb.suggested_waste_percent),
        );
        note(Field::Ridges, fill(&mut record.ridges, fb.ridges));
        note(Field::Hips, fill(&mut record.hips, fb.hips));
        note(Field::Valleys, fill(&mut record.valleys, fb.valleys));
        note(Field::Rakes, fill(&mut record.rakes, fb.rakes));
        note(Field::Eaves, fill(&mut record.eaves, fb.eaves));
        note(Field::Flashing, fill(&mut record.flashing, fb.flashing));
        note(
            Field::StepFlashing,
            fill(&mut record.step_flashing, fb.step_flashing),
        );
        note(Field::WasteTable, fill(&mut record.waste_table, fb.waste_table));
        note(
            Field::TotalPenetrationsArea,
            fill(&mut record.total_penetrations_area, fb.total_penetrations_area),
        );
        note(
            Field::TotalPenetrationsPerimeter,
            fill(
                &mut record.total_penetrations_perimeter,
                fb.total_penetrations_perimeter,
            ),
        );
        note(
            Field::TotalPenetrations,
            fill(&mut record.total_penetrations, fb.total_penetrations),
        );
        note(
            Field::TotalRoofFacets,
            fill(&mut record.total_roof_facets, fb.total_roof_facets),
        );
        note(
            Field::PropertyAddress,
            fill(&mut record.property_address, fb.property_address),
        );
        if record.pitch_breakdown.is_empty() && !fb.pitch_breakdown.is_empty() {
            record.pitch_breakdown = fb.pitch_breakdown;
            filled.push(Field::PitchBreakdown);
        }
        filled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::{FallbackOutcome, FallbackTrace};

    fn complete_cascade() -> MeasurementRecord {
        MeasurementRecord {
            total_area: Some(3000.0),
            predominant_pitch: Some("7/12".into()),
            number_of_stories: Some(2),
            suggested_waste_percent: Some(10.0),
            rakes: Some(LinearFeature { length: 120.0, count: 4 }),
            eaves: Some(LinearFeature { length: 180.0, count: 6 }),
            ..Default::default()
        }
    }

    #[test]
    fn test_fallback_never_overrides_cascade() {
        let assembler = MeasurementAssembler::default();
        let fragment = MeasurementRecord {
            total_area: Some(9999.0),
            predominant_pitch: Some("12/12".into()),
            suggested_waste_percent: Some(20.0),
            ..Default::default()
        };

        let mut trace_a = ExtractionTrace::default();
        let alone = assembler.assemble(complete_cascade(), &mut trace_a, None);
        let mut trace_b = ExtractionTrace::default();
        let merged = assembler.assemble(complete_cascade(), &mut trace_b, Some(fragment));

        assert_eq!(alone.record, merged.record);
        assert_eq!(alone.is_valid, merged.is_valid);
        assert_eq!(merged.record.total_area, Some(3000.0));
    }

    #[test]
    fn test_fallback_fills_missing_area() {
        let assembler = MeasurementAssembler::default();
        let mut trace = ExtractionTrace::default();
        trace.fallback = Some(FallbackTrace {
            outcome: FallbackOutcome::Succeeded,
            error: None,
            fields_filled: Vec::new(),
        });
        let cascade = MeasurementRecord {
            predominant_pitch: Some("5/12".into()),
            ..Default::default()
        };
        let fragment = MeasurementRecord {
            total_area: Some(1800.0),
            predominant_pitch: Some("9/12".into()),
            ..Default::default()
        };
        let result = assembler.assemble(cascade, &mut trace, Some(fragment));

        assert!(result.is_valid);
        assert_eq!(result.record.total_area, Some(1800.0));
        assert_eq!(result.record.predominant_pitch.as_deref(), Some("5/12"));
        assert_eq!(
            trace.field(Field::TotalArea).map(|t| t.source),
            Some(FieldSource::Fallback)
        );
        assert_eq!(
            trace.fallback.as_ref().map(|f| f.fields_filled.clone()),
            Some(vec!["total_area".to_string()])
        );
    }

    #[test]
    fn test_invalid_fallback_value_is_not_used() {
        let assembler = MeasurementAssembler::default();
        let mut trace = ExtractionTrace::default();
        let fragment = MeasurementRecord {
            total_area: Some(12.0),
            ..Default::default()
        };
        let result = assembler.assemble(MeasurementRecord::default(), &mut trace, Some(fragment));

        assert_eq!(result.record.total_area, None);
        assert!(!result.is_valid);
        assert!(trace.validation_errors.contains_key("fallback.total_area"));
    }

    #[test]
    fn test_defaults_applied_last() {
        let assembler = MeasurementAssembler::default();
        let mut trace = ExtractionTrace::default();
        let cascade = MeasurementRecord {
            total_area: Some(2500.0),
            ..Default::default()
        };
        let fragment = MeasurementRecord {
            suggested_waste_percent: Some(12.0),
            ..Default::default()
        };
        let result = assembler.assemble(cascade, &mut trace, Some(fragment));

        assert_eq!(result.record.predominant_pitch.as_deref(), Some(DEFAULT_PITCH));
        assert_eq!(result.record.suggested_waste_percent, Some(12.0));
        assert_eq!(result.record.number_of_stories, Some(DEFAULT_STORIES));
        assert_eq!(
            trace.field(Field::PredominantPitch).map(|t| t.source),
            Some(FieldSource::Default)
        );
        assert_eq!(
            trace.field(Field::SuggestedWastePercent).map(|t| t.source),
            Some(FieldSource::Fallback)
        );
    }

    #[test]
    fn test_drip_edge_derived_from_rakes_and_eaves() {
        let mut trace = ExtractionTrace::default();
        let result = MeasurementAssembler::default().assemble(complete_cascade(), &mut trace, None);
        assert_eq!(
            result.record.drip_edge,
            Some(LinearFeature { length: 300.0, count: 1 })
        );
    }
}
