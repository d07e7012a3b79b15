// src/heuristics/cascade.rs

use super::patterns::{
    LIBRARY, LinearPatterns, MatchHit, PITCH_COLUMNS, PITCH_ROWS, PatternLibrary, WASTE_WITH_SQUARES,
};
use super::trace::{ExtractionTrace, FieldTrace, head_sample, sample_window};
use crate::error::WasteTableError;
use crate::measurements::{
    Field, LinearFeature, MeasurementRecord, PitchArea, WasteTableEntry, parse_number,
    pitch_numerator,
};
use regex::Captures;
use tracing::{debug, warn};

/// Normalise extracted report text while keeping its line structure:
/// CRLF becomes LF, runs of horizontal whitespace collapse to one space,
/// lines are trimmed and runs of blank lines collapse to one.
pub fn normalize_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = false;

    for line in raw.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !blank_run && !out.is_empty() {
                out.push('\n');
            }
            blank_run = true;
            continue;
        }
        blank_run = false;
        out.push_str(&collapsed);
        out.push('\n');
    }

    out.trim_end().to_string()
}

/// Runs the pattern library over normalised text.
pub struct CascadeExtractor<'a> {
    library: &'a PatternLibrary,
}

impl Default for CascadeExtractor<'static> {
    fn default() -> Self {
        Self { library: &LIBRARY }
    }
}

impl<'a> CascadeExtractor<'a> {
    pub fn new(library: &'a PatternLibrary) -> Self {
        Self { library }
    }

    /// Extract every field the library knows about. Fields nothing matched
    /// stay `None` so later stages can tell "not found" from "found as 0".
    pub fn extract(&self, text: &str) -> (MeasurementRecord, ExtractionTrace) {
        let mut record = MeasurementRecord::default();
        let mut trace = ExtractionTrace::for_text(text);

        self.extract_scalars(text, &mut record, &mut trace);

        for patterns in &self.library.linear {
            let feature = extract_linear(patterns, text, &mut trace);
            if let Some(slot) = record.linear_mut(patterns.field) {
                *slot = feature;
            }
        }

        self.extract_waste_table(text, &mut record, &mut trace);
        self.extract_pitch_breakdown(text, &mut record, &mut trace);

        let (filled, total) = record.coverage();
        debug!(filled, total, "Cascade extraction complete");
        if record.total_area.is_none() {
            warn!("No total area pattern matched");
        }

        (record, trace)
    }

    fn extract_scalars(&self, text: &str, record: &mut MeasurementRecord, trace: &mut ExtractionTrace) {
        for set in &self.library.scalars {
            let Some(hit) = set.first_match(text) else {
                trace.record(set.field, FieldTrace::miss(head_sample(text)));
                continue;
            };

            let stored = match set.field {
                Field::TotalArea => parse_number(hit.value).map(|v| record.total_area = Some(v)),
                Field::PredominantPitch => hit
                    .value
                    .parse::<u32>()
                    .ok()
                    .map(|n| record.predominant_pitch = Some(format!("{n}/12"))),
                Field::NumberOfStories => {
                    hit.value.parse::<u32>().ok().map(|n| record.number_of_stories = Some(n))
                }
                Field::SuggestedWastePercent => {
                    parse_number(hit.value).map(|v| record.suggested_waste_percent = Some(v))
                }
                Field::TotalPenetrationsArea => {
                    parse_number(hit.value).map(|v| record.total_penetrations_area = Some(v))
                }
                Field::TotalPenetrationsPerimeter => {
                    parse_number(hit.value).map(|v| record.total_penetrations_perimeter = Some(v))
                }
                Field::TotalPenetrations => {
                    hit.value.parse::<u32>().ok().map(|n| record.total_penetrations = Some(n))
                }
                Field::TotalRoofFacets => {
                    hit.value.parse::<u32>().ok().map(|n| record.total_roof_facets = Some(n))
                }
                Field::PropertyAddress => {
                    let address = hit.value.trim();
                    (!address.is_empty()).then(|| record.property_address = Some(address.to_string()))
                }
                _ => None,
            };

            if stored.is_some() {
                debug!(field = %set.field, pattern = hit.label, value = hit.value, "Pattern matched");
                trace.record(set.field, FieldTrace::hit(hit.label, sample_window(text, hit.start, hit.end)));
            } else {
                let mut miss = FieldTrace::miss(sample_window(text, hit.start, hit.end));
                miss.partial = Some(format!("{} matched unparseable value {:?}", hit.label, hit.value));
                trace.record(set.field, miss);
            }
        }
    }

    fn extract_waste_table(&self, text: &str, record: &mut MeasurementRecord, trace: &mut ExtractionTrace) {
        let Some((matcher, caps)) = self.library.waste_table.first_captures(text) else {
            trace.record(Field::WasteTable, FieldTrace::miss(head_sample(text)));
            return;
        };
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        let sample = sample_window(text, whole.0, whole.1);

        match parse_waste_table(&caps, matcher.label() == WASTE_WITH_SQUARES) {
            Ok(entries) => {
                debug!(rows = entries.len(), pattern = matcher.label(), "Waste table parsed");
                if record.suggested_waste_percent.is_none() {
                    if let Some(suggested) = entries.iter().find(|e| e.is_suggested) {
                        record.suggested_waste_percent = Some(f64::from(suggested.percentage));
                        trace.record(
                            Field::SuggestedWastePercent,
                            FieldTrace::hit("waste_table.suggested", sample.clone()),
                        );
                    }
                }
                record.waste_table = Some(entries);
                trace.record(Field::WasteTable, FieldTrace::hit(matcher.label(), sample));
            }
            Err(e) => {
                warn!(error = %e, "Waste table matched but could not be parsed");
                let mut miss = FieldTrace::miss(sample);
                miss.partial = Some(format!("{} matched but failed to parse", matcher.label()));
                trace.record(Field::WasteTable, miss);
                trace.waste_table_error = Some(e.to_string());
            }
        }
    }

    fn extract_pitch_breakdown(&self, text: &str, record: &mut MeasurementRecord, trace: &mut ExtractionTrace) {
        let Some((matcher, caps)) = self.library.pitch_breakdown.first_captures(text) else {
            trace.record(Field::PitchBreakdown, FieldTrace::miss(head_sample(text)));
            return;
        };
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        let sample = sample_window(text, whole.0, whole.1);

        let rows = match matcher.label() {
            PITCH_COLUMNS => parse_pitch_columns(&caps),
            PITCH_ROWS => caps
                .get(1)
                .map(|body| self.parse_pitch_rows(body.as_str()))
                .unwrap_or_default(),
            _ => Vec::new(),
        };

        if rows.is_empty() {
            let mut miss = FieldTrace::miss(sample);
            miss.partial = Some(format!("{} matched without usable rows", matcher.label()));
            trace.record(Field::PitchBreakdown, miss);
        } else {
            record.pitch_breakdown = rows;
            trace.record(Field::PitchBreakdown, FieldTrace::hit(matcher.label(), sample));
        }
    }

    fn parse_pitch_rows(&self, body: &str) -> Vec<PitchArea> {
        self.library
            .pitch_row
            .captures_iter(body)
            .filter_map(|c| {
                let rise: u32 = c[1].parse().ok()?;
                let area = parse_number(&c[2]).filter(|a| *a > 0.0)?;
                Some(PitchArea {
                    pitch: format!("{rise}/12"),
                    area,
                    percent: c.get(3).and_then(|p| parse_number(p.as_str())),
                })
            })
            .collect()
    }
}

/// A linear feature needs both a length and a count match. A half match is
/// dropped and noted in the trace.
fn extract_linear(patterns: &LinearPatterns, text: &str, trace: &mut ExtractionTrace) -> Option<LinearFeature> {
    let length = patterns
        .length
        .first_match(text)
        .and_then(|hit| parse_number(hit.value).map(|v| (hit, v)));
    let count = patterns
        .count
        .first_match(text)
        .and_then(|hit| hit.value.parse::<u32>().ok().map(|v| (hit, v)));

    match (length, count) {
        (Some((len_hit, length)), Some((_, count))) => {
            debug!(field = %patterns.field, length, count, "Linear feature matched");
            trace.record(
                patterns.field,
                FieldTrace::hit(len_hit.label, sample_window(text, len_hit.start, len_hit.end)),
            );
            Some(LinearFeature { length, count })
        }
        (Some((hit, _)), None) => {
            trace.record(patterns.field, half_match(text, &hit, "length"));
            None
        }
        (None, Some((hit, _))) => {
            trace.record(patterns.field, half_match(text, &hit, "count"));
            None
        }
        (None, None) => {
            trace.record(patterns.field, FieldTrace::miss(head_sample(text)));
            None
        }
    }
}

fn half_match(text: &str, hit: &MatchHit<'_>, half: &str) -> FieldTrace {
    let mut miss = FieldTrace::miss(sample_window(text, hit.start, hit.end));
    miss.pattern_group = Some(hit.label.to_string());
    miss.partial = Some(format!("only {half} matched"));
    miss
}

fn split_numbers(raw: &str, err: fn(String) -> WasteTableError) -> Result<Vec<f64>, WasteTableError> {
    raw.split_whitespace()
        .map(|token| parse_number(token).ok_or_else(|| err(token.to_string())))
        .collect()
}

/// Turn the percentage/area/squares groups of a waste table match into
/// entries. The middle row is the suggested one.
fn parse_waste_table(caps: &Captures<'_>, with_squares: bool) -> Result<Vec<WasteTableEntry>, WasteTableError> {
    let percent_group = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let area_group = caps.get(2).map(|m| m.as_str()).unwrap_or_default();

    let percentages = percent_group
        .split('%')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.parse::<u32>() {
            Ok(v) if v <= 100 => Ok(v),
            _ => Err(WasteTableError::InvalidPercentage(p.to_string())),
        })
        .collect::<Result<Vec<_>, _>>()?;

    let areas = split_numbers(area_group, WasteTableError::InvalidArea)?;
    if let Some(bad) = areas.iter().find(|a| **a <= 0.0) {
        return Err(WasteTableError::InvalidArea(bad.to_string()));
    }

    let squares = match caps.get(3).filter(|_| with_squares) {
        Some(group) => Some(split_numbers(group.as_str(), WasteTableError::InvalidNumber)?),
        None => None,
    };

    let squares_len = squares.as_ref().map_or(percentages.len(), Vec::len);
    if percentages.is_empty() || percentages.len() != areas.len() || squares_len != percentages.len() {
        return Err(WasteTableError::Misaligned {
            percentages: percentages.len(),
            areas: areas.len(),
            squares: squares.as_ref().map_or(0, Vec::len),
        });
    }

    let middle = percentages.len() / 2;
    Ok(percentages
        .iter()
        .zip(&areas)
        .enumerate()
        .map(|(i, (&percentage, &area))| WasteTableEntry {
            percentage,
            area,
            squares: squares.as_ref().map(|s| s[i]),
            is_suggested: i == middle,
        })
        .collect())
}

fn parse_pitch_columns(caps: &Captures<'_>) -> Vec<PitchArea> {
    let pitches: Vec<u32> = caps
        .get(1)
        .map(|m| m.as_str().split_whitespace().filter_map(pitch_numerator).collect())
        .unwrap_or_default();
    let areas: Vec<f64> = caps
        .get(2)
        .map(|m| m.as_str().split_whitespace().filter_map(parse_number).collect())
        .unwrap_or_default();
    let percents: Vec<f64> = caps
        .get(3)
        .map(|m| m.as_str().split('%').filter_map(parse_number).collect())
        .unwrap_or_default();

    if pitches.is_empty() || pitches.len() != areas.len() {
        return Vec::new();
    }
    let percents_aligned = percents.len() == pitches.len();

    pitches
        .iter()
        .zip(&areas)
        .enumerate()
        .map(|(i, (rise, area))| PitchArea {
            pitch: format!("{rise}/12"),
            area: *area,
            percent: percents_aligned.then(|| percents[i]),
        })
        .collect()
}
