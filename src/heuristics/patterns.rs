// src/heuristics/patterns.rs

use crate::measurements::Field;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// A report number: either comma-grouped thousands or a plain run of
/// digits, with an optional decimal part.
const NUM: &str = r"(\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)";

pub const WASTE_WITH_SQUARES: &str = "waste_table.with_squares";
pub const WASTE_PERCENT_AREA: &str = "waste_table.percent_area";
pub const PITCH_COLUMNS: &str = "pitch_breakdown.columns";
pub const PITCH_ROWS: &str = "pitch_breakdown.rows";

/// One pattern of a field, and which capture group carries the value.
#[derive(Debug)]
pub struct Matcher {
    label: String,
    regex: Regex,
    group: usize,
}

/// The value a [`Matcher`] pulled out of the text.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchHit<'t> {
    pub label: &'t str,
    pub value: &'t str,
    pub start: usize,
    pub end: usize,
}

impl Matcher {
    fn new(label: impl Into<String>, pattern: &str, group: usize) -> Self {
        Self {
            label: label.into(),
            regex: Regex::new(pattern).expect("built-in pattern must compile"),
            group,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn captures<'t>(&self, text: &'t str) -> Option<Captures<'t>> {
        self.regex.captures(text)
    }

    pub fn find<'a>(&'a self, text: &'a str) -> Option<MatchHit<'a>> {
        let caps = self.regex.captures(text)?;
        let whole = caps.get(0)?;
        let value = caps.get(self.group)?;
        Some(MatchHit {
            label: &self.label,
            value: value.as_str(),
            start: whole.start(),
            end: whole.end(),
        })
    }
}

/// Patterns for one field in priority order. The first matcher that
/// matches wins; the rest are never tried.
#[derive(Debug)]
pub struct PatternSet {
    pub field: Field,
    matchers: Vec<Matcher>,
}

impl PatternSet {
    fn new(field: Field, matchers: Vec<Matcher>) -> Self {
        Self { field, matchers }
    }

    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    pub fn first_match<'a>(&'a self, text: &'a str) -> Option<MatchHit<'a>> {
        self.matchers.iter().find_map(|m| m.find(text))
    }

    pub fn first_captures<'a, 't>(&'a self, text: &'t str) -> Option<(&'a Matcher, Captures<'t>)> {
        self.matchers
            .iter()
            .find_map(|m| m.captures(text).map(|caps| (m, caps)))
    }
}

/// A linear feature is only populated when both halves match.
#[derive(Debug)]
pub struct LinearPatterns {
    pub field: Field,
    pub length: PatternSet,
    pub count: PatternSet,
}

#[derive(Debug)]
pub struct PatternLibrary {
    pub scalars: Vec<PatternSet>,
    pub linear: Vec<LinearPatterns>,
    pub waste_table: PatternSet,
    pub pitch_breakdown: PatternSet,
    pub pitch_row: Regex,
}

impl PatternLibrary {
    pub fn scalar(&self, field: Field) -> Option<&PatternSet> {
        self.scalars.iter().find(|s| s.field == field)
    }
}

lazy_static! {
    pub static ref LIBRARY: PatternLibrary = build_library();
}

fn scalar(field: Field, patterns: &[(&str, &str)]) -> PatternSet {
    let matchers = patterns
        .iter()
        .map(|(suffix, pattern)| Matcher::new(format!("{field}.{suffix}"), pattern, 1))
        .collect();
    PatternSet::new(field, matchers)
}

/// Start of a line, or just after punctuation. Keeps `Flashing` from
/// matching inside `Step Flashing`.
const LINE_LEAD: &str = r"(?m:(?:^|[^A-Za-z\s])[ \t]*)";

/// `header` is how the report's summary line names the feature (e.g.
/// `Eaves/Starter‡`); `noun` is the singular word used elsewhere.
fn linear(field: Field, header: &str, noun: &str) -> LinearPatterns {
    linear_after("", field, header, noun)
}

/// Like [`linear`], with `lead` required right before the header and noun.
fn linear_after(lead: &str, field: Field, header: &str, noun: &str) -> LinearPatterns {
    let summary = format!(
        r"(?i){lead}{header}\s*[:=]\s*{NUM}\s*(?:ft|feet|')?\s*\((\d+)(?:\s*{noun}s?)?\)"
    );
    let paren = format!(r"(?i){lead}{noun}\s+Length\s*[:=]\s*{NUM}\s*ft\s*\((\d+)\)");
    let length_line = format!(r"(?i){lead}{noun}\s+Length\s*[:=]\s*{NUM}");
    let header_line = format!(r"(?i){lead}{header}\s*[:=]\s*{NUM}\s*(?:ft|feet|')");
    let count_line = format!(r"(?i){lead}{noun}\s+Count\s*[:=]\s*(\d+)");

    LinearPatterns {
        field,
        length: PatternSet::new(
            field,
            vec![
                Matcher::new(format!("{field}.summary"), &summary, 1),
                Matcher::new(format!("{field}.length_paren"), &paren, 1),
                Matcher::new(format!("{field}.length_line"), &length_line, 1),
                Matcher::new(format!("{field}.header_line"), &header_line, 1),
            ],
        ),
        count: PatternSet::new(
            field,
            vec![
                Matcher::new(format!("{field}.summary"), &summary, 2),
                Matcher::new(format!("{field}.length_paren"), &paren, 2),
                Matcher::new(format!("{field}.count_line"), &count_line, 1),
            ],
        ),
    }
}

fn build_library() -> PatternLibrary {
    let scalars = vec![
        scalar(
            Field::TotalArea,
            &[
                ("all_pitches", format!(r"(?i)Total\s+Area\s*\(All\s+Pitches\)\s*[:=]?\s*{NUM}").as_str()),
                ("total_roof_area", format!(r"(?i)Total\s+Roof\s+Area\s*[:=]\s*{NUM}").as_str()),
                ("total_area", format!(r"(?i)Total\s+Area\s*[:=]\s*{NUM}").as_str()),
                ("roof_area", format!(r"(?i)Roof\s+Area\s*[:=]\s*{NUM}").as_str()),
                ("total_square_feet", format!(r"(?i)Total\s+Square\s+(?:Feet|Footage)\s*[:=]\s*{NUM}").as_str()),
                ("total_sf", format!(r"(?i)Total\s+(?:Roof\s+)?SF\s*[:=]\s*{NUM}").as_str()),
            ],
        ),
        scalar(
            Field::PredominantPitch,
            &[
                ("predominant", r"(?i)Predominant\s+Pitch\s*[:=]\s*(\d+)\s*/\s*12"),
                ("primary", r"(?i)Primary\s+Pitch\s*[:=]\s*(\d+)\s*/\s*12"),
                ("main", r"(?i)Main\s+Pitch\s*[:=]\s*(\d+)\s*/\s*12"),
            ],
        ),
        scalar(
            Field::NumberOfStories,
            &[
                ("number_of_stories", r"(?i)Number\s+of\s+Stories\s*(?:<=|[:=])\s*(\d+)"),
                ("stories", r"(?i)\bStories\s*[:=]\s*(\d+)"),
                ("building_height", r"(?i)Building\s+Height\s*[:=]\s*(\d+)\s*stor(?:y|ies)"),
            ],
        ),
        scalar(
            Field::SuggestedWastePercent,
            &[
                ("suggested", r"(?i)Suggested\s+Waste(?:\s+Percentage)?\s*[:=]\s*(\d+(?:\.\d+)?)\s*%?"),
                ("recommended", r"(?i)Recommended\s+Waste\s*[:=]\s*(\d+(?:\.\d+)?)\s*%"),
                ("waste_factor", r"(?i)Waste\s+Factor\s*[:=]\s*(\d+(?:\.\d+)?)\s*%"),
            ],
        ),
        scalar(
            Field::TotalPenetrationsArea,
            &[
                ("total", format!(r"(?i)Total\s+Penetrations\s+Area\s*=\s*{NUM}\s*sq\s*ft").as_str()),
                ("area", format!(r"(?i)Penetrations?\s+Area\s*[:=]\s*{NUM}").as_str()),
            ],
        ),
        scalar(
            Field::TotalPenetrationsPerimeter,
            &[
                ("total", format!(r"(?i)Total\s+Penetrations\s+Perimeter\s*[:=]\s*{NUM}").as_str()),
                ("perimeter", format!(r"(?i)Penetrations?\s+Perimeter\s*[:=]\s*{NUM}").as_str()),
            ],
        ),
        scalar(
            Field::TotalPenetrations,
            &[
                ("total", r"(?i)Total\s+Penetrations\s*=\s*(\d+)"),
                ("number", r"(?i)Number\s+of\s+Penetrations\s*[:=]\s*(\d+)"),
            ],
        ),
        scalar(
            Field::TotalRoofFacets,
            &[
                ("total_roof", r"(?i)Total\s+Roof\s+Facets\s*=\s*(\d+)"),
                ("roof", r"(?i)Roof\s+Facets\s*[:=]\s*(\d+)"),
                ("total", r"(?i)Total\s+Facets\s*[:=]\s*(\d+)"),
            ],
        ),
        scalar(
            Field::PropertyAddress,
            &[("property", r"(?i)Property\s+Address\s*:\s*([^\n]+)")],
        ),
    ];

    let linear = vec![
        linear(Field::Ridges, "Ridges", "Ridge"),
        linear(Field::Hips, "Hips", "Hip"),
        linear(Field::Valleys, "Valleys", "Valley"),
        linear(Field::Rakes, "Rakes†?", "Rake"),
        linear(Field::Eaves, "Eaves(?:/Starter)?‡?", "Eave"),
        linear_after(LINE_LEAD, Field::Flashing, "Flashing", "Flashing"),
        linear(Field::StepFlashing, r"Step\s+Flashing", r"Step\s+Flashing"),
    ];

    let waste_table = PatternSet::new(
        Field::WasteTable,
        vec![
            Matcher::new(
                WASTE_WITH_SQUARES,
                r"(?i)Waste\s*%\s+((?:\d+\s*%\s*)+)Area\s*\(Sq\.?\s*ft\.?\)\s+((?:[\d,]+(?:\.\d+)?\s+)+)Squares\s*\*?\s+((?:\d+(?:\.\d+)?\s*)+)",
                0,
            ),
            Matcher::new(
                WASTE_PERCENT_AREA,
                r"(?i)Waste\s*%\s+((?:\d+\s*%\s*)+)(?:Area\s*\(Sq\.?\s*ft\.?\)|Square\s+Feet)\s+((?:[\d,]+(?:\.\d+)?\s*)+)",
                0,
            ),
        ],
    );

    let pitch_breakdown = PatternSet::new(
        Field::PitchBreakdown,
        vec![
            Matcher::new(
                PITCH_COLUMNS,
                r"(?i)Roof\s+Pitches\s+((?:\d+/12\s*)+)Area\s*\(sq\.?\s*ft\.?\)\s+((?:[\d,]+(?:\.\d+)?\s*)+)(?:%\s*of\s*Roof\s+((?:\d+(?:\.\d+)?\s*%\s*)+))?",
                0,
            ),
            Matcher::new(
                PITCH_ROWS,
                r"(?is)Areas\s+per\s+Pitch\b(.*?)(?:\n\s*\n|$)",
                1,
            ),
        ],
    );

    let pitch_row = Regex::new(&format!(
        r"(?i)(\d+)\s*/\s*12\s*[=:]?\s*{NUM}\s*(?:sq\.?\s*ft\.?)?\s*(?:\(?\s*(\d+(?:\.\d+)?)\s*%\s*\)?)?"
    ))
    .expect("built-in pattern must compile");

    PatternLibrary {
        scalars,
        linear,
        waste_table,
        pitch_breakdown,
        pitch_row,
    }
}
