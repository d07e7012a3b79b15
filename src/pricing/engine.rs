// src/pricing/engine.rs

use super::config::{PitchTier, PricingConfig, SecondaryScaling};
use crate::error::PricingError;
use crate::measurements::{
    DEFAULT_PITCH, DEFAULT_STORIES, DEFAULT_WASTE_PERCENT, MeasurementRecord, pitch_numerator,
};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Slack subtracted before rounding squares up, so float noise such as
/// `11.000000000000002` does not buy a phantom square.
const SQUARE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoofingCategory {
    Shingle,
    Tile,
    Metal,
}

impl FromStr for RoofingCategory {
    type Err = PricingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SHINGLE" => Ok(RoofingCategory::Shingle),
            "TILE" => Ok(RoofingCategory::Tile),
            "METAL" => Ok(RoofingCategory::Metal),
            _ => Err(PricingError::InvalidCategory(s.to_string())),
        }
    }
}

impl fmt::Display for RoofingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RoofingCategory::Shingle => "SHINGLE",
            RoofingCategory::Tile => "TILE",
            RoofingCategory::Metal => "METAL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub description: String,
    pub quantity: f64,
    pub unit: String,
    pub unit_price: f64,
    pub total: f64,
}

impl LineItem {
    fn new(description: impl Into<String>, quantity: f64, unit: &str, unit_price: f64) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit: unit.to_string(),
            unit_price,
            total: quantity * unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingDetails {
    /// Waste-adjusted squares of the sloped roof.
    pub total_squares: u32,
    /// Waste-adjusted squares measured at 0/12.
    pub flat_squares: u32,
    /// Waste applied, as a percentage (15 means 15%).
    pub waste_factor: f64,
    /// Sloped labor rate per square, surcharge included.
    pub labor_rate: f64,
    pub pitch_tier: PitchTier,
    pub stories: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedEstimate {
    pub category: RoofingCategory,
    pub line_items: Vec<LineItem>,
    pub subtotal: f64,
    pub profit_margin_percent: f64,
    pub profit_amount: f64,
    pub total: f64,
    pub details: PricingDetails,
}

/// Waste-adjusted squares for an area, rounded up to whole squares.
pub fn squares(area: f64, waste_percent: f64) -> u32 {
    let raw = area / 100.0 * (1.0 + waste_percent / 100.0);
    if raw <= 0.0 {
        return 0;
    }
    (raw - SQUARE_EPSILON).ceil() as u32
}

/// Whole packages needed to cover `needed` squares at `per_unit_coverage`
/// squares each. A non-positive coverage counts one unit per square.
pub fn units(needed: f64, per_unit_coverage: f64) -> u32 {
    let coverage = if per_unit_coverage > 0.0 {
        per_unit_coverage
    } else {
        1.0
    };
    let raw = needed / coverage;
    if raw <= 0.0 {
        return 0;
    }
    (raw - SQUARE_EPSILON).ceil() as u32
}

/// Rejects negative or non-finite margins.
pub fn check_profit_margin(profit_margin_percent: f64) -> Result<(), PricingError> {
    if !profit_margin_percent.is_finite() || profit_margin_percent < 0.0 {
        return Err(PricingError::InvalidProfitMargin(profit_margin_percent));
    }
    Ok(())
}

/// Turns a measurement record into priced line items. Holds nothing but its
/// immutable price tables, so one engine can serve any number of requests.
#[derive(Debug, Clone, Default)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn price(
        &self,
        record: &MeasurementRecord,
        category: RoofingCategory,
        profit_margin_percent: f64,
    ) -> Result<PricedEstimate, PricingError> {
        check_profit_margin(profit_margin_percent)?;
        let total_area = record.total_area.ok_or(PricingError::MissingTotalArea)?;

        let waste = record
            .suggested_waste_percent
            .unwrap_or(DEFAULT_WASTE_PERCENT);
        let rise = pitch_numerator(record.predominant_pitch.as_deref().unwrap_or(DEFAULT_PITCH))
            .unwrap_or_default();
        let stories = record.number_of_stories.unwrap_or(DEFAULT_STORIES);

        let flat_area = record.flat_area().min(total_area);
        let sloped_squares = squares(total_area - flat_area, waste);
        let flat_squares = squares(flat_area, waste);

        let surcharge = if stories > 1 {
            self.config.two_story_surcharge
        } else {
            0.0
        };
        let tier = PitchTier::for_rise(rise);
        let labor_rate = self.config.labor.rate(tier) + surcharge;

        let secondary_squares = match self.config.secondary_scaling {
            SecondaryScaling::RawArea => total_area / 100.0,
            SecondaryScaling::WasteAdjusted => f64::from(squares(total_area, waste)),
        };

        let schedule = self.config.schedule(category);
        let mut line_items = vec![LineItem::new(
            schedule.base_description.as_str(),
            f64::from(sloped_squares),
            "square",
            schedule.base_per_square,
        )];
        line_items.extend(schedule.items.iter().map(|item| {
            LineItem::new(
                item.description.as_str(),
                f64::from(units(secondary_squares, item.per_unit_coverage)),
                item.unit.as_str(),
                item.unit_price,
            )
        }));
        line_items.push(LineItem::new(
            format!("Labor ({rise}/12 pitch)"),
            f64::from(sloped_squares),
            "square",
            labor_rate,
        ));
        if flat_squares > 0 {
            line_items.push(LineItem::new(
                "Flat Roof Materials (Base Cap + ISO)",
                f64::from(flat_squares),
                "square",
                self.config.flat_roof.per_square(),
            ));
            line_items.push(LineItem::new(
                "Flat Roof Labor",
                f64::from(flat_squares),
                "square",
                self.config.labor.flat + surcharge,
            ));
        }
        line_items.extend(
            self.config
                .flat_charges
                .iter()
                .map(|c| LineItem::new(c.description.as_str(), 1.0, "each", c.amount)),
        );

        let subtotal: f64 = line_items.iter().map(|i| i.total).sum();
        let profit_amount = subtotal * profit_margin_percent / 100.0;
        debug!(
            %category,
            sloped_squares,
            flat_squares,
            labor_rate,
            subtotal,
            "Estimate priced"
        );

        Ok(PricedEstimate {
            category,
            line_items,
            subtotal,
            profit_margin_percent,
            profit_amount,
            total: subtotal + profit_amount,
            details: PricingDetails {
                total_squares: sloped_squares,
                flat_squares,
                waste_factor: waste,
                labor_rate,
                pitch_tier: tier,
                stories,
            },
        })
    }
}

fn fmt_quantity(q: f64) -> String {
    if q.fract() == 0.0 {
        format!("{q:.0}")
    } else {
        format!("{q:.2}")
    }
}

impl fmt::Display for PricedEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} estimate", self.category)?;
        for item in &self.line_items {
            writeln!(
                f,
                "  {:<38} {:>10} {:<6} @ {:>9.2} = {:>11.2}",
                item.description,
                fmt_quantity(item.quantity),
                item.unit,
                item.unit_price,
                item.total
            )?;
        }
        writeln!(f, "  {:<70} {:>11.2}", "Subtotal", self.subtotal)?;
        writeln!(
            f,
            "  {:<70} {:>11.2}",
            format!("Profit ({}%)", fmt_quantity(self.profit_margin_percent)),
            self.profit_amount
        )?;
        write!(f, "  {:<70} {:>11.2}", "Total", self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::PitchArea;
    use proptest::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    fn record(area: f64, pitch: &str) -> MeasurementRecord {
        MeasurementRecord {
            total_area: Some(area),
            predominant_pitch: Some(pitch.to_string()),
            suggested_waste_percent: Some(DEFAULT_WASTE_PERCENT),
            number_of_stories: Some(1),
            ..Default::default()
        }
    }

    fn item<'a>(estimate: &'a PricedEstimate, description: &str) -> &'a LineItem {
        estimate
            .line_items
            .iter()
            .find(|i| i.description == description)
            .unwrap()
    }

    #[test]
    fn test_squares_rounds_up() {
        assert_eq!(squares(2500.0, 15.0), 29);
        assert_eq!(squares(1000.0, 10.0), 11);
        assert_eq!(squares(1001.0, 0.0), 11);
        assert_eq!(squares(0.0, 15.0), 0);
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("shingle".parse::<RoofingCategory>().unwrap(), RoofingCategory::Shingle);
        assert_eq!(" METAL ".parse::<RoofingCategory>().unwrap(), RoofingCategory::Metal);
        assert!(matches!(
            "slate".parse::<RoofingCategory>(),
            Err(PricingError::InvalidCategory(c)) if c == "slate"
        ));
    }

    #[test]
    fn test_shingle_2500_scenario() {
        let engine = PricingEngine::default();
        let est = engine
            .price(&record(2500.0, "6/12"), RoofingCategory::Shingle, 25.0)
            .unwrap();

        assert_eq!(est.details.total_squares, 29);
        assert_eq!(est.details.flat_squares, 0);
        assert_eq!(est.details.pitch_tier, PitchTier::Tier1);
        assert!(close(est.details.labor_rate, 100.0));

        let descriptions: Vec<_> = est.line_items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(
            descriptions,
            [
                "Shingle Roofing Material",
                "Underlayment",
                "Starter Strip",
                "Ridge Caps",
                "Nails",
                "Labor (6/12 pitch)",
                "Trip Charge",
                "Dumpster",
                "Permits & Inspections",
            ]
        );
        assert!(close(item(&est, "Shingle Roofing Material").total, 4410.90));
        assert!(close(item(&est, "Underlayment").total, 3.0 * 104.94));
        assert!(close(item(&est, "Nails").total, 2.0 * 66.69));
        assert!(close(item(&est, "Labor (6/12 pitch)").total, 2900.0));
        assert!(close(est.details.waste_factor, 15.0));
        assert!(close(est.subtotal, 11662.58));
        assert!(close(est.profit_amount, 2915.645));
        assert!(close(est.total, 14578.225));
    }

    #[test]
    fn test_two_story_surcharge_hits_labor_only() {
        let engine = PricingEngine::default();
        let one = engine
            .price(&record(2000.0, "9/12"), RoofingCategory::Tile, 0.0)
            .unwrap();
        let mut two_story = record(2000.0, "9/12");
        two_story.number_of_stories = Some(2);
        let two = engine.price(&two_story, RoofingCategory::Tile, 0.0).unwrap();

        assert!(close(two.details.labor_rate, 110.0 + 10.90));
        assert_eq!(
            item(&one, "Tile Roofing Material").total,
            item(&two, "Tile Roofing Material").total
        );
        let squares = f64::from(one.details.total_squares);
        assert!(close(two.subtotal - one.subtotal, squares * 10.90));
    }

    #[test]
    fn test_metal_uses_metal_accessories() {
        let est = PricingEngine::default()
            .price(&record(1500.0, "4/12"), RoofingCategory::Metal, 10.0)
            .unwrap();
        assert!(close(item(&est, "Fasteners").total, 111.15));
        assert!(close(item(&est, "Trim").total, 2.0 * 119.54));
        assert!(close(item(&est, "Sealant").total, 66.69));
        assert_eq!(item(&est, "Sealant").unit, "case");
        assert!(!est.line_items.iter().any(|i| i.description == "Nails"));
    }

    #[test]
    fn test_secondary_items_use_raw_area_by_default() {
        let est = PricingEngine::default()
            .price(&record(2500.0, "6/12"), RoofingCategory::Shingle, 0.0)
            .unwrap();
        assert!(close(item(&est, "Underlayment").quantity, 3.0));
        assert_eq!(item(&est, "Underlayment").unit, "roll");
        assert!(close(item(&est, "Shingle Roofing Material").quantity, 29.0));
    }

    #[test]
    fn test_underlayment_rolls_at_ten_square_boundary() {
        let engine = PricingEngine::default();
        let rolls = |area: f64| {
            let est = engine
                .price(&record(area, "6/12"), RoofingCategory::Shingle, 0.0)
                .unwrap();
            item(&est, "Underlayment").quantity
        };
        assert!(close(rolls(1000.0), 1.0));
        assert!(close(rolls(1001.0), 2.0));
        assert!(close(rolls(2000.0), 2.0));
        assert!(close(rolls(2500.0), 3.0));
    }

    #[test]
    fn test_units_round_up_per_package() {
        assert_eq!(units(25.0, 10.0), 3);
        assert_eq!(units(30.0, 15.0), 2);
        assert_eq!(units(10.000000000000002, 10.0), 1);
        assert_eq!(units(0.0, 10.0), 0);
        assert_eq!(units(2.5, 0.0), 3);
    }

    #[test]
    fn test_secondary_items_waste_adjusted() {
        let engine = PricingEngine::new(PricingConfig {
            secondary_scaling: SecondaryScaling::WasteAdjusted,
            ..Default::default()
        });
        let est = engine
            .price(&record(2000.0, "6/12"), RoofingCategory::Shingle, 0.0)
            .unwrap();
        assert!(close(item(&est, "Underlayment").quantity, 3.0));
        assert!(close(item(&est, "Starter Strip").total, 3.0 * 63.25));
    }

    #[test]
    fn test_flat_area_priced_separately() {
        let mut rec = record(2000.0, "6/12");
        rec.suggested_waste_percent = Some(0.0);
        rec.pitch_breakdown = vec![
            PitchArea { pitch: "6/12".into(), area: 1600.0, percent: None },
            PitchArea { pitch: "0/12".into(), area: 400.0, percent: None },
        ];
        let est = PricingEngine::default()
            .price(&rec, RoofingCategory::Shingle, 0.0)
            .unwrap();
        assert_eq!(est.details.total_squares, 16);
        assert_eq!(est.details.flat_squares, 4);
        assert!(close(item(&est, "Flat Roof Materials (Base Cap + ISO)").total, 4.0 * 120.0));
        assert!(close(item(&est, "Flat Roof Labor").total, 4.0 * 85.0));
        let labor_pos = est
            .line_items
            .iter()
            .position(|i| i.description == "Flat Roof Labor")
            .unwrap();
        assert_eq!(est.line_items[labor_pos + 1].description, "Trip Charge");
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let rec = MeasurementRecord {
            total_area: Some(1000.0),
            ..Default::default()
        };
        let est = PricingEngine::default()
            .price(&rec, RoofingCategory::Shingle, 0.0)
            .unwrap();
        assert_eq!(est.details.total_squares, 12);
        assert_eq!(est.details.pitch_tier, PitchTier::Tier1);
        assert_eq!(est.details.stories, 1);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        let engine = PricingEngine::default();
        assert_eq!(
            engine.price(&MeasurementRecord::default(), RoofingCategory::Tile, 10.0),
            Err(PricingError::MissingTotalArea)
        );
        assert_eq!(
            engine.price(&record(1000.0, "4/12"), RoofingCategory::Tile, -1.0),
            Err(PricingError::InvalidProfitMargin(-1.0))
        );
        assert!(check_profit_margin(f64::NAN).is_err());
        assert!(check_profit_margin(0.0).is_ok());
    }

    #[test]
    fn test_price_is_idempotent() {
        let engine = PricingEngine::default();
        let rec = record(3333.0, "11/12");
        let a = engine.price(&rec, RoofingCategory::Tile, 17.5).unwrap();
        let b = engine.price(&rec, RoofingCategory::Tile, 17.5).unwrap();
        assert_eq!(a.total.to_bits(), b.total.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn test_display_formats_two_decimals() {
        let est = PricingEngine::default()
            .price(&record(2500.0, "6/12"), RoofingCategory::Shingle, 25.0)
            .unwrap();
        let text = est.to_string();
        assert!(text.starts_with("SHINGLE estimate"));
        assert!(text.contains("4410.90"));
        assert!(text.contains("Profit (25%)"));
        assert!(text.contains("11662.58"));
        assert!(text.contains("roll"));
    }

    proptest! {
        #[test]
        fn test_squares_monotonic_in_area(
            area in 100.0f64..100_000.0,
            delta in 0.0f64..5_000.0,
            waste in 0.0f64..100.0,
        ) {
            prop_assert!(squares(area, waste) <= squares(area + delta, waste));
        }

        #[test]
        fn test_squares_monotonic_in_waste(
            area in 100.0f64..100_000.0,
            waste in 0.0f64..100.0,
            delta in 0.0f64..50.0,
        ) {
            prop_assert!(squares(area, waste) <= squares(area, waste + delta));
        }

        #[test]
        fn test_labor_rate_total_over_pitches(rise in 0u32..=40) {
            let engine = PricingEngine::default();
            let est = engine
                .price(&record(2000.0, &format!("{rise}/12")), RoofingCategory::Shingle, 0.0)
                .unwrap();
            let labor = &engine.config().labor;
            let expected = match rise {
                0..=7 => labor.tier1,
                8..=9 => labor.tier2,
                10..=12 => labor.tier3,
                _ => labor.tier4,
            };
            prop_assert_eq!(est.details.labor_rate, expected);
        }
    }
}
