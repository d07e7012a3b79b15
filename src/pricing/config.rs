// src/pricing/config.rs

use super::RoofingCategory;
use serde::{Deserialize, Serialize};

/// Price tables handed to [`super::PricingEngine`] at construction. The
/// engine never mutates them; overriding a price means building a new
/// config (or loading one from the `[pricing]` TOML section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    pub shingle: MaterialSchedule,
    pub tile: MaterialSchedule,
    pub metal: MaterialSchedule,
    pub labor: LaborRates,
    /// Added per square to both labor rates when the building has more
    /// than one story.
    pub two_story_surcharge: f64,
    pub flat_roof: FlatRoofPrices,
    /// Charged once per estimate, in this order.
    pub flat_charges: Vec<FlatCharge>,
    pub secondary_scaling: SecondaryScaling,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            shingle: MaterialSchedule {
                base_description: "Shingle Roofing Material".to_string(),
                base_per_square: 152.10,
                items: vec![
                    PackagedItem::new("Underlayment", "roll", 10.0, 104.94),
                    PackagedItem::new("Starter Strip", "box", 10.0, 63.25),
                    PackagedItem::new("Ridge Caps", "bundle", 10.0, 66.41),
                    PackagedItem::new("Nails", "box", 15.0, 66.69),
                ],
            },
            tile: MaterialSchedule {
                base_description: "Tile Roofing Material".to_string(),
                base_per_square: 295.75,
                items: vec![
                    PackagedItem::new("Underlayment", "roll", 10.0, 151.58),
                    PackagedItem::new("Starter Strip", "box", 10.0, 94.88),
                    PackagedItem::new("Ridge Caps", "bundle", 10.0, 92.97),
                    PackagedItem::new("Nails", "box", 15.0, 88.92),
                ],
            },
            metal: MaterialSchedule {
                base_description: "Metal Roofing Material".to_string(),
                base_per_square: 245.05,
                items: vec![
                    PackagedItem::new("Underlayment", "roll", 10.0, 128.26),
                    PackagedItem::new("Fasteners", "box", 15.0, 111.15),
                    PackagedItem::new("Trim", "bundle", 10.0, 119.54),
                    PackagedItem::new("Sealant", "case", 15.0, 66.69),
                ],
            },
            labor: LaborRates::default(),
            two_story_surcharge: 10.90,
            flat_roof: FlatRoofPrices::default(),
            flat_charges: vec![
                FlatCharge::new("Trip Charge", 327.00),
                FlatCharge::new("Dumpster", 687.50),
                FlatCharge::new("Permits & Inspections", 2500.00),
            ],
            secondary_scaling: SecondaryScaling::default(),
        }
    }
}

impl PricingConfig {
    pub fn schedule(&self, category: RoofingCategory) -> &MaterialSchedule {
        match category {
            RoofingCategory::Shingle => &self.shingle,
            RoofingCategory::Tile => &self.tile,
            RoofingCategory::Metal => &self.metal,
        }
    }
}

/// Material prices for one roofing category. The base material is priced
/// per square; everything else is bought in packages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialSchedule {
    pub base_description: String,
    pub base_per_square: f64,
    /// Underlayment first, then the category's accessories.
    pub items: Vec<PackagedItem>,
}

/// A material sold by the package, e.g. one underlayment roll per 10
/// squares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagedItem {
    pub description: String,
    pub unit: String,
    /// Squares covered by one unit.
    pub per_unit_coverage: f64,
    pub unit_price: f64,
}

impl PackagedItem {
    fn new(description: &str, unit: &str, per_unit_coverage: f64, unit_price: f64) -> Self {
        Self {
            description: description.to_string(),
            unit: unit.to_string(),
            per_unit_coverage,
            unit_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatCharge {
    pub description: String,
    pub amount: f64,
}

impl FlatCharge {
    fn new(description: &str, amount: f64) -> Self {
        Self {
            description: description.to_string(),
            amount,
        }
    }
}

/// Per-square labor rates, by pitch tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaborRates {
    /// 0/12 through 7/12.
    pub tier1: f64,
    /// 8/12 and 9/12.
    pub tier2: f64,
    /// 10/12 through 12/12.
    pub tier3: f64,
    /// 13/12 and steeper.
    pub tier4: f64,
    /// Flat (0/12) sections priced as low-slope work.
    pub flat: f64,
}

impl Default for LaborRates {
    fn default() -> Self {
        Self {
            tier1: 100.00,
            tier2: 110.00,
            tier3: 150.00,
            tier4: 171.68,
            flat: 85.00,
        }
    }
}

impl LaborRates {
    pub fn rate(&self, tier: PitchTier) -> f64 {
        match tier {
            PitchTier::Tier1 => self.tier1,
            PitchTier::Tier2 => self.tier2,
            PitchTier::Tier3 => self.tier3,
            PitchTier::Tier4 => self.tier4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchTier {
    Tier1,
    Tier2,
    Tier3,
    Tier4,
}

impl PitchTier {
    /// Tier for a pitch numerator. Anything steeper than 16/12 is priced at
    /// the top tier.
    pub fn for_rise(rise: u32) -> Self {
        match rise {
            0..=7 => PitchTier::Tier1,
            8..=9 => PitchTier::Tier2,
            10..=12 => PitchTier::Tier3,
            _ => PitchTier::Tier4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlatRoofPrices {
    pub base_cap_per_square: f64,
    pub iso_per_square: f64,
}

impl Default for FlatRoofPrices {
    fn default() -> Self {
        Self {
            base_cap_per_square: 75.00,
            iso_per_square: 45.00,
        }
    }
}

impl FlatRoofPrices {
    pub fn per_square(&self) -> f64 {
        self.base_cap_per_square + self.iso_per_square
    }
}

/// What the packaged items (underlayment, accessories) are counted
/// against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryScaling {
    /// Measured roof area, no waste. Matches the historical calculator.
    #[default]
    RawArea,
    /// Waste-adjusted squares of the whole roof.
    WasteAdjusted,
}
