mod config;
mod engine;

pub use config::{
    FlatCharge, FlatRoofPrices, LaborRates, MaterialSchedule, PackagedItem, PitchTier,
    PricingConfig, SecondaryScaling,
};
pub use engine::{
    LineItem, PricedEstimate, PricingDetails, PricingEngine, RoofingCategory, check_profit_margin,
    squares, units,
};
