pub mod assemble;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod llm_extract;
pub mod measurements;
pub mod pdf_extract;
pub mod pipeline;
pub mod pricing;
pub mod validate;

pub use pipeline::{ErrorOutput, EstimateOutput, EstimatePipeline, ExtractionOutcome};
