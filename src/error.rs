// src/error.rs

use crate::heuristics::ExtractionTrace;
use thiserror::Error;

/// Failure of the generative-model fallback. Never fatal on its own.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FallbackError {
    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("could not parse model reply: {0}")]
    Parse(String),

    #[error("no fallback model configured")]
    NotConfigured,
}

/// Why a waste table match could not be turned into entries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WasteTableError {
    #[error("waste table columns misaligned: {percentages} percentages, {areas} areas, {squares} squares")]
    Misaligned {
        percentages: usize,
        areas: usize,
        squares: usize,
    },

    #[error("invalid waste percentage: {0}")]
    InvalidPercentage(String),

    #[error("invalid waste area: {0}")]
    InvalidArea(String),

    #[error("invalid number in waste table: {0}")]
    InvalidNumber(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    #[error("unsupported roofing category: {0}")]
    InvalidCategory(String),

    #[error("cannot price a record without a total area")]
    MissingTotalArea,

    #[error("invalid profit margin: {0}")]
    InvalidProfitMargin(f64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("LLM_API_KEY env var required for remote backend")]
    MissingApiKey,
}

/// Problems turning an input file into report text.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("failed to read report: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Pdf(String),

    #[error("document appears to be scanned or image-only; only text PDFs are supported")]
    ScannedDocument,

    #[error("document does not look like a roof measurement report")]
    NotARoofReport,
}

/// Errors surfaced to whoever asked for an estimate.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{message}")]
    FatalExtraction {
        message: String,
        trace: Box<ExtractionTrace>,
    },

    #[error("unsupported roofing category: {0}")]
    InvalidCategory(String),

    #[error(transparent)]
    Pricing(#[from] PricingError),
}

/// Coarse classification for transport layers (HTTP 4xx vs 5xx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    Server,
}

impl PipelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            PipelineError::FatalExtraction { .. } | PipelineError::InvalidCategory(_) => {
                ErrorClass::Client
            }
            PipelineError::Pricing(PricingError::InvalidCategory(_))
            | PipelineError::Pricing(PricingError::InvalidProfitMargin(_)) => ErrorClass::Client,
            PipelineError::Pricing(PricingError::MissingTotalArea) => ErrorClass::Server,
        }
    }

    pub fn trace(&self) -> Option<&ExtractionTrace> {
        match self {
            PipelineError::FatalExtraction { trace, .. } => Some(&**trace),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let fatal = PipelineError::FatalExtraction {
            message: "could not extract roof area".to_string(),
            trace: Box::default(),
        };
        assert_eq!(fatal.class(), ErrorClass::Client);
        assert!(fatal.trace().is_some());

        assert_eq!(
            PipelineError::InvalidCategory("slate".into()).class(),
            ErrorClass::Client
        );
        assert_eq!(
            PipelineError::from(PricingError::MissingTotalArea).class(),
            ErrorClass::Server
        );
    }

    #[test]
    fn test_misaligned_message() {
        let e = WasteTableError::Misaligned {
            percentages: 3,
            areas: 2,
            squares: 0,
        };
        assert!(e.to_string().contains("misaligned"));
    }
}
