// src/pipeline.rs

use crate::assemble::MeasurementAssembler;
use crate::config::Config;
use crate::error::{ConfigError, FallbackError, PipelineError};
use crate::heuristics::{
    CascadeExtractor, ExtractionTrace, FallbackOutcome, FallbackTrace, normalize_text,
};
use crate::llm_extract::FallbackExtractor;
use crate::measurements::MeasurementRecord;
use crate::pricing::{PricedEstimate, PricingEngine, RoofingCategory, check_profit_margin};
use crate::validate::FieldValidator;
use serde::Serialize;
use std::time::Duration;
use tracing::{Instrument, Span, error, field, info, info_span, warn};

const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// Measurements after every extraction stage, before pricing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub measurements: MeasurementRecord,
    pub is_valid: bool,
    pub debug: ExtractionTrace,
}

#[derive(Debug, Clone, Serialize)]
pub struct EstimateOutput {
    pub measurements: MeasurementRecord,
    pub pricing: PricedEstimate,
    pub debug: ExtractionTrace,
}

/// Failure payload: a message plus the trace when one exists.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<ExtractionTrace>,
}

impl From<&PipelineError> for ErrorOutput {
    fn from(err: &PipelineError) -> Self {
        Self {
            error: err.to_string(),
            debug: err.trace().cloned(),
        }
    }
}

/// Text in, priced estimate out. Holds no per-request state, so a single
/// pipeline can serve concurrent requests.
#[derive(Clone)]
pub struct EstimatePipeline {
    validator: FieldValidator,
    assembler: MeasurementAssembler,
    fallback: Option<FallbackExtractor>,
    fallback_timeout: Duration,
    pricing: PricingEngine,
}

impl EstimatePipeline {
    pub fn new(pricing: PricingEngine) -> Self {
        Self {
            validator: FieldValidator,
            assembler: MeasurementAssembler::default(),
            fallback: None,
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            pricing,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut pipeline = Self::new(PricingEngine::new(config.pricing.clone()))
            .with_fallback_timeout(Duration::from_secs(config.llm.timeout_secs));
        pipeline.fallback = FallbackExtractor::from_config(&config.llm)?;
        Ok(pipeline)
    }

    pub fn with_fallback(mut self, fallback: FallbackExtractor) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    /// Run every extraction stage. Never fails; an unusable document shows
    /// up as `is_valid == false` and a missing total area.
    pub async fn extract(&self, raw_text: &str) -> ExtractionOutcome {
        let text = normalize_text(raw_text);
        let (cascade, mut trace) = CascadeExtractor::default().extract(&text);
        Span::current().record("digest", trace.text_digest.as_str());

        // Final-stage keys are written by the assembler; these describe the
        // cascade's own values, whatever later stages fill in.
        let validated = self.validator.validate(cascade);
        trace.validation_errors.extend(
            validated
                .errors
                .into_iter()
                .map(|(field, reason)| (format!("cascade.{field}"), reason)),
        );

        let fragment = if validated.record.total_area.is_none() {
            self.run_fallback(&text, &mut trace).await
        } else {
            None
        };

        let result = self
            .assembler
            .assemble(validated.record, &mut trace, fragment);
        ExtractionOutcome {
            measurements: result.record,
            is_valid: result.is_valid,
            debug: trace,
        }
    }

    /// Extract and price one document. The category and margin are checked
    /// before any work is done.
    pub async fn estimate(
        &self,
        raw_text: &str,
        category: &str,
        profit_margin_percent: f64,
    ) -> Result<EstimateOutput, PipelineError> {
        let category: RoofingCategory = category
            .parse()
            .map_err(|_| PipelineError::InvalidCategory(category.to_string()))?;
        check_profit_margin(profit_margin_percent)?;

        let span = info_span!("estimate", %category, digest = field::Empty);
        self.extract_and_price(raw_text, category, profit_margin_percent)
            .instrument(span)
            .await
    }

    async fn extract_and_price(
        &self,
        raw_text: &str,
        category: RoofingCategory,
        profit_margin_percent: f64,
    ) -> Result<EstimateOutput, PipelineError> {
        let outcome = self.extract(raw_text).await;
        if outcome.measurements.total_area.is_none() {
            error!("Could not extract roof area");
            return Err(PipelineError::FatalExtraction {
                message: "could not extract roof area".to_string(),
                trace: Box::new(outcome.debug),
            });
        }

        let pricing = self
            .pricing
            .price(&outcome.measurements, category, profit_margin_percent)?;
        info!(
            squares = pricing.details.total_squares,
            total = format!("{:.2}", pricing.total),
            "Estimate ready"
        );
        Ok(EstimateOutput {
            measurements: outcome.measurements,
            pricing,
            debug: outcome.debug,
        })
    }

    async fn run_fallback(
        &self,
        text: &str,
        trace: &mut ExtractionTrace,
    ) -> Option<MeasurementRecord> {
        let Some(fallback) = &self.fallback else {
            warn!("Total area missing and no fallback model configured");
            trace.fallback = Some(FallbackTrace {
                outcome: FallbackOutcome::NotConfigured,
                error: Some(FallbackError::NotConfigured.to_string()),
                fields_filled: Vec::new(),
            });
            return None;
        };

        let (outcome, error, fragment) =
            match tokio::time::timeout(self.fallback_timeout, fallback.extract_via_model(text))
                .await
            {
                Ok(Ok(fragment)) => (FallbackOutcome::Succeeded, None, Some(fragment)),
                Ok(Err(e)) => (FallbackOutcome::Failed, Some(e.to_string()), None),
                Err(_) => {
                    let e = FallbackError::ExternalService(format!(
                        "timed out after {:?}",
                        self.fallback_timeout
                    ));
                    warn!(error = %e, "Fallback call abandoned");
                    (FallbackOutcome::TimedOut, Some(e.to_string()), None)
                }
            };
        trace.fallback = Some(FallbackTrace {
            outcome,
            error,
            fields_filled: Vec::new(),
        });
        fragment
    }
}
