// src/llm_extract.rs

use crate::config::{LlmBackend, LlmSection};
use crate::error::{ConfigError, FallbackError};
use crate::measurements::{MeasurementRecord, normalize_pitch, parse_number};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};

/// How much of the report is embedded in the prompt.
pub const PROMPT_TEXT_LIMIT: usize = 4000;

const SYSTEM_PROMPT: &str =
    "You are a roofing measurement extraction assistant. You read text extracted from aerial roof measurement reports and return ONLY valid JSON.";

/// Ask the configured model for the fields the cascade could not find.
pub fn build_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(PROMPT_TEXT_LIMIT).collect();
    format!(
        r#"Extract the following measurements from this roofing report text.
Return ONLY a JSON object with exactly these keys:
  "total_area": number or null (total roof area in square feet)
  "predominant_pitch": string or null (the main roof pitch in N/12 format)
  "suggested_waste_percentage": number or null (the suggested waste percentage)

Use null for anything you cannot determine. No markdown fences, no commentary.

Report text:
{excerpt}"#
    )
}

/// A chat-style text generation service. [`ChatCompletionClient`] talks to
/// OpenAI-compatible HTTP backends; tests substitute a canned reply.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, FallbackError>;

    /// Human-readable backend/model label for logs.
    fn describe(&self) -> String;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Resolved endpoint configuration ready to make API calls.
#[derive(Debug, Clone)]
struct ResolvedEndpoint {
    base_url: String,
    model: String,
    api_key: String,
}

/// Resolve the LLM config section into a concrete endpoint, or `None` when
/// the fallback is switched off.
fn resolve_endpoint(llm: &LlmSection) -> Result<Option<ResolvedEndpoint>, ConfigError> {
    match llm.backend {
        LlmBackend::Disabled => Ok(None),
        LlmBackend::Ollama => Ok(Some(ResolvedEndpoint {
            base_url: llm.ollama.base_url.clone(),
            model: llm.ollama.model.clone(),
            api_key: "ollama".to_string(), // required by API but ignored
        })),
        LlmBackend::Remote => {
            let api_key = std::env::var("LLM_API_KEY").map_err(|_| ConfigError::MissingApiKey)?;
            Ok(Some(ResolvedEndpoint {
                base_url: llm.remote.base_url.clone(),
                model: llm.remote.model.clone(),
                api_key,
            }))
        }
    }
}

/// OpenAI-compatible `/chat/completions` client (Ollama, OpenAI and
/// anything else speaking the same protocol).
pub struct ChatCompletionClient {
    client: Client,
    backend: LlmBackend,
    endpoint: ResolvedEndpoint,
}

impl ChatCompletionClient {
    pub fn from_config(llm: &LlmSection) -> Result<Option<Self>, ConfigError> {
        let Some(endpoint) = resolve_endpoint(llm)? else {
            return Ok(None);
        };
        info!(
            backend = ?llm.backend,
            url = %endpoint.base_url,
            model = %endpoint.model,
            "Fallback model configured"
        );
        Ok(Some(Self {
            client: Client::new(),
            backend: llm.backend,
            endpoint,
        }))
    }
}

#[async_trait]
impl CompletionService for ChatCompletionClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, FallbackError> {
        let request = ChatRequest {
            model: self.endpoint.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.endpoint.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.endpoint.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| FallbackError::ExternalService(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FallbackError::ExternalService(format!(
                "LLM API error {status}: {body}"
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| FallbackError::Parse(format!("unexpected response envelope: {e}")))?;
        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| FallbackError::Parse("empty response from LLM".to_string()))
    }

    fn describe(&self) -> String {
        format!("{:?}/{}", self.backend, self.endpoint.model)
    }
}

/// Extract the outermost JSON object from a string that may contain
/// surrounding text (e.g. thinking tokens).
fn extract_json_object(s: &str) -> Result<&str, FallbackError> {
    let start = s
        .find('{')
        .ok_or_else(|| FallbackError::Parse("no '{' found in model reply".to_string()))?;
    let end = s
        .rfind('}')
        .ok_or_else(|| FallbackError::Parse("no '}' found in model reply".to_string()))?;
    if end <= start {
        return Err(FallbackError::Parse("malformed JSON in model reply".to_string()));
    }
    Ok(&s[start..=end])
}

fn lenient_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

fn lenient_pitch(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => normalize_pitch(s),
        Value::Number(n) => n.as_u64().and_then(|rise| normalize_pitch(&rise.to_string())),
        _ => None,
    }
}

/// Parse a model reply into a record fragment. Only the three requested keys
/// are read; extra keys are ignored and unusable values count as missing.
pub fn parse_reply(content: &str) -> Result<MeasurementRecord, FallbackError> {
    // Strip markdown fences if the model added them despite instructions
    let json_str = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let json_str = extract_json_object(json_str)?;

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| FallbackError::Parse(format!("{e}; raw: {json_str}")))?;
    let Value::Object(fields) = value else {
        return Err(FallbackError::Parse("reply is not a JSON object".to_string()));
    };

    Ok(MeasurementRecord {
        total_area: lenient_number(fields.get("total_area")),
        predominant_pitch: lenient_pitch(fields.get("predominant_pitch")),
        suggested_waste_percent: lenient_number(fields.get("suggested_waste_percentage")),
        ..Default::default()
    })
}

/// Recovers fields the pattern cascade missed by asking a generative model.
/// Makes exactly one call per invocation; retrying is the caller's business.
#[derive(Clone)]
pub struct FallbackExtractor {
    service: Arc<dyn CompletionService>,
}

impl FallbackExtractor {
    pub fn new(service: Arc<dyn CompletionService>) -> Self {
        Self { service }
    }

    /// `None` when the configured backend is disabled.
    pub fn from_config(llm: &LlmSection) -> Result<Option<Self>, ConfigError> {
        Ok(ChatCompletionClient::from_config(llm)?
            .map(|client| Self::new(Arc::new(client))))
    }

    pub async fn extract_via_model(&self, text: &str) -> Result<MeasurementRecord, FallbackError> {
        let span = info_span!("fallback", service = %self.service.describe());
        self.request_fragment(text).instrument(span).await
    }

    async fn request_fragment(&self, text: &str) -> Result<MeasurementRecord, FallbackError> {
        let prompt = build_prompt(text);
        info!(prompt_chars = prompt.chars().count(), "Requesting fallback extraction");
        let reply = self
            .service
            .complete(SYSTEM_PROMPT, &prompt)
            .await
            .inspect_err(|e| warn!(error = %e, "Fallback call failed"))?;
        let fragment =
            parse_reply(&reply).inspect_err(|e| warn!(error = %e, "Fallback reply unusable"))?;
        info!(
            total_area = ?fragment.total_area,
            pitch = ?fragment.predominant_pitch,
            waste = ?fragment.suggested_waste_percent,
            "Fallback extraction result"
        );
        Ok(fragment)
    }
}

#[cfg(test)]
pub(crate) use mock::MockCompletionService;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_truncates_to_limit() {
        let text = "é".repeat(PROMPT_TEXT_LIMIT + 500);
        let prompt = build_prompt(&text);
        assert_eq!(prompt.matches('é').count(), PROMPT_TEXT_LIMIT);
        assert!(prompt.contains("\"total_area\""));
        assert!(prompt.contains("\"predominant_pitch\""));
        assert!(prompt.contains("\"suggested_waste_percentage\""));
    }

    #[test]
    fn test_parse_plain_reply() {
        let rec = parse_reply(
            r#"{"total_area": 1800, "predominant_pitch": "7/12", "suggested_waste_percentage": 12}"#,
        )
        .unwrap();
        assert_eq!(rec.total_area, Some(1800.0));
        assert_eq!(rec.predominant_pitch.as_deref(), Some("7/12"));
        assert_eq!(rec.suggested_waste_percent, Some(12.0));
    }

    #[test]
    fn test_parse_fenced_reply_with_chatter() {
        let reply = "```json\nSure! {\"total_area\": \"2,450\", \"predominant_pitch\": 6, \"extra\": true}\n```";
        let rec = parse_reply(reply).unwrap();
        assert_eq!(rec.total_area, Some(2450.0));
        assert_eq!(rec.predominant_pitch.as_deref(), Some("6/12"));
        assert_eq!(rec.suggested_waste_percent, None);
    }

    #[test]
    fn test_parse_nulls_and_junk_values() {
        let rec = parse_reply(
            r#"{"total_area": null, "predominant_pitch": "steep", "suggested_waste_percentage": "n/a"}"#,
        )
        .unwrap();
        assert_eq!(rec, MeasurementRecord::default());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(parse_reply("I could not find it."), Err(FallbackError::Parse(_))));
        assert!(matches!(parse_reply("{not json}"), Err(FallbackError::Parse(_))));
    }

    #[test]
    fn test_disabled_backend_resolves_to_none() {
        let llm = LlmSection::default();
        assert!(FallbackExtractor::from_config(&llm).unwrap().is_none());
    }

    #[test]
    fn test_ollama_backend_resolves() {
        let llm = LlmSection {
            backend: LlmBackend::Ollama,
            ..Default::default()
        };
        let client = ChatCompletionClient::from_config(&llm).unwrap().unwrap();
        assert_eq!(client.describe(), "Ollama/qwen3:8b");
    }

    #[tokio::test]
    async fn test_extract_via_model_calls_once() {
        let mock = Arc::new(MockCompletionService::new(r#"{"total_area": 1800}"#));
        let extractor = FallbackExtractor::new(mock.clone());
        let rec = extractor.extract_via_model("no area here").await.unwrap();
        assert_eq!(rec.total_area, Some(1800.0));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_extract_via_model_propagates_service_error() {
        let mock = Arc::new(MockCompletionService::failing(FallbackError::ExternalService(
            "503".to_string(),
        )));
        let extractor = FallbackExtractor::new(mock.clone());
        let err = extractor.extract_via_model("text").await.unwrap_err();
        assert_eq!(err, FallbackError::ExternalService("503".to_string()));
        assert_eq!(mock.calls(), 1);
    }
}
