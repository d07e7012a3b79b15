use crate::error::ConfigError;
use crate::pricing::PricingConfig;
use serde::Deserialize;
use std::{fs, path::Path};

/// Application configuration. Every section has defaults, so an empty file
/// (or no file at all) is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub pricing: PricingConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// No fallback model; cascade results only.
    #[default]
    Disabled,
    Ollama,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub backend: LlmBackend,
    /// Upper bound on one fallback call. The service has no bound of its own.
    pub timeout_secs: u64,
    pub ollama: EndpointSection,
    pub remote: EndpointSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Disabled,
            timeout_secs: 30,
            ollama: EndpointSection {
                base_url: "http://localhost:11434/v1".to_string(),
                model: "qwen3:8b".to_string(),
            },
            remote: EndpointSection {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointSection {
    pub base_url: String,
    pub model: String,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::SecondaryScaling;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = Config::parse("").unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Disabled);
        assert_eq!(cfg.llm.timeout_secs, 30);
        assert_eq!(cfg.pricing, PricingConfig::default());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let cfg = Config::parse(
            r#"
            [llm]
            backend = "ollama"
            timeout_secs = 5

            [pricing]
            secondary_scaling = "waste_adjusted"
            two_story_surcharge = 12.5
            "#,
        )
        .unwrap();
        assert_eq!(cfg.llm.backend, LlmBackend::Ollama);
        assert_eq!(cfg.llm.timeout_secs, 5);
        assert_eq!(cfg.llm.ollama.base_url, "http://localhost:11434/v1");
        assert_eq!(cfg.pricing.secondary_scaling, SecondaryScaling::WasteAdjusted);
        assert_eq!(cfg.pricing.two_story_surcharge, 12.5);
        assert_eq!(cfg.pricing.labor, PricingConfig::default().labor);
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        let err = Config::parse("[llm]\nbackend = \"carrier-pigeon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/nonexistent/roof-estimator.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
