use serde::{Deserialize, Serialize};

use crate::GenerationError;

fn default_provider() -> String {
    "openai".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1".into()
}

fn default_system_prompt() -> String {
    "You are a linguistics expert. Output only a JSON object as specified.".into()
}

fn default_max_tokens() -> u32 {
    256
}

fn default_timeout_secs() -> u64 {
    60
}

/// Generation provider settings.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationConfig {
    /// Provider selector. Only `"openai"` (any OpenAI-compatible endpoint) is built in.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bearer token. Omitted from the request when unset.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// System message sent ahead of every prompt.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default)]
    pub temperature: f32,
    /// Upper bound on completion tokens per call.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: None,
            system_prompt: default_system_prompt(),
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

// Hand-written so the API key never reaches logs.
impl std::fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.provider != "openai" {
            return Err(GenerationError::InvalidConfig(format!(
                "unknown generation provider '{}'",
                self.provider
            )));
        }
        if self.model.trim().is_empty() {
            return Err(GenerationError::InvalidConfig("model must not be empty".into()));
        }
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(GenerationError::InvalidConfig(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(GenerationError::InvalidConfig(
                "temperature must be within 0.0..=2.0".into(),
            ));
        }
        if self.max_tokens == 0 {
            return Err(GenerationError::InvalidConfig(
                "max_tokens must be greater than 0".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(GenerationError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
