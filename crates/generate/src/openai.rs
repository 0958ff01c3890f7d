use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::map_error_status;
use crate::{GenerationConfig, GenerationError, Generator};

/// Chat-completions client for OpenAI and compatible endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    cfg: GenerationConfig,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(cfg: GenerationConfig) -> Result<Self, GenerationError> {
        cfg.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, cfg })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.cfg.endpoint.trim_end_matches('/'))
    }

    fn auth_header(&self) -> Option<String> {
        self.cfg.api_key.as_ref().map(|key| format!("Bearer {key}"))
    }
}

/// Build the full request body for the chat completions endpoint.
fn build_request_body(cfg: &GenerationConfig, prompt: &str, max_tokens: u32) -> Value {
    let mut messages = Vec::with_capacity(2);
    if !cfg.system_prompt.is_empty() {
        messages.push(json!({ "role": "system", "content": cfg.system_prompt }));
    }
    messages.push(json!({ "role": "user", "content": prompt }));
    json!({
        "model": cfg.model,
        "messages": messages,
        "temperature": cfg.temperature,
        "max_tokens": max_tokens,
    })
}

fn parse_completion(body: &str) -> Result<String, GenerationError> {
    let completion: ChatCompletion = serde_json::from_str(body)
        .map_err(|e| GenerationError::MalformedResponse(format!("not a chat completion: {e}")))?;
    completion
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default().trim().to_string())
        .ok_or_else(|| GenerationError::MalformedResponse("completion has no choices".into()))
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        let mut request = self
            .client
            .post(self.url())
            .json(&build_request_body(&self.cfg, prompt, max_tokens));
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(map_error_status(status.as_u16(), &body));
        }
        parse_completion(&body)
    }

    fn generate_blocking(&self, prompt: &str, max_tokens: u32) -> Result<String, GenerationError> {
        // The blocking client owns a private runtime; it is created and dropped
        // on the calling thread, which must not be an async worker.
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(self.cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let mut request = client
            .post(self.url())
            .json(&build_request_body(&self.cfg, prompt, max_tokens));
        if let Some(auth) = self.auth_header() {
            request = request.header("Authorization", auth);
        }

        let response = request
            .send()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(map_error_status(status.as_u16(), &body));
        }
        parse_completion(&body)
    }

    fn model_name(&self) -> &str {
        &self.cfg.model
    }
}
