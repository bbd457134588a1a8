//! HTTP client for an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uw_config::LlmConfig;

use crate::Generative;
use crate::error::LlmError;
use crate::http::check_response;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Production [`Generative`] over `reqwest`.
///
/// Wrap in [`crate::RetryingGenerative`] before use.
pub struct HttpGenerative {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl HttpGenerative {
    /// # Errors
    ///
    /// Returns [`LlmError::NotConfigured`] when the endpoint, key or model is
    /// missing, or [`LlmError::Http`] if the client cannot be built.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        if !config.is_configured() {
            return Err(LlmError::NotConfigured(
                "set llm.base_url, llm.api_key and llm.model".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("underwrite/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            url: config.completions_url(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Generative for HttpGenerative {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            max_tokens,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let resp = check_response(resp).await?;
        let body: ChatResponse = resp.json().await?;
        extract_text(body)
    }
}

fn extract_text(body: ChatResponse) -> Result<String, LlmError> {
    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| LlmError::Parse("completion had no text content".into()))
}
