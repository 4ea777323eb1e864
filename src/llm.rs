use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;

use crate::config::LlmSettings;
use crate::models::{ChatRequest, ChatResponse, Message};

/// Text generation. Failures are transport, timeout or malformed-response errors;
/// implementations do not retry.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Client for any OpenAI-compatible `/chat/completions` endpoint (Groq, LiteLLM, ...).
pub struct ChatCompletionModel {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

impl ChatCompletionModel {
    pub fn new(settings: &LlmSettings) -> Self {
        Self {
            client: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
        }
    }

    pub async fn chat_completion(&self, request: ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut req = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("chat completion request failed: {} - {}", status, error_text);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("malformed chat completion response")?;
        Ok(chat_response)
    }

    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/models", self.base_url);

        let mut req = self.client.get(&url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            temperature: Some(self.temperature),
            max_tokens: None,
            stream: Some(false),
        };

        let response = self.chat_completion(request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("chat completion returned no choices")?;

        if content.trim().is_empty() {
            anyhow::bail!("chat completion returned empty content");
        }
        Ok(content)
    }
}
