use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::content::{reels, ContentProvider, ContentResult};
use crate::filter::DiceRollEvent;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ChatMessage {
    fn new(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Horoscopes written by an OpenAI-compatible chat completion endpoint
pub struct LlmContent {
    client: reqwest::Client,
    config: LlmConfig,
}

impl LlmContent {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn prompt(roll: &DiceRollEvent) -> Option<String> {
        let reels = reels(roll.roll_value)?;
        let symbols: Vec<&str> = reels.iter().map(|reel| reel.name()).collect();
        Some(format!(
            "Die Slot Machine zeigt {}. Es ist {}. Schreibe das Tageshoroskop.",
            symbols.join(" | "),
            roll.occurred_at.format("%A, %H:%M")
        ))
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatMessage> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url);

        debug!("Requesting horoscope from: {}", url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM")?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error ({}): {}", status, error_body);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .context("No response from LLM")
    }
}

#[async_trait]
impl ContentProvider for LlmContent {
    async fn provide(&self, roll: &DiceRollEvent) -> Result<Option<ContentResult>> {
        let Some(prompt) = Self::prompt(roll) else {
            return Ok(None);
        };

        let reply = self
            .chat(vec![
                ChatMessage::new("system", self.config.system_prompt.clone()),
                ChatMessage::new("user", prompt),
            ])
            .await?;

        Ok(reply.content.as_deref().and_then(to_result))
    }
}

/// Blank completions decline; anything else is shown in italics.
fn to_result(content: &str) -> Option<ContentResult> {
    let text = content.trim();
    if text.is_empty() {
        return None;
    }

    Some(ContentResult {
        message: text.to_string(),
        formatted_message: format!("<i>{}</i>", html_escape::encode_text(text)),
        image: None,
        use_html: true,
    })
}
