use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::GenerationMethod;

use super::prompt::{story_prompt, SYSTEM_PROMPT};
use super::{GenerationRequest, GenerationStrategy};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct MessageRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

/// Anthropic Messages API, the secondary AI tier.
pub struct ClaudeProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
}

impl ClaudeProvider {
    pub fn new(api_key: Option<String>, model: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl GenerationStrategy for ClaudeProvider {
    fn method(&self) -> GenerationMethod {
        GenerationMethod::AiSecondary
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn attempt(&self, request: &GenerationRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Provider("Claude API key not configured".to_string()))?;

        let body = MessageRequest {
            model: self.model.clone(),
            max_tokens: 2048,
            messages: vec![Message {
                role: "user".to_string(),
                content: story_prompt(request),
            }],
            system: Some(SYSTEM_PROMPT.to_string()),
        };

        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "Claude API error {}: {}",
                status, error_text
            )));
        }

        let message_response: MessageResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("malformed Claude response: {}", e)))?;

        let story = message_response
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();

        if story.is_empty() {
            return Err(AppError::Provider("empty response from Claude".to_string()));
        }
        Ok(story)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_follows_api_key() {
        let timeout = Duration::from_secs(1);
        let without = ClaudeProvider::new(None, "m".into(), timeout).unwrap();
        let with = ClaudeProvider::new(Some("k".into()), "m".into(), timeout).unwrap();
        assert!(!without.is_available());
        assert!(with.is_available());
    }

    #[tokio::test]
    async fn missing_key_is_a_provider_error() {
        let provider = ClaudeProvider::new(None, "m".into(), Duration::from_secs(1)).unwrap();
        let req = GenerationRequest::parse("sea, salt", "drama", "short", "dark").unwrap();
        assert!(matches!(
            provider.attempt(&req).await,
            Err(AppError::Provider(_))
        ));
    }

    #[test]
    fn response_text_blocks_deserialize() {
        let raw = r#"{"content":[{"type":"text","text":"Once upon a time"}],"id":"x"}"#;
        let parsed: MessageResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text.as_deref(), Some("Once upon a time"));
    }
}
