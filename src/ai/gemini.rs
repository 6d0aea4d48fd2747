use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::GenerationMethod;

use super::prompt::{story_prompt, SYSTEM_PROMPT};
use super::{GenerationRequest, GenerationStrategy};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    thinking_config: ThinkingConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn text_part(text: String) -> Content {
    Content {
        parts: vec![Part { text: Some(text) }],
    }
}

/// Google Gemini `generateContent`, the primary AI tier.
pub struct GeminiProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: Option<String>,
        model: String,
        endpoint: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            model,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl GenerationStrategy for GeminiProvider {
    fn method(&self) -> GenerationMethod {
        GenerationMethod::AiPrimary
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
            .ok_or_else(|| AppError::Provider("Gemini API key not configured".to_string()))?;

        // Thinking disabled for a faster answer.
        let body = GenerateRequest {
            system_instruction: text_part(SYSTEM_PROMPT.to_string()),
            contents: vec![text_part(story_prompt(request))],
            generation_config: GenerationConfig {
                thinking_config: ThinkingConfig { thinking_budget: 0 },
            },
        };

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Provider(format!(
                "Gemini API error {}: {}",
                status, error_text
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("malformed Gemini response: {}", e)))?;

        let story = extract_text(parsed);
        if story.is_empty() {
            return Err(AppError::Provider("empty response from Gemini".to_string()));
        }
        Ok(story)
    }
}

fn extract_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_includes_model() {
        let provider = GeminiProvider::new(
            Some("k".into()),
            "gemini-2.5-flash".into(),
            "https://example.test/v1beta/".into(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            provider.url(),
            "https://example.test/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn candidate_parts_are_concatenated() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"Once "},{"text":"upon a time\n"}],"role":"model"}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_text(parsed), "Once upon a time");
    }

    #[test]
    fn blocked_response_has_no_text() {
        let raw = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_text(parsed), "");
    }

    #[test]
    fn request_body_uses_camel_case() {
        let body = GenerateRequest {
            system_instruction: text_part("sys".into()),
            contents: vec![text_part("hi".into())],
            generation_config: GenerationConfig {
                thinking_config: ThinkingConfig { thinking_budget: 0 },
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["generationConfig"]["thinkingConfig"]["thinkingBudget"], 0);
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
    }
}
