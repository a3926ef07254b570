use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::mime::data_url;
use super::{PictureDescription, VisionError, VisionOutcome, VisionResult, VisionService};
use crate::config::VisionConfig;

/// Vision client for OpenAI's chat completions API with structured outputs.
pub struct OpenAiVisionClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: Value,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiVisionClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::new_with_client(api_key, model, Client::new())
    }

    pub fn new_with_client(api_key: String, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url: "https://api.openai.com".to_string(),
            model,
            max_tokens: 500,
            timeout: Duration::from_secs(60),
        }
    }

    /// Build a client from the `vision` configuration section.
    pub fn from_config(config: &VisionConfig) -> VisionResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| VisionError::Provider("vision.api_key is not set".to_string()))?;

        Ok(Self::new(api_key, config.model.clone())
            .with_base_url(config.base_url.clone())
            .with_max_tokens(config.max_tokens)
            .with_timeout(Duration::from_secs(config.timeout_secs)))
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_request(&self, lang: &str, image_base64: &str) -> ChatRequest {
        let instruction = format!(
            "Describe the object in the image, tell me its name, describe it and \
             give three funny facts about it. Use a simple language, use {} only",
            lang
        );

        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: instruction },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url(image_base64),
                        },
                    },
                ],
            }],
            response_format: description_schema(),
            max_tokens: self.max_tokens,
        }
    }

    async fn chat_completion(&self, request: &ChatRequest) -> VisionResult<ChatResponse> {
        tracing::debug!(model = %self.model, "Sending vision request to OpenAI");

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .timeout(self.timeout)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to OpenAI: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("OpenAI API error (status {}): {}", status, error_text);
            return Err(VisionError::Provider(format!(
                "API error (status {}): {}",
                status, error_text
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse OpenAI response: {}", e);
            VisionError::Provider(format!("Failed to parse OpenAI response: {}", e))
        })
    }

    fn interpret(response: ChatResponse) -> VisionResult<VisionOutcome> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| VisionError::Provider("No choices in OpenAI response".to_string()))?;

        match choice.finish_reason.as_deref() {
            Some("length") => return Err(VisionError::ImageTooLarge),
            Some("content_filter") => {
                return Err(VisionError::Provider(
                    "Completion stopped by content filter".to_string(),
                ))
            }
            _ => {}
        }

        if let Some(refusal) = choice.message.refusal.filter(|r| !r.is_empty()) {
            return Ok(VisionOutcome::Refused(refusal));
        }

        let Some(content) = choice.message.content.filter(|c| !c.trim().is_empty()) else {
            return Ok(VisionOutcome::Unidentified);
        };

        match serde_json::from_str::<PictureDescription>(&content) {
            Ok(description) => Ok(VisionOutcome::Described(description)),
            Err(e) => {
                tracing::warn!("Model output did not match the description schema: {}", e);
                Ok(VisionOutcome::Unidentified)
            }
        }
    }
}

/// JSON schema for [`PictureDescription`] in OpenAI's `response_format` shape.
fn description_schema() -> Value {
    json!({
        "type": "json_schema",
        "json_schema": {
            "name": "PictureDescription",
            "strict": true,
            "schema": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "fun_facts": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["name", "description", "fun_facts"],
                "additionalProperties": false
            }
        }
    })
}

#[async_trait]
impl VisionService for OpenAiVisionClient {
    async fn describe(&self, lang: &str, image_base64: &str) -> VisionResult<VisionOutcome> {
        let request = self.build_request(lang, image_base64);
        let response = self.chat_completion(&request).await?;
        Self::interpret(response)
    }
}
