//! OpenRouter API client with automatic retry for transient errors.

use super::{LlmClient, LlmError, RetryConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    model: String,
    retry_config: RetryConfig,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

fn classify_status(status: reqwest::StatusCode, body: &str) -> LlmError {
    let code = status.as_u16();
    if code == 429 {
        LlmError::RateLimited(body.to_string())
    } else if status.is_server_error() {
        LlmError::Server {
            status: code,
            body: body.to_string(),
        }
    } else {
        LlmError::Client {
            status: code,
            body: body.to_string(),
        }
    }
}

/// Strip a markdown code fence if the model wrapped its JSON in one.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

impl OpenRouterClient {
    pub fn new(api_key: String, model: String, request_timeout: std::time::Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            model,
            retry_config: RetryConfig::default(),
        }
    }

    pub fn with_retry_config(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    async fn execute_request(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> Result<serde_json::Value, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        let response = self
            .client
            .post(OPENROUTER_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Network(format!("request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::Network(format!("connection failed: {e}"))
                } else {
                    LlmError::Network(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::Parse(format!("failed to parse response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::Parse("no choices in response".to_string()))?;

        serde_json::from_str(strip_code_fence(&choice.message.content))
            .map_err(|e| LlmError::Parse(format!("completion is not valid JSON: {e}")))
    }

    async fn execute_with_retry(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> Result<serde_json::Value, LlmError> {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.execute_request(prompt, temperature).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let out_of_budget = attempt >= self.retry_config.max_attempts
                        || start.elapsed() > self.retry_config.max_retry_duration;
                    if !err.is_transient() || out_of_budget {
                        return Err(err);
                    }
                    let delay = self.retry_config.base_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::debug!(attempt, error = %err, "retrying llm request");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl LlmClient for OpenRouterClient {
    async fn evaluate(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> Result<serde_json::Value, LlmError> {
        self.execute_with_retry(prompt, temperature).await
    }
}
