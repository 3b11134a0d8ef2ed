use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::planner::{CompletionClient, PlannerError};

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    retry_budget: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// Text of the first choice, if any
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .filter(|c| !c.trim().is_empty())
    }
}

impl OpenAiClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            temperature: 0.7,
            timeout: Duration::from_secs(60),
            retry_budget: Duration::from_secs(20),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_budget(mut self, retry_budget: Duration) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    pub async fn chat_completion(
        &self,
        api_key: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatCompletionResponse, PlannerError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(self.temperature),
        };

        tracing::debug!("Chat completion request: model={}, {} messages", request.model, request.messages.len());

        let backoff_config = ExponentialBackoff {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(8),
            multiplier: 2.0,
            max_elapsed_time: Some(self.retry_budget),
            ..Default::default()
        };

        // Retry connection errors, timeouts, 429 and 5xx; everything else is final
        let operation = || async {
            let response = self
                .client
                .post(format!("{}/chat/completions", self.base_url))
                .bearer_auth(api_key)
                .timeout(self.timeout)
                .json(&request)
                .send()
                .await
                .map_err(|e| {
                    if e.is_connect() || e.is_timeout() {
                        tracing::warn!("Chat completion connection error (retrying): {}", e);
                        backoff::Error::transient(PlannerError::Http(e.to_string()))
                    } else {
                        backoff::Error::permanent(PlannerError::Http(e.to_string()))
                    }
                })?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| backoff::Error::permanent(PlannerError::Http(e.to_string())))?;

            if status.as_u16() == 429 || status.is_server_error() {
                tracing::warn!("Chat completion API returned {} (retrying)", status);
                return Err(backoff::Error::transient(PlannerError::Api {
                    status: status.as_u16(),
                    body,
                }));
            }

            if !status.is_success() {
                return Err(backoff::Error::permanent(PlannerError::Api {
                    status: status.as_u16(),
                    body,
                }));
            }

            serde_json::from_str::<ChatCompletionResponse>(&body)
                .map_err(|e| backoff::Error::permanent(PlannerError::Malformed(e.to_string())))
        };

        retry(backoff_config, operation).await
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, api_key: &str, system: &str, user: &str) -> Result<String, PlannerError> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: user.to_string(),
            },
        ];

        let response = self.chat_completion(api_key, messages).await?;
        response
            .first_content()
            .map(str::to_string)
            .ok_or(PlannerError::EmptyContent)
    }
}
