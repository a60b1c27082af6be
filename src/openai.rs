//! OpenAI-compatible chat-completion client.
//!
//! Posts `{model, messages, max_tokens, temperature}` to the configured
//! endpoint with a bearer key and returns `choices[0].message.content`.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::config::AiConfig;
use crate::errors::SideQuestError;
use crate::generator::{ChatMessage, ChatOptions, TextGenerator};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct OpenAiClient {
    config: AiConfig,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: AiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Chat options derived from the `[ai]` config section.
    pub fn default_options(&self) -> ChatOptions {
        ChatOptions {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Explicit key first, then the configured environment variable.
    fn api_key(&self) -> Result<String, SideQuestError> {
        if !self.config.api_key.trim().is_empty() {
            return Ok(self.config.api_key.trim().to_string());
        }
        match std::env::var(&self.config.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(SideQuestError::ConfigurationMissing(format!(
                "no API key in [ai].api_key or ${}",
                self.config.api_key_env
            ))),
        }
    }
}

#[async_trait]
impl TextGenerator for OpenAiClient {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<String, SideQuestError> {
        if !self.config.enabled {
            return Err(SideQuestError::ConfigurationMissing(
                "text generation is disabled ([ai].enabled = false)".to_string(),
            ));
        }
        let api_key = self.api_key()?;

        let body = ChatRequest {
            model: &options.model,
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };
        debug!(
            "POST {} model={} messages={}",
            self.config.endpoint,
            options.model,
            messages.len()
        );

        let request = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body);
        let timeout_duration = Duration::from_secs(self.config.timeout_seconds);
        let response = timeout(timeout_duration, request.send())
            .await
            .map_err(|_| {
                SideQuestError::Http(format!("request timeout after {}s", self.config.timeout_seconds))
            })?
            .map_err(|e| SideQuestError::Http(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SideQuestError::Http(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| format!("request failed with status {}", status));
            warn!("chat completion returned {}: {}", status, message);
            return Err(SideQuestError::Http(message));
        }

        extract_content(&text)
    }
}

/// Pull the first choice's text out of a completion body.
fn extract_content(body: &str) -> Result<String, SideQuestError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| SideQuestError::InvalidAiResponse(format!("unexpected completion body: {}", e)))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| SideQuestError::InvalidAiResponse("completion has no content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_choice() {
        let body = r#"{"id":"x","choices":[{"index":0,"message":{"role":"assistant","content":"{\"questXp\":1}"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), "{\"questXp\":1}");
    }

    #[test]
    fn empty_choices_are_invalid() {
        assert!(matches!(
            extract_content(r#"{"choices":[]}"#),
            Err(SideQuestError::InvalidAiResponse(_))
        ));
        assert!(matches!(
            extract_content("not json"),
            Err(SideQuestError::InvalidAiResponse(_))
        ));
    }

    #[test]
    fn missing_key_fails_before_network() {
        let config = AiConfig {
            api_key: String::new(),
            api_key_env: "SIDEQUEST_TEST_UNSET_KEY_VAR".to_string(),
            // unroutable, never contacted
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            ..AiConfig::default()
        };
        let client = OpenAiClient::new(config);
        let err = tokio_test::block_on(client.chat(&[ChatMessage::user("hi")], &client.default_options()))
            .unwrap_err();
        assert!(matches!(err, SideQuestError::ConfigurationMissing(_)));
    }

    #[test]
    fn request_serializes_like_the_api_expects() {
        let messages = vec![ChatMessage::system("s"), ChatMessage::user("u")];
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: &messages,
            max_tokens: 2048,
            temperature: 0.5,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["max_tokens"], 2048);
    }
}
