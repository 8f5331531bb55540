use crate::config::OpenRouterConfig;
use crate::entities::MessageRole;
use crate::error::{AppError, AppResult};
use crate::models::{ChatMessage, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 上游对话补全接口
#[async_trait]
pub trait ChatCompletionProvider: Send + Sync {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> AppResult<Completion>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    id: String,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UpstreamUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct UpstreamUsage {
    prompt_tokens: i32,
    completion_tokens: i32,
    total_tokens: i32,
}

pub struct OpenRouterClient {
    client: Client,
    config: OpenRouterConfig,
    max_tokens: u32,
    temperature: f32,
}

impl OpenRouterClient {
    pub fn new(config: OpenRouterConfig, max_tokens: u32, temperature: f32) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            config,
            max_tokens,
            temperature,
        })
    }
}

#[async_trait]
impl ChatCompletionProvider for OpenRouterClient {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> AppResult<Completion> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = CompletionRequest {
            model,
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.app_title)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApiError(format!(
                "OpenRouter returned {status}: {error_text}"
            )));
        }

        let parsed: CompletionResponse = response.json().await?;
        into_completion(parsed)
    }
}

fn into_completion(parsed: CompletionResponse) -> AppResult<Completion> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AppError::ExternalApiError("No response from model".to_string()))?;

    Ok(Completion {
        id: parsed.id,
        role: choice.message.role,
        content: choice.message.content,
        usage: parsed.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_upstream_response() {
        let raw = r#"{
            "id": "gen-123",
            "model": "openai/gpt-4o",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello"}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;
        let parsed: CompletionResponse = serde_json::from_str(raw).unwrap();
        let completion = into_completion(parsed).unwrap();
        assert_eq!(completion.id, "gen-123");
        assert_eq!(completion.role, MessageRole::Assistant);
        assert_eq!(completion.content, "Hello");
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_empty_choices_is_upstream_error() {
        let parsed: CompletionResponse =
            serde_json::from_str(r#"{"id": "gen-1", "choices": []}"#).unwrap();
        assert!(matches!(
            into_completion(parsed),
            Err(AppError::ExternalApiError(_))
        ));
    }

    #[test]
    fn test_request_serializes_roles_lowercase() {
        let messages = vec![ChatMessage::new(MessageRole::System, "sys")];
        let body = CompletionRequest {
            model: "openai/gpt-4o",
            messages: &messages,
            max_tokens: 10,
            temperature: 0.5,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["messages"][0]["role"], "system");
        assert_eq!(v["model"], "openai/gpt-4o");
    }
}
