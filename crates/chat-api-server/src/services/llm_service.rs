use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::{LlmConfig, PromptsConfig};
use crate::models::ChatMessage;
use crate::services::conversation::{ContextBuilder, MergedContext, ModelChain};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: usize,
    temperature: f32,
    n: u8,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// OpenAI-compatible chat completion client.
#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
    context_builder: ContextBuilder,
}

impl LlmService {
    pub fn new(config: LlmConfig, prompts: &PromptsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            config,
            context_builder: ContextBuilder::from_config(prompts),
        })
    }

    pub async fn generate_chat(&self, messages: &[ChatMessage]) -> Result<String> {
        debug!(model = %self.config.model, messages = messages.len(), "Requesting chat completion");

        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            n: 1,
            stream: false,
        };

        let url = format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.context("Failed to call LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error: {} - {}", status, body);
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("No choices returned from LLM"))
    }
}

#[async_trait]
impl ModelChain for LlmService {
    async fn invoke(&self, context: &MergedContext, input: &str) -> Result<String> {
        let messages = self.context_builder.build_messages(context, input);
        self.generate_chat(&messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Turn;
    use crate::services::conversation::{MemoryComposer, Passage};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(base_url: String, api_key: Option<&str>) -> LlmService {
        let config = LlmConfig {
            base_url,
            api_key: api_key.map(str::to_string),
            ..LlmConfig::default()
        };
        let prompts = PromptsConfig {
            system: vec!["ctx: {long_term_memory}".to_string()],
        };
        LlmService::new(config, &prompts).unwrap()
    }

    #[tokio::test]
    async fn test_invoke_sends_rendered_messages() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(json!({
                "model": "gpt-3.5-turbo",
                "n": 1,
                "messages": [
                    {"role": "system", "content": "ctx: fact"},
                    {"role": "user", "content": "earlier"},
                    {"role": "assistant", "content": "reply"},
                    {"role": "user", "content": "now"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "answer"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let llm = service(server.uri(), Some("secret"));
        let context = MemoryComposer::merge(
            vec![Turn::human("earlier"), Turn::assistant("reply")],
            vec![Passage::new("fact")],
        );

        assert_eq!(llm.invoke(&context, "now").await.unwrap(), "answer");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let llm = service(server.uri(), None);
        let err = llm
            .invoke(&MergedContext::default(), "hi")
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("502"));
        assert!(err.contains("bad gateway"));
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let llm = service(server.uri(), None);
        assert!(llm.invoke(&MergedContext::default(), "hi").await.is_err());
    }
}
