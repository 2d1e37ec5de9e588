use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::config::KnowledgeConfig;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl EmbeddingService {
    pub fn new(config: &KnowledgeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.embedding_base_url.trim_end_matches('/').to_string(),
            model: config.embedding_model.clone(),
            api_key: config.embedding_api_key.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let request = EmbeddingRequest {
            model: &self.model,
            input: text,
        };
        let mut builder = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        parse_embedding(&json)
    }
}

/// Accepts `{"data":[{"embedding":[..]}]}`, `{"embedding":[..]}`,
/// `[{"embedding":[..]}]` and a bare float array.
pub fn parse_embedding(json: &Value) -> Result<Vec<f32>> {
    let values = if let Some(data) = json.get("data").and_then(Value::as_array) {
        data.first().and_then(|item| item.get("embedding"))
    } else if let Some(embedding) = json.get("embedding") {
        Some(embedding)
    } else if let Some(first) = json.as_array().and_then(|arr| arr.first()) {
        if first.is_object() {
            first.get("embedding")
        } else {
            Some(json)
        }
    } else {
        None
    };

    let embedding: Vec<f32> = values
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow::anyhow!("Unrecognized embedding response format: {}", json))?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if embedding.is_empty() {
        anyhow::bail!("Generated embedding is empty");
    }
    Ok(embedding)
}
