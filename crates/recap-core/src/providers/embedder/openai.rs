use super::Embedder;
use crate::config::LlmConfig;
use crate::errors::LlmError;
use crate::providers::retry::RetryPolicy;
use crate::providers::{api_key_from_env, json_or_error, resolve_base_url};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

pub struct OpenAIEmbedder {
    pub model: String,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl OpenAIEmbedder {
    pub fn new(model: String, api_key: String) -> Self {
        Self {
            model,
            api_key,
            base_url: resolve_base_url(None),
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    /// Shares endpoint, retry and timeout settings with the batch `llm:`
    /// section; the API key comes from `OPENAI_API_KEY`.
    pub fn from_config(model: String, cfg: &LlmConfig) -> Result<Self, LlmError> {
        Ok(Self::new(model, api_key_from_env()?)
            .with_base_url(resolve_base_url(cfg.base_url.as_deref()))
            .with_retry(RetryPolicy::from_config(cfg))
            .with_timeout(Duration::from_secs(cfg.timeout_secs)))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => self.client = client,
            Err(e) => tracing::warn!(error = %e, "failed to build HTTP client with timeout; using defaults"),
        }
        self
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;
        json_or_error(resp).await
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let body = json!({
            "input": text,
            "model": self.model,
            "encoding_format": "float"
        });
        let json = self
            .retry
            .run("embedding", || self.send_once(&body))
            .await?;

        let vec = json
            .pointer("/data/0/embedding")
            .and_then(|v| v.as_array())
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "response missing data[0].embedding".into(),
            })?;

        Ok(vec
            .iter()
            .map(|x| x.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }

    fn name(&self) -> &'static str {
        "openai"
    }

    fn model_id(&self) -> String {
        self.model.clone()
    }
}
