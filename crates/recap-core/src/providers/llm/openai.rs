use super::{LlmClient, LlmResponse};
use crate::config::LlmConfig;
use crate::errors::LlmError;
use crate::providers::retry::RetryPolicy;
use crate::providers::{api_key_from_env, json_or_error, resolve_base_url};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Chat completions against any OpenAI-compatible endpoint.
pub struct OpenAIClient {
    pub model: String,
    api_key: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub json_mode: bool,
    base_url: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: String, temperature: f64, max_tokens: u32) -> Self {
        Self {
            model,
            api_key,
            temperature,
            max_tokens,
            json_mode: false,
            base_url: resolve_base_url(None),
            retry: RetryPolicy::default(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from the batch `llm:` section; the API key comes from
    /// `OPENAI_API_KEY`.
    pub fn from_config(cfg: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = api_key_from_env()?;
        Ok(
            Self::new(cfg.model_name.clone(), api_key, cfg.temperature, cfg.max_tokens)
                .with_base_url(resolve_base_url(cfg.base_url.as_deref()))
                .with_json_mode(cfg.json_mode)
                .with_retry(RetryPolicy::from_config(cfg))
                .with_timeout(Duration::from_secs(cfg.timeout_secs)),
        )
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
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

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });
        if self.json_mode {
            body["response_format"] = json!({ "type": "json_object" });
        }
        body
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<serde_json::Value, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
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
impl LlmClient for OpenAIClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let body = self.request_body(prompt);
        let json = self
            .retry
            .run("chat completion", || self.send_once(&body))
            .await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "response missing choices[0].message.content".into(),
            })?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: "openai".to_string(),
            model: self.model.clone(),
            cached: false,
            meta: json!({
                "usage": json.get("usage").cloned().unwrap_or(serde_json::Value::Null),
                "finish_reason": json.pointer("/choices/0/finish_reason").cloned().unwrap_or(serde_json::Value::Null),
            }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_id(&self) -> String {
        self.model.clone()
    }

    fn fingerprint(&self) -> String {
        format!(
            "temperature={};max_tokens={};json_mode={}",
            self.temperature, self.max_tokens, self.json_mode
        )
    }
}
