use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod cached;
pub mod fake;
pub mod openai;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub meta: serde_json::Value,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse>;
    fn provider_name(&self) -> &'static str;
    fn model_id(&self) -> String;

    /// Request settings besides model and prompt that change the completion.
    /// Part of the response cache key.
    fn fingerprint(&self) -> String {
        String::new()
    }
}
