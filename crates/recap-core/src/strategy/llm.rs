use super::ReconstructionStrategy;
use crate::model::{MaskedVideo, Reconstructed};
use crate::parse::{fill_from_response, parse_llm_response};
use crate::prompt::PromptTemplate;
use crate::providers::llm::LlmClient;
use anyhow::Context;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct LlmStrategy {
    name: String,
    template: PromptTemplate,
    client: Arc<dyn LlmClient>,
}

impl LlmStrategy {
    pub fn new(name: &str, template: PromptTemplate, client: Arc<dyn LlmClient>) -> Self {
        Self {
            name: name.to_string(),
            template,
            client,
        }
    }
}

#[async_trait]
impl ReconstructionStrategy for LlmStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "llm"
    }

    async fn reconstruct(&self, masked: &MaskedVideo) -> anyhow::Result<Reconstructed> {
        let prompt = self.template.render(masked)?;
        let resp = self
            .client
            .complete(&prompt)
            .await
            .with_context(|| format!("completion failed for video {}", masked.video_id()))?;

        let debug = serde_json::json!({
            "prompt_len": prompt.len(),
            "llm_response_text": resp.text,
            "model": resp.model,
            "cached": resp.cached,
        });

        let parsed = parse_llm_response(&resp.text, masked.video.clips.len())
            .and_then(|clips| fill_from_response(masked, clips));

        match parsed {
            Ok(r) => Ok(r.with_debug(debug)),
            Err(e) => {
                tracing::warn!(
                    video_id = %masked.video_id(),
                    strategy = %self.name,
                    error = %e,
                    "could not use model output"
                );
                Ok(Reconstructed::new(masked.video_id())
                    .skip(e.reason())
                    .with_debug(debug))
            }
        }
    }

    fn params(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::from([
            ("strategy.name".to_string(), self.name.clone()),
            ("strategy.type".to_string(), self.kind().to_string()),
            ("strategy.model".to_string(), self.client.model_id()),
        ]);
        if let Some(src) = self.template.source() {
            out.insert(
                "strategy.prompt_template".to_string(),
                src.display().to_string(),
            );
        }
        out
    }
}
