//! Reconstruction strategies: fill the masked clips of a video.

pub mod baseline;
pub mod llm;

use crate::config::{resolve_path, StrategyConfig, StrategyKind};
use crate::model::{MaskedVideo, Reconstructed};
use crate::prompt::PromptTemplate;
use crate::providers::llm::LlmClient;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

pub use baseline::BaselineRepeatLast;
pub use llm::LlmStrategy;

#[async_trait]
pub trait ReconstructionStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Type tag as written in the batch config.
    fn kind(&self) -> &'static str;

    /// Fill every masked clip. Content problems (unparseable model output,
    /// nothing to copy from) come back as a skipped [`Reconstructed`];
    /// `Err` is reserved for failures like exhausted retries.
    async fn reconstruct(&self, masked: &MaskedVideo) -> anyhow::Result<Reconstructed>;

    /// Params logged on the child run, prefixed with `strategy.`.
    fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("strategy.name".to_string(), self.name().to_string()),
            ("strategy.type".to_string(), self.kind().to_string()),
        ])
    }
}

/// Build one strategy. `client` is required for `llm` strategies.
pub fn build_strategy(
    cfg: &StrategyConfig,
    base_dir: &Path,
    client: Option<Arc<dyn LlmClient>>,
) -> anyhow::Result<Arc<dyn ReconstructionStrategy>> {
    match &cfg.kind {
        StrategyKind::BaselineRepeatLast => Ok(Arc::new(BaselineRepeatLast::new(&cfg.name))),
        StrategyKind::Llm { prompt_template } => {
            let client = client.ok_or_else(|| {
                anyhow::anyhow!("strategy `{}` needs an LLM client", cfg.name)
            })?;
            let template = PromptTemplate::from_file(&resolve_path(base_dir, prompt_template))?;
            Ok(Arc::new(LlmStrategy::new(&cfg.name, template, client)))
        }
    }
}

pub fn build_strategies(
    cfgs: &[StrategyConfig],
    base_dir: &Path,
    client: Option<Arc<dyn LlmClient>>,
) -> anyhow::Result<Vec<Arc<dyn ReconstructionStrategy>>> {
    cfgs.iter()
        .map(|c| build_strategy(c, base_dir, client.clone()))
        .collect()
}

/// True when any strategy in the list talks to a model.
pub fn needs_llm(cfgs: &[StrategyConfig]) -> bool {
    cfgs.iter()
        .any(|c| matches!(c.kind, StrategyKind::Llm { .. }))
}
