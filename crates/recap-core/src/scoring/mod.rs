//! Similarity between reconstructed and ground-truth captions.

pub mod embedding;
pub mod lexical;

use crate::config::{ScorerKind, ScoringConfig};
use crate::model::{mean, ClipScores};
use crate::providers::embedder::Embedder;
use crate::storage::store::Store;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[async_trait]
pub trait Scorer: Send + Sync {
    fn name(&self) -> &'static str;

    /// One score triple per `(candidates[i], references[i])` pair.
    async fn score(&self, candidates: &[String], references: &[String])
        -> anyhow::Result<ClipScores>;
}

/// Run-level metrics: the mean over videos of each video's mean score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub num_of_instances: usize,
    pub mean_f1_score: f64,
    pub mean_precision: f64,
    pub mean_recall: f64,
}

impl RunMetrics {
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("num_of_instances".to_string(), self.num_of_instances as f64),
            ("mean_f1_score".to_string(), self.mean_f1_score),
            ("mean_precision".to_string(), self.mean_precision),
            ("mean_recall".to_string(), self.mean_recall),
        ])
    }
}

/// `None` when no video produced scores.
pub fn aggregate<'a>(per_video: impl IntoIterator<Item = &'a ClipScores>) -> Option<RunMetrics> {
    let scored: Vec<&ClipScores> = per_video.into_iter().filter(|s| !s.is_empty()).collect();
    if scored.is_empty() {
        return None;
    }
    let f1: Vec<f64> = scored.iter().map(|s| s.mean_f1()).collect();
    let p: Vec<f64> = scored.iter().map(|s| s.mean_precision()).collect();
    let r: Vec<f64> = scored.iter().map(|s| s.mean_recall()).collect();
    Some(RunMetrics {
        num_of_instances: scored.len(),
        mean_f1_score: mean(&f1),
        mean_precision: mean(&p),
        mean_recall: mean(&r),
    })
}

pub(crate) fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

pub(crate) fn check_pairs(candidates: &[String], references: &[String]) -> anyhow::Result<()> {
    if candidates.len() != references.len() {
        anyhow::bail!(
            "candidate/reference length mismatch: {} vs {}",
            candidates.len(),
            references.len()
        );
    }
    Ok(())
}

/// Scorer for the batch `scoring:` section. The embedding scorer needs an
/// embedder; it is built by the caller so tests can inject a fake.
pub fn build_scorer(
    cfg: &ScoringConfig,
    store: &Store,
    embedder: Option<Arc<dyn Embedder>>,
    refresh: bool,
) -> anyhow::Result<Arc<dyn Scorer>> {
    match cfg.scorer {
        ScorerKind::Lexical => Ok(Arc::new(lexical::LexicalScorer)),
        ScorerKind::Embedding => {
            let embedder = embedder
                .ok_or_else(|| anyhow::anyhow!("embedding scorer requires an embedder"))?;
            Ok(Arc::new(
                embedding::EmbeddingScorer::new(embedder, store.clone()).refresh(refresh),
            ))
        }
    }
}
