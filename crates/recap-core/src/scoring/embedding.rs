use super::{check_pairs, Scorer};
use crate::cache::key::embedding_key;
use crate::model::ClipScores;
use crate::providers::embedder::Embedder;
use crate::storage::store::Store;
use async_trait::async_trait;
use std::sync::Arc;

/// Cosine similarity of sentence embeddings, reported as P = R = F1.
pub struct EmbeddingScorer {
    embedder: Arc<dyn Embedder>,
    store: Store,
    refresh: bool,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn Embedder>, store: Store) -> Self {
        Self {
            embedder,
            store,
            refresh: false,
        }
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    /// Returns the vector and where it came from ("cache" or "live").
    pub async fn embed_cached(&self, text: &str) -> anyhow::Result<(Vec<f32>, &'static str)> {
        let model = self.embedder.model_id();
        let key = embedding_key(&model, text);

        if !self.refresh {
            if let Some((_, vec)) = self.store.get_embedding(&key)? {
                return Ok((vec, "cache"));
            }
        }

        let vec = self.embedder.embed(text).await?;
        self.store.put_embedding(&key, &model, &vec)?;
        Ok((vec, "live"))
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> anyhow::Result<f64> {
    if a.len() != b.len() {
        anyhow::bail!("embedding dimension mismatch: {} vs {}", a.len(), b.len());
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (na.sqrt() * nb.sqrt()))
}

#[async_trait]
impl Scorer for EmbeddingScorer {
    fn name(&self) -> &'static str {
        "embedding"
    }

    async fn score(
        &self,
        candidates: &[String],
        references: &[String],
    ) -> anyhow::Result<ClipScores> {
        check_pairs(candidates, references)?;
        let mut out = ClipScores::default();
        for (c, r) in candidates.iter().zip(references) {
            let (cv, _) = self.embed_cached(c).await?;
            let (rv, _) = self.embed_cached(r).await?;
            let sim = cosine_similarity(&cv, &rv)?;
            out.push(sim, sim, sim);
        }
        Ok(out)
    }
}
