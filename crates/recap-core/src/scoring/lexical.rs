use super::{check_pairs, f1, Scorer};
use crate::model::ClipScores;
use async_trait::async_trait;
use std::collections::HashMap;

/// Token-overlap precision/recall/F1 over lower-cased alphanumeric tokens.
/// Overlap counts repeated tokens at most as often as both sides contain them.
pub struct LexicalScorer;

pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn counts(tokens: &[String]) -> HashMap<&str, usize> {
    let mut m = HashMap::new();
    for t in tokens {
        *m.entry(t.as_str()).or_insert(0) += 1;
    }
    m
}

pub fn overlap_scores(candidate: &str, reference: &str) -> (f64, f64, f64) {
    let c = tokenize(candidate);
    let r = tokenize(reference);
    if c.is_empty() || r.is_empty() {
        return (0.0, 0.0, 0.0);
    }
    let rc = counts(&r);
    let common: usize = counts(&c)
        .into_iter()
        .map(|(tok, n)| n.min(rc.get(tok).copied().unwrap_or(0)))
        .sum();
    let p = common as f64 / c.len() as f64;
    let rec = common as f64 / r.len() as f64;
    (p, rec, f1(p, rec))
}

#[async_trait]
impl Scorer for LexicalScorer {
    fn name(&self) -> &'static str {
        "lexical"
    }

    async fn score(
        &self,
        candidates: &[String],
        references: &[String],
    ) -> anyhow::Result<ClipScores> {
        check_pairs(candidates, references)?;
        let mut out = ClipScores::default();
        for (c, r) in candidates.iter().zip(references) {
            let (p, rec, f) = overlap_scores(c, r);
            out.push(p, rec, f);
        }
        Ok(out)
    }
}
