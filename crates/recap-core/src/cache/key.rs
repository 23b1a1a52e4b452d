use sha2::{Digest, Sha256};

/// Key for the LLM response cache. `fingerprint` covers every request
/// setting besides model and prompt that changes the completion.
pub fn cache_key(model: &str, prompt: &str, fingerprint: &str) -> String {
    let mut h = Sha256::new();
    h.update(model.as_bytes());
    h.update(b"\n");
    h.update(prompt.as_bytes());
    h.update(b"\n");
    h.update(fingerprint.as_bytes());
    hex::encode(h.finalize())
}

pub fn embedding_key(model: &str, text: &str) -> String {
    let mut h = Sha256::new();
    h.update(b"emb\n");
    h.update(model.as_bytes());
    h.update(b"\n");
    h.update(text.as_bytes());
    hex::encode(h.finalize())
}
