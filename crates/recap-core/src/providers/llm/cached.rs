use super::{LlmClient, LlmResponse};
use crate::cache::key::cache_key;
use crate::storage::store::Store;
use async_trait::async_trait;
use std::sync::Arc;

/// Read-through response cache in the tracking store. Reruns of a batch with
/// the same model, prompt and request settings never hit the API twice.
pub struct CachedLlmClient {
    inner: Arc<dyn LlmClient>,
    store: Store,
    refresh: bool,
}

impl CachedLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, store: Store) -> Self {
        Self {
            inner,
            store,
            refresh: false,
        }
    }

    /// Skip cache reads; fresh responses still overwrite the cache.
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

#[async_trait]
impl LlmClient for CachedLlmClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        let model = self.inner.model_id();
        let key = cache_key(&model, prompt, &self.inner.fingerprint());

        if !self.refresh {
            if let Some(text) = self.store.get_cached_response(&key)? {
                tracing::debug!(key = %key, model = %model, "llm cache hit");
                return Ok(LlmResponse {
                    text,
                    provider: self.inner.provider_name().to_string(),
                    model,
                    cached: true,
                    meta: serde_json::json!({ "cache_key": key }),
                });
            }
        }

        let resp = self.inner.complete(prompt).await?;
        self.store.put_cached_response(&key, &model, &resp.text)?;
        Ok(resp)
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn model_id(&self) -> String {
        self.inner.model_id()
    }

    fn fingerprint(&self) -> String {
        self.inner.fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::fake::FakeClient;

    fn setup() -> (FakeClient, Store) {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let fake = FakeClient::new("m".into()).with_responder(|p| format!("echo:{p}"));
        (fake, store)
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let (fake, store) = setup();
        let client = CachedLlmClient::new(Arc::new(fake.clone()), store);

        let first = client.complete("abc").await.unwrap();
        let second = client.complete("abc").await.unwrap();
        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(second.text, "echo:abc");
        assert_eq!(fake.calls(), 1);

        client.complete("other").await.unwrap();
        assert_eq!(fake.calls(), 2);
    }

    #[tokio::test]
    async fn refresh_bypasses_reads() {
        let (fake, store) = setup();
        let client = CachedLlmClient::new(Arc::new(fake.clone()), store.clone());
        client.complete("abc").await.unwrap();

        let refreshing = CachedLlmClient::new(Arc::new(fake.clone()), store).refresh(true);
        let resp = refreshing.complete("abc").await.unwrap();
        assert!(!resp.cached);
        assert_eq!(fake.calls(), 2);
    }
}
