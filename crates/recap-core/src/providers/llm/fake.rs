use super::{LlmClient, LlmResponse};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Responder = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Offline client for tests: a fixed answer, or a function of the prompt.
#[derive(Clone)]
pub struct FakeClient {
    model: String,
    responder: Option<Responder>,
    calls: Arc<AtomicUsize>,
}

impl FakeClient {
    pub fn new(model: String) -> Self {
        Self {
            model,
            responder: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_response(self, response: String) -> Self {
        self.with_responder(move |_| response.clone())
    }

    pub fn with_responder(mut self, f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        self.responder = Some(Arc::new(f));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = match &self.responder {
            Some(f) => f(prompt),
            None => "[]".to_string(),
        };

        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: self.model.clone(),
            cached: false,
            meta: serde_json::json!({}),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_id(&self) -> String {
        self.model.clone()
    }
}
