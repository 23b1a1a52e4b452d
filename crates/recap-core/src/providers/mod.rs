pub mod embedder;
pub mod llm;
pub mod retry;

use crate::errors::LlmError;
use std::time::Duration;

pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_ENV: &str = "RECAP_OPENAI_BASE_URL";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Base URL precedence: explicit config, then `RECAP_OPENAI_BASE_URL`, then
/// the public OpenAI endpoint.
pub fn resolve_base_url(configured: Option<&str>) -> String {
    configured
        .map(str::to_string)
        .or_else(|| std::env::var(OPENAI_BASE_URL_ENV).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string()
}

pub fn api_key_from_env() -> Result<String, LlmError> {
    std::env::var(OPENAI_API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or(LlmError::MissingApiKey {
            var: OPENAI_API_KEY_ENV,
        })
}

/// Map an HTTP response onto the retryable / non-retryable error classes and
/// decode the JSON body on success.
pub(crate) async fn json_or_error(
    response: reqwest::Response,
) -> Result<serde_json::Value, LlmError> {
    let status = response.status();
    match status.as_u16() {
        200..=299 => response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                message: e.to_string(),
            }),

        429 => {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(LlmError::RateLimited { retry_after })
        }

        500..=599 => {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(LlmError::Server {
                status: status.as_u16(),
                message,
            })
        }

        _ => {
            let message = response.text().await.unwrap_or_else(|_| status.to_string());
            Err(LlmError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}
