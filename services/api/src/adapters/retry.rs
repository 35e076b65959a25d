//! services/api/src/adapters/retry.rs
//!
//! Retry with exponential backoff for rate-limited AI calls, and fallback across
//! an ordered list of models when one model's quota is exhausted.

use async_openai::error::OpenAIError;
use bookchat_core::ports::{PortError, PortResult};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

/// Runs `op`, retrying while it reports `PortError::RateLimited`. The delay
/// starts at the policy's initial delay and doubles after every attempt.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, mut op: F) -> PortResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PortResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay;
    let mut last_error = None;

    for attempt in 1..=attempts {
        match op().await {
            Err(PortError::RateLimited(msg)) => {
                warn!(attempt, "Rate limit hit: {}. Retrying in {:?}", msg, delay);
                last_error = Some(PortError::RateLimited(msg));
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_DELAY);
                }
            }
            other => return other,
        }
    }
    Err(last_error.unwrap_or_else(|| {
        PortError::Unexpected("Max retries exhausted for API request".to_string())
    }))
}

/// Runs `op` against each model in turn, moving on only when a model reports
/// `PortError::QuotaExceeded`. Each model gets the full retry policy.
pub async fn with_model_fallback<T, F, Fut>(
    models: &[String],
    policy: RetryPolicy,
    mut op: F,
) -> PortResult<T>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = PortResult<T>>,
{
    for (index, model) in models.iter().enumerate() {
        let result = with_retry(policy, || op(model.clone())).await;
        match result {
            Err(PortError::QuotaExceeded(msg)) if index + 1 < models.len() => {
                warn!(%model, "Quota exceeded: {}. Trying next model...", msg);
            }
            Ok(value) => {
                if index > 0 {
                    info!(%model, "Request served by fallback model");
                }
                return Ok(value);
            }
            Err(e) => return Err(e),
        }
    }
    Err(PortError::QuotaExceeded(
        "Failed to get AI response from all available models".to_string(),
    ))
}

/// Maps an OpenAI client error onto the port error taxonomy.
pub fn classify(error: OpenAIError) -> PortError {
    match error {
        OpenAIError::ApiError(api) => {
            let code = api.code.as_deref().unwrap_or_default();
            let kind = api.r#type.as_deref().unwrap_or_default();
            if code == "insufficient_quota" || kind == "insufficient_quota" {
                PortError::QuotaExceeded(api.message)
            } else if code == "rate_limit_exceeded" || kind == "requests" || kind == "tokens" {
                PortError::RateLimited(api.message)
            } else if code == "invalid_api_key" || kind == "authentication_error" {
                PortError::Unauthorized
            } else if kind == "invalid_request_error" {
                PortError::Invalid(api.message)
            } else {
                PortError::Unexpected(api.message)
            }
        }
        other => PortError::Unexpected(other.to_string()),
    }
}
