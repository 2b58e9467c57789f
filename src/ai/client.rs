// client.rs — Prompt + optional image in, model text out, with bounded
// retry and exponential backoff around the HTTP call.

use serde_json::Value;
use std::sync::Arc;
use url::Url;

use super::gemini;
use super::{AiError, InferenceRequest, ReqwestTransport, RetryPolicy, Transport};
use crate::settings::Settings;

pub struct InferenceClient {
    transport: Arc<dyn Transport>,
    endpoint: Url,
    policy: RetryPolicy,
}

impl InferenceClient {
    pub fn new(transport: Arc<dyn Transport>, endpoint: Url, policy: RetryPolicy) -> Self {
        Self {
            transport,
            endpoint,
            policy,
        }
    }

    /// Build a reqwest-backed client from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, AiError> {
        if settings.api_key.is_empty() {
            log::warn!("No API key configured; inference calls will be rejected by the endpoint");
        }
        let endpoint = gemini::endpoint_url(&settings.base_url, &settings.model, &settings.api_key)?;
        let transport = ReqwestTransport::new(settings.request_timeout())?;
        log::info!(
            "Inference client ready: {} ({} attempts max)",
            gemini::redacted(&endpoint),
            settings.retry_policy().attempts()
        );
        Ok(Self::new(
            Arc::new(transport),
            endpoint,
            settings.retry_policy(),
        ))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send `request` and return the first candidate's text.
    ///
    /// Delivery failures (connection errors, non-2xx statuses, bodies that are
    /// not JSON) are retried per the policy, sleeping `2^attempt * base_delay`
    /// between tries. An `EmptyOrMalformedResponse` is returned immediately.
    pub async fn invoke(&self, request: &InferenceRequest) -> Result<String, AiError> {
        let body = gemini::build_request_body(request);
        let max_attempts = self.policy.attempts();
        log::debug!(
            "Inference request: {} chars of instruction, image={}",
            request.instruction().len(),
            request.image().map(|i| i.len()).unwrap_or(0)
        );

        let mut attempt = 0;
        loop {
            match self.attempt(&body).await {
                Ok(text) => {
                    if attempt > 0 {
                        log::info!("Inference succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(text);
                }
                Err(e) if attempt + 1 < max_attempts && self.policy.should_retry(&e) => {
                    let delay = self.policy.delay_for(attempt);
                    log::warn!(
                        "Inference attempt {}/{} failed: {}; retrying in {}ms",
                        attempt + 1,
                        max_attempts,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::error!(
                        "Inference failed after {} attempt(s): {}",
                        attempt + 1,
                        e
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn attempt(&self, body: &Value) -> Result<String, AiError> {
        let response = self.transport.post_json(&self.endpoint, body).await?;
        if !response.is_success() {
            return Err(AiError::HttpError {
                status: response.status,
                body: response.body,
            });
        }
        gemini::parse_response(&response.body)
    }
}
