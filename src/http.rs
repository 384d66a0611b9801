//! Shared HTTP plumbing for the model providers.
//!
//! Providers make exactly one request per call and map the outcome onto
//! [`ModelError`]: HTTP 429 and 5xx and connection failures are
//! `Unavailable`, other 4xx are `Rejected`, client-side deadline expiry is
//! `Timeout`, and unparseable bodies are `InvalidResponse`.

use std::time::Duration;

use docqa_core::error::ModelError;

/// Longest provider error body echoed into an error message.
const MAX_ERROR_BODY_CHARS: usize = 300;

pub(crate) fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Send `request` and decode the JSON response body.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    service: &str,
    timeout: Duration,
) -> Result<serde_json::Value, ModelError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ModelError::Timeout(timeout)
        } else {
            ModelError::Unavailable(format!("{} connection error: {}", service, e))
        }
    })?;

    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(format!("{}: {}", service, e)));
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    Err(classify_status(status.as_u16(), &format!("{} API error {}: {}", service, status, body)))
}

pub(crate) fn classify_status(status: u16, detail: &str) -> ModelError {
    if status == 429 || (500..600).contains(&status) {
        ModelError::Unavailable(detail.to_string())
    } else {
        ModelError::Rejected(detail.to_string())
    }
}
