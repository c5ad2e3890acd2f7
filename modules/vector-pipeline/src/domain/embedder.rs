//! HTTP client for the external embedding model (spec §4.5 "invokes the
//! embedding model"), in the same shape as the workflow engine's
//! `AgentRuntime`/`DynamicAgent` call to its external AI service.

use std::time::Duration;

use modkit_errors::ApiError;
use serde_json::Value;

#[derive(Clone)]
pub struct EmbedderClient {
    http: reqwest::Client,
    service_url: String,
    api_key: String,
    model: String,
    call_timeout: Duration,
}

impl EmbedderClient {
    #[must_use]
    pub fn new(service_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>, call_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            service_url: service_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            call_timeout,
        }
    }

    /// # Errors
    /// `ApiError::external` if the call fails, the response status is not
    /// successful, the body isn't valid JSON, or the `embedding` field is
    /// missing or non-numeric.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, ApiError> {
        let request = serde_json::json!({ "model": self.model, "input": text });

        let response = self
            .http
            .post(format!("{}/v1/embeddings", self.service_url))
            .bearer_auth(&self.api_key)
            .timeout(self.call_timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| ApiError::external(format!("embedding service call failed: {e}")))?;

        if !response.status().is_success() {
            return Err(ApiError::external(format!("embedding service returned status {}", response.status())));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApiError::external(format!("embedding service reply is not valid JSON: {e}")))?;

        let embedding = body
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| ApiError::external("embedding service reply missing 'embedding' field"))?;

        #[allow(clippy::cast_possible_truncation)]
        embedding
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(|| ApiError::external("embedding value is not numeric")))
            .collect()
    }
}
