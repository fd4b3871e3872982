//! Model transport contract and the Gemini HTTP implementation.
//!
//! The pipeline only sees [`ModelTransport`]: one `generate` call with
//! fixed generation parameters, returning candidates of text parts.
//! Transport failures are classified into [`TransportKind`] so the retry
//! engine can tell a flaky network from a caller error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BraidQLError, Result, TransportKind};

/// Fixed generation parameters for plan synthesis and validation.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct GenerationParams {
    /// Sampling temperature; low for consistent plans.
    pub temperature:       f32,
    /// Nucleus sampling mass.
    pub top_p:             f32,
    /// Top-k cutoff.
    pub top_k:             u32,
    /// Output token budget.
    pub max_output_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature:       0.1,
            top_p:             0.95,
            top_k:             40,
            max_output_tokens: 8192,
        }
    }
}

/// One text fragment of a candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    /// Text content; absent for non-text parts.
    #[serde(default)]
    pub text: Option<String>,
}

/// One model candidate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    /// Ordered content parts.
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Response shape shared by all transports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Candidates in model preference order.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Async text-generation transport.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    /// Generate content with the named model.
    ///
    /// # Errors
    ///
    /// Returns `ModelTransport` with the matching [`TransportKind`] on
    /// connection, timeout, I/O, overload, and status failures.
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GenerateResponse>;
}

/// Builds a transport bound to a caller's API key.
///
/// Platform-mode accounts share the configured key; BYO accounts get a
/// transport bound to their own.
pub trait TransportFactory: Send + Sync {
    /// Transport authenticated with `api_key`.
    fn for_key(&self, api_key: &str) -> Arc<dyn ModelTransport>;
}

// ============================================================================
// Gemini implementation
// ============================================================================

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Request timeout for one generate call.
const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct GeminiRequest<'a> {
    contents: [GeminiContent<'a>; 1],
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    parts: [GeminiTextPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiTextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentOut>,
}

#[derive(Deserialize)]
struct GeminiContentOut {
    #[serde(default)]
    parts: Vec<Part>,
}

/// Gemini `generateContent` transport over HTTPS.
pub struct GeminiTransport {
    http:    reqwest::Client,
    api_key: String,
}

impl GeminiTransport {
    /// Transport bound to one API key.
    #[must_use]
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }
}

#[async_trait]
impl ModelTransport for GeminiTransport {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<GenerateResponse> {
        let url = format!("{GEMINI_BASE_URL}/{model}:generateContent");
        let request = GeminiRequest {
            contents:          [GeminiContent {
                parts: [GeminiTextPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature:       params.temperature,
                top_p:             params.top_p,
                top_k:             params.top_k,
                max_output_tokens: params.max_output_tokens,
            },
        };

        debug!(model, prompt_len = prompt.len(), "calling model API");
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .timeout(GENERATE_TIMEOUT)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            let kind = classify_status(status.as_u16(), &body);
            return Err(BraidQLError::transport(
                kind,
                format!("model API returned {status}: {excerpt}"),
            ));
        }

        let parsed: GeminiResponse = response.json().await.map_err(map_reqwest_error)?;
        Ok(GenerateResponse {
            candidates: parsed
                .candidates
                .into_iter()
                .map(|c| Candidate {
                    parts: c.content.map(|content| content.parts).unwrap_or_default(),
                })
                .collect(),
        })
    }
}

/// Factory handing out Gemini transports over one shared HTTP client.
pub struct GeminiTransportFactory {
    http: reqwest::Client,
}

impl GeminiTransportFactory {
    /// Factory with its own connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for GeminiTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportFactory for GeminiTransportFactory {
    fn for_key(&self, api_key: &str) -> Arc<dyn ModelTransport> {
        Arc::new(GeminiTransport::new(self.http.clone(), api_key.to_string()))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> BraidQLError {
    let kind = if e.is_timeout() {
        TransportKind::Timeout
    } else if e.is_connect() {
        TransportKind::Connection
    } else {
        TransportKind::Io
    };
    BraidQLError::transport(kind, format!("model API call failed: {e}"))
}

fn classify_status(status: u16, body: &str) -> TransportKind {
    if status == 429 || status == 503 || body.to_lowercase().contains("overload") {
        TransportKind::Overloaded
    } else {
        TransportKind::Status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_generation_params() {
        let params = GenerationParams::default();
        assert!((params.temperature - 0.1).abs() < f32::EPSILON);
        assert!((params.top_p - 0.95).abs() < f32::EPSILON);
        assert_eq!(params.top_k, 40);
        assert_eq!(params.max_output_tokens, 8192);
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(429, ""), TransportKind::Overloaded);
        assert_eq!(classify_status(503, ""), TransportKind::Overloaded);
        assert_eq!(classify_status(500, "the model is overloaded"), TransportKind::Overloaded);
        assert_eq!(classify_status(400, "bad request"), TransportKind::Status);
    }

    #[test]
    fn test_response_deserializes_gemini_shape() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"hello"}]}}]}"#;
        let parsed: GeminiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
    }
}
