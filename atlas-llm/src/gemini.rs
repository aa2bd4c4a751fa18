//! Gemini `generateContent` over REST.
//!
//! Only the parts of the wire format the geocoding request needs are modelled:
//! one user turn, an optional system instruction, and the sampling knobs.
use crate::traits::{GenerationOptions, LlmClient, LlmResponse};
use async_trait::async_trait;
use atlas_common::{AtlasError, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContentRequest<'a> {
    contents: [Turn<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Instruction<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Sampling>,
}

#[derive(Debug, Serialize)]
struct Turn<'a> {
    role: &'static str,
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Instruction<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Sampling {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContentReply {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Debug, Deserialize)]
struct ReplyPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Usage {
    total_token_count: Option<u32>,
}

impl ContentReply {
    /// Text of the first candidate, all parts concatenated.
    fn into_text(self) -> Result<(String, Option<u32>)> {
        let tokens = self.usage_metadata.and_then(|u| u.total_token_count);
        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| generation("Gemini returned no candidates"))?;

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(generation("Gemini safety filters blocked the response"));
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            return Err(generation("Gemini candidate had no text"));
        }
        Ok((text, tokens))
    }
}

fn generation(message: impl Into<String>) -> AtlasError {
    AtlasError::Generation(message.into())
}

fn status_error(status: StatusCode, body: &str) -> AtlasError {
    match status {
        StatusCode::UNAUTHORIZED => generation("Invalid API key"),
        StatusCode::FORBIDDEN => generation("API access forbidden"),
        StatusCode::TOO_MANY_REQUESTS => generation("Rate limit exceeded"),
        _ => generation(format!("Gemini API error ({status}): {body}")),
    }
}

/// Google Gemini client. The API key is sent as a header and never logged.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    defaults: GenerationOptions,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AtlasError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
            defaults: GenerationOptions::default(),
        })
    }

    /// Point the client at a different API root (gateways, test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Temperature and token cap applied when a call leaves them unset.
    pub fn with_defaults(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.defaults.temperature = temperature;
        self.defaults.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent", self.base_url)
    }

    fn sampling(&self, options: &GenerationOptions) -> Option<Sampling> {
        let temperature = options.temperature.or(self.defaults.temperature);
        let max_output_tokens = options.max_tokens.or(self.defaults.max_tokens);
        (temperature.is_some() || max_output_tokens.is_some()).then_some(Sampling {
            temperature,
            max_output_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LlmResponse> {
        let model = options.model.as_deref().unwrap_or(&self.model);
        let request = ContentRequest {
            contents: [Turn {
                role: "user",
                parts: [TextPart { text: prompt }],
            }],
            system_instruction: system_prompt.map(|text| Instruction {
                parts: [TextPart { text }],
            }),
            generation_config: self.sampling(options),
        };

        tracing::debug!(target: "llm.gemini", model, prompt_chars = prompt.len(), "llm.gemini.request");
        let resp = self
            .http
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| generation(format!("Gemini request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(target: "llm.gemini", model, %status, "llm.gemini.http_error");
            return Err(status_error(status, &body));
        }

        let reply: ContentReply = resp
            .json()
            .await
            .map_err(|e| generation(format!("unreadable Gemini response: {e}")))?;
        let (text, tokens_used) = reply.into_text()?;
        tracing::debug!(target: "llm.gemini", model, chars = text.len(), tokens_used, "llm.gemini.reply");

        Ok(LlmResponse {
            text,
            model: Some(model.to_string()),
            tokens_used,
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
