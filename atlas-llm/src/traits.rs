use async_trait::async_trait;
use atlas_common::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

/// Per-call knobs. `None` fields fall back to the client's configuration.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    /// Model override for this call only.
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl GenerationOptions {
    pub fn with_model(model: Option<String>) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }
}

/// The text-generation collaborator.
///
/// Implementations wrap every transport, auth, or provider failure into
/// [`atlas_common::AtlasError::Generation`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response to `prompt` under the given system prompt.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        options: &GenerationOptions,
    ) -> Result<LlmResponse>;

    /// Check if the LLM service is available
    async fn health_check(&self) -> Result<bool> {
        let options = GenerationOptions {
            max_tokens: Some(5),
            temperature: Some(0.1),
            ..GenerationOptions::default()
        };
        match self
            .generate("Respond with just 'OK'", None, &options)
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!(model = self.model_name(), error = %e, "llm.health_check.failed");
                Ok(false)
            }
        }
    }

    /// Get the default model name being used
    fn model_name(&self) -> &str;
}
