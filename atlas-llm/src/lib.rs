//! Text-generation integration for Atlas.
//!
//! This crate exposes the [`traits::LlmClient`] interface the geocoding
//! pipeline treats as an opaque, failable collaborator, and a Gemini
//! implementation. [`ensure_llm_ready`] builds a client from
//! [`atlas_common::LlmSettings`].
//!
//! # Examples
//! ```no_run
//! use atlas_common::{LlmSettings, Result};
//! use atlas_llm::ensure_llm_ready;
//!
//! # fn main() -> Result<()> {
//! let client = ensure_llm_ready(&LlmSettings::default())?;
//! assert!(!client.model_name().is_empty());
//! # Ok(())
//! # }
//! ```
pub mod gemini;
pub mod traits;

use atlas_common::{AtlasError, LlmSettings};
use gemini::GeminiClient;
use std::sync::Arc;
use traits::LlmClient;

/// Build the configured LLM client.
pub fn ensure_llm_ready(
    settings: &LlmSettings,
) -> atlas_common::Result<Arc<dyn LlmClient + Send + Sync + 'static>> {
    match settings {
        LlmSettings::Gemini {
            api_key,
            model,
            base_url,
            temperature,
            max_tokens,
        } => {
            let api_key = api_key
                .clone()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    AtlasError::Config(
                        "GEMINI_API_KEY not set; provide llm.api_key or the GEMINI_API_KEY variable"
                            .to_string(),
                    )
                })?;
            let client = GeminiClient::new(api_key, model.clone())?
                .with_base_url(base_url.clone())
                .with_defaults(*temperature, *max_tokens);
            Ok(Arc::new(client))
        }
        LlmSettings::None => Err(AtlasError::Config("No LLM configured".to_string())),
    }
}
