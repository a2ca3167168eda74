//! Machine Translation
//!
//! The match engine renders each phrase into the next speaker's language
//! through a [`Translator`]. Translation is best effort: callers go through
//! [`translate_or_keep`], which bounds the call with a timeout and falls back
//! to the untranslated text on any failure.

pub mod libre;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

pub use libre::LibreTranslator;

/// Translation errors. Never surfaced to players.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    /// Transport-level failure.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("backend returned status {0}")]
    Status(u16),

    /// Backend answer did not contain a translation.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Call exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// A text-in, text-out translation backend.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` into `target` (language tags such as `en`).
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError>;
}

/// Returns text unchanged. Used when no backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTranslator;

#[async_trait]
impl Translator for IdentityTranslator {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> Result<String, TranslateError> {
        Ok(text.to_string())
    }
}

/// Translate with a time budget, falling back to `text` on failure.
///
/// Empty text and same-language requests skip the backend entirely.
pub async fn translate_or_keep(
    translator: &dyn Translator,
    text: &str,
    source: &str,
    target: &str,
    timeout: Duration,
) -> String {
    if text.is_empty() || source.eq_ignore_ascii_case(target) {
        return text.to_string();
    }

    let result = match tokio::time::timeout(timeout, translator.translate(text, source, target)).await {
        Ok(result) => result,
        Err(_) => Err(TranslateError::Timeout(timeout)),
    };

    match result {
        Ok(translated) => {
            debug!(source, target, "translated {:?} -> {:?}", text, translated);
            translated
        }
        Err(e) => {
            warn!(source, target, "translation failed, keeping original text: {}", e);
            text.to_string()
        }
    }
}

/// Translation backend configuration.
#[derive(Clone, Debug, Default)]
pub struct TranslatorConfig {
    /// LibreTranslate-compatible endpoint (e.g. `http://localhost:5000/translate`).
    pub url: Option<String>,
    /// Optional API key sent as `api_key`.
    pub api_key: Option<String>,
}

impl TranslatorConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("TRANSLATE_URL").ok().filter(|v| !v.is_empty()),
            api_key: std::env::var("TRANSLATE_API_KEY").ok().filter(|v| !v.is_empty()),
        }
    }

    /// Build the configured backend, or [`IdentityTranslator`] if none is set.
    pub fn build(&self, timeout: Duration) -> Result<Arc<dyn Translator>, TranslateError> {
        match &self.url {
            Some(url) => Ok(Arc::new(LibreTranslator::new(url, self.api_key.clone(), timeout)?)),
            None => Ok(Arc::new(IdentityTranslator)),
        }
    }
}
