//! LibreTranslate Client
//!
//! Posts `q`, `source`, `target` and `format=text` as a form to a
//! LibreTranslate-compatible endpoint and reads `translatedText` from the
//! JSON reply.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{TranslateError, Translator};

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(rename = "translatedText")]
    translated_text: Option<String>,
    error: Option<String>,
}

/// HTTP translator for LibreTranslate.
#[derive(Debug, Clone)]
pub struct LibreTranslator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl LibreTranslator {
    /// Create a client for `url` with a per-request timeout.
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
        })
    }

    /// Endpoint this client posts to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Extract the translation from a response body.
pub fn parse_response(body: &str) -> Result<String, TranslateError> {
    let parsed: TranslateResponse = serde_json::from_str(body)
        .map_err(|e| TranslateError::MalformedResponse(e.to_string()))?;

    match (parsed.translated_text, parsed.error) {
        (Some(text), _) => Ok(text),
        (None, Some(error)) => Err(TranslateError::MalformedResponse(error)),
        (None, None) => Err(TranslateError::MalformedResponse(
            "missing translatedText".to_string(),
        )),
    }
}

#[async_trait]
impl Translator for LibreTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> Result<String, TranslateError> {
        let mut form = vec![
            ("q", text),
            ("source", source),
            ("target", target),
            ("format", "text"),
        ];
        if let Some(key) = &self.api_key {
            form.push(("api_key", key.as_str()));
        }

        let response = self.client.post(&self.url).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TranslateError::Status(status.as_u16()));
        }
        parse_response(&body)
    }
}
