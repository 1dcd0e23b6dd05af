//! LLM gateway client.
//!
//! Talks to a Gemini-style API (directly or through an AI gateway proxy)
//! for the three model-backed pipeline stages: multimodal text
//! extraction, batch embeddings, and chat synthesis of the audit report.
//!
//! Documents are sent inline as base64 `inlineData`, so no local
//! OCR/parsing libraries are needed.
//!
//! # Retry Strategy
//!
//! Transient errors are retried with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! # Environment Variables
//!
//! - `AUDITOR_GATEWAY_API_KEY` — bearer token for the gateway, required.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::Engine;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::GatewayConfig;

const EXTRACTION_PROMPT: &str = "Extract all readable text and tabular data from this document \
as UTF-8 plain text. Preserve row/column order where possible. Include all text content, \
tables, headers, and footers. Do not add any commentary or explanation, just return the \
extracted text.";

/// Client for the LLM gateway.
pub struct GatewayClient {
    config: GatewayConfig,
    api_key: String,
    client: reqwest::Client,
}

impl GatewayClient {
    /// Create a client from configuration, reading the API key from the
    /// environment.
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let api_key = std::env::var("AUDITOR_GATEWAY_API_KEY")
            .context("AUDITOR_GATEWAY_API_KEY environment variable not set")?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }

    /// Extract text from a document using the model's multimodal input.
    ///
    /// Returns the concatenated text parts of the first candidate, or an
    /// empty string when the response carries none.
    pub async fn extract_text(&self, file_bytes: &[u8], mime_type: &str) -> Result<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(file_bytes);

        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": EXTRACTION_PROMPT },
                    { "inlineData": { "mimeType": mime_type, "data": encoded } },
                ],
            }],
            "generationConfig": {
                // Low temperature for consistent extraction.
                "temperature": 0.1,
                "maxOutputTokens": 8192,
            },
        });

        info!(bytes = file_bytes.len(), mime_type, "extracting text");

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url(),
            self.config.chat_model
        );
        let response = self.post_with_retry(&url, &body).await?;
        let text = candidate_text(&response);
        info!(chars = text.len(), "text extraction complete");
        Ok(text)
    }

    /// Generate embeddings for a batch of texts, in input order.
    pub async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let requests: Vec<Value> = texts
            .iter()
            .map(|text| {
                json!({
                    "model": format!("models/{}", self.config.embed_model),
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();

        let url = format!(
            "{}/models/{}:batchEmbedContents",
            self.base_url(),
            self.config.embed_model
        );
        let response = self
            .post_with_retry(&url, &json!({ "requests": requests }))
            .await?;

        let mut embeddings = Vec::new();
        if let Some(entries) = response["embeddings"].as_array() {
            for entry in entries {
                if let Some(values) = entry["values"].as_array() {
                    let vector: Vec<f32> = values
                        .iter()
                        .filter_map(|v| v.as_f64())
                        .map(|v| v as f32)
                        .collect();
                    if !vector.is_empty() {
                        embeddings.push(vector);
                    }
                }
            }
        }

        info!(count = embeddings.len(), "generated embeddings");
        Ok(embeddings)
    }

    /// Send a chat prompt and return the model's text response.
    pub async fn chat(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": {
                "temperature": 0.3,
                "maxOutputTokens": 8192,
            },
        });

        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url(),
            self.config.chat_model
        );
        let response = self.post_with_retry(&url, &body).await?;
        Ok(candidate_text(&response))
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// POST a JSON body with exponential-backoff retry for transient
    /// failures.
    async fn post_with_retry(&self, url: &str, body: &Value) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.context("invalid gateway response");
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("gateway error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("gateway error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("gateway request failed: {}", e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("gateway retries exhausted")))
    }
}

/// Pull the text out of a `generateContent` response: the text parts of
/// the first candidate, joined with spaces and trimmed. Missing
/// candidates or parts yield an empty string rather than an error.
fn candidate_text(response: &Value) -> String {
    let parts = match response["candidates"]
        .get(0)
        .map(|c| &c["content"]["parts"])
        .and_then(|p| p.as_array())
    {
        Some(parts) => parts,
        None => {
            warn!("no candidates in gateway response");
            return String::new();
        }
    };

    parts
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_text_joins_parts() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello" }, { "text": "world " }] }
            }]
        });
        assert_eq!(candidate_text(&response), "hello world");
    }

    #[test]
    fn test_candidate_text_empty_response() {
        assert_eq!(candidate_text(&json!({})), "");
        assert_eq!(candidate_text(&json!({ "candidates": [] })), "");
    }

    #[test]
    fn test_candidate_text_ignores_non_text_parts() {
        let response = json!({
            "candidates": [{
                "content": { "parts": [{ "inlineData": {} }, { "text": "only this" }] }
            }]
        });
        assert_eq!(candidate_text(&response), "only this");
    }
}
