//! Remote streaming provider for the Anthropic Messages API.
//!
//! Server-sent events: text arrives in `content_block_delta` events, token
//! usage in `message_start` / `message_delta`. The whole stream is bounded
//! by one end-to-end timeout.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::error::LlmError;
use crate::llm::provider::{Provider, ProviderRequest};
use crate::llm::streaming;
use crate::llm::types::TokenUsage;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    stream_timeout_secs: u64,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, stream_timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            stream_timeout_secs,
        }
    }

    async fn stream(
        &self,
        req: ProviderRequest,
        chunks: mpsc::Sender<String>,
    ) -> Result<TokenUsage, LlmError> {
        let fut = self.stream_inner(req, chunks);
        match tokio::time::timeout(
            std::time::Duration::from_secs(self.stream_timeout_secs),
            fut,
        )
        .await
        {
            Ok(res) => res,
            Err(_) => Err(LlmError::StreamTimeout { seconds: self.stream_timeout_secs }),
        }
    }

    async fn stream_inner(
        &self,
        req: ProviderRequest,
        chunks: mpsc::Sender<String>,
    ) -> Result<TokenUsage, LlmError> {
        let started = std::time::Instant::now();

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&serde_json::json!({
                "model": self.model,
                "max_tokens": req.max_tokens,
                "stream": true,
                "system": req.system_prompt,
                "messages": [{"role": "user", "content": req.user_message}]
            }))
            .send()
            .await
            .map_err(LlmError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet = body.chars().take(200).collect::<String>();
            tracing::error!(status = status.as_u16(), body = %snippet, "anthropic api error");
            return Err(LlmError::HttpStatus { status: status.as_u16(), body_snippet: snippet });
        }

        tracing::debug!(ttfb_ms = started.elapsed().as_millis() as u64, "anthropic stream open");

        let mut usage = TokenUsage::default();
        let mut sse_buffer = String::new();
        let mut ttft_logged = false;

        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(LlmError::StreamInterrupted)?;
            sse_buffer.push_str(&String::from_utf8_lossy(&chunk));

            for (event_type, data) in streaming::parse_sse_events(&mut sse_buffer) {
                match event_type.as_str() {
                    "content_block_delta" => {
                        if let Some(delta) = extract_text_delta(&data) {
                            if !ttft_logged && !delta.is_empty() {
                                tracing::info!(
                                    ttft_ms = started.elapsed().as_millis() as u64,
                                    "first token"
                                );
                                ttft_logged = true;
                            }
                            if chunks.send(delta).await.is_err() {
                                // Receiver gone: session cancelled.
                                return Ok(usage);
                            }
                        }
                    }
                    "message_start" => {
                        if let Some(n) = extract_usage_field(&data, "input_tokens") {
                            usage.input_tokens = n;
                        }
                    }
                    "message_delta" => {
                        if let Some(n) = extract_usage_field(&data, "output_tokens") {
                            usage.output_tokens = n;
                        }
                    }
                    _ => {}
                }
            }
        }

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "anthropic stream complete"
        );
        Ok(usage)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn label(&self) -> &str {
        "anthropic"
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn stream_classify(
        &self,
        req: ProviderRequest,
        chunks: mpsc::Sender<String>,
    ) -> Result<TokenUsage, LlmError> {
        self.stream(req, chunks).await
    }

    async fn stream_execute(
        &self,
        req: ProviderRequest,
        chunks: mpsc::Sender<String>,
    ) -> Result<TokenUsage, LlmError> {
        self.stream(req, chunks).await
    }
}

/// Text delta from a `content_block_delta` SSE payload.
fn extract_text_delta(data: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(data).ok()?;
    json["delta"]["text"].as_str().map(|s| s.to_string())
}

/// Usage counter from a `message_start` / `message_delta` payload; the field
/// nests under either `message.usage` or `usage`.
fn extract_usage_field(data: &str, field: &str) -> Option<u64> {
    let json: serde_json::Value = serde_json::from_str(data).ok()?;
    json["message"]["usage"][field]
        .as_u64()
        .or_else(|| json["usage"][field].as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_extraction() {
        let data = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"{\"content"}}"#;
        assert_eq!(extract_text_delta(data).as_deref(), Some("{\"content"));
        assert!(extract_text_delta("not json").is_none());
    }

    #[test]
    fn usage_extraction_both_nestings() {
        let start = r#"{"message":{"usage":{"input_tokens":321}}}"#;
        assert_eq!(extract_usage_field(start, "input_tokens"), Some(321));
        let delta = r#"{"usage":{"output_tokens":45}}"#;
        assert_eq!(extract_usage_field(delta, "output_tokens"), Some(45));
    }
}
