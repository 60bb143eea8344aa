//! Model interaction: send the extraction prompt and return raw text.
//!
//! This module is intentionally thin — all prompt engineering lives in
//! [`crate::prompts`] so it can be changed without touching retry or
//! error-handling logic here. The core treats the exchange purely as
//! `string -> string`: whatever comes back goes straight into the repair
//! engine, untrusted.
//!
//! ## Retry Strategy
//!
//! Rate-limit and 5xx errors from LLM APIs are transient. Conversions run
//! sequentially, so a fixed pause between attempts is enough; with the
//! default 2 s delay and 2 retries a flaky endpoint costs at most 4 s of
//! waiting per document before the failure escalates.

use crate::config::ConversionConfig;
use crate::error::ConvertError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Raw model response plus the token accounting the provider reported.
#[derive(Debug, Clone)]
pub struct ExtractionResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Attempts consumed, 1 when the first try succeeded.
    pub attempts: u32,
}

/// Send one extraction prompt for a document and return the raw text blob.
///
/// Retries transient failures up to `config.max_retries` times with a fixed
/// delay, then escalates to [`ConvertError::ModelCallFailure`]. The response
/// is returned as-is — no parsing happens here.
pub async fn request_extraction(
    provider: &Arc<dyn LLMProvider>,
    identity: &str,
    prompt: &str,
    config: &ConversionConfig,
) -> Result<ExtractionResponse, ConvertError> {
    let messages = vec![ChatMessage::user(prompt)];
    let options = build_options(config);

    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            warn!(
                "'{}': retry {}/{} after {}ms",
                identity, attempt, config.max_retries, config.retry_backoff_ms
            );
            sleep(Duration::from_millis(config.retry_backoff_ms)).await;
        }

        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "'{}': {} input tokens, {} output tokens",
                    identity, response.prompt_tokens, response.completion_tokens
                );
                return Ok(ExtractionResponse {
                    text: response.content,
                    input_tokens: response.prompt_tokens as u32,
                    output_tokens: response.completion_tokens as u32,
                    attempts: attempt + 1,
                });
            }
            Err(e) => {
                let err_msg = format!("{}", e);
                warn!("'{}': attempt {} failed — {}", identity, attempt + 1, err_msg);
                last_err = Some(err_msg);
            }
        }
    }

    Err(ConvertError::ModelCallFailure {
        attempts: config.max_retries + 1,
        detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
    })
}

/// Build `CompletionOptions` from the conversion config.
fn build_options(config: &ConversionConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ConversionConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(16384));
    }
}
