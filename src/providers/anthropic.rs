use anyhow::{Context, Result, anyhow};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::Config;
use crate::model::Message;
use crate::providers::http_errors::model_api_request_error;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    message: String,
}

fn messages_url(base_url: &str) -> String {
    format!("{}/v1/messages", base_url.trim_end_matches('/'))
}

fn first_text(response: MessagesResponse) -> Result<String> {
    response
        .content
        .into_iter()
        .find_map(|block| block.text)
        .ok_or_else(|| anyhow!("Model response contained no text content"))
}

fn api_error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) if envelope.error.kind.is_empty() => {
            format!("{} {}", status, envelope.error.message)
        }
        Ok(envelope) => format!(
            "{} {}: {}",
            status, envelope.error.kind, envelope.error.message
        ),
        Err(_) => format!("{} {}", status, body.trim()),
    }
}

/// Sends the whole conversation to the Messages API and returns the first
/// text block of the reply.
pub async fn chat(
    client: &Client,
    cfg: &Config,
    api_key: &str,
    messages: &[Message],
) -> Result<String> {
    let api_url = messages_url(&cfg.api_base_url);
    let body = MessagesRequest {
        model: &cfg.model,
        max_tokens: cfg.max_tokens,
        messages,
    };
    debug!(
        api_url = %api_url,
        model = %cfg.model,
        message_count = messages.len(),
        "sending anthropic messages request"
    );

    let response = client
        .post(&api_url)
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            warn!(
                api_url = %api_url,
                model = %cfg.model,
                error = %err,
                "anthropic request failed"
            );
            model_api_request_error(err, &api_url, cfg.model_timeout_secs)
        })?;

    let status = response.status();
    if !status.is_success() {
        let response_body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read response body>".to_string());
        warn!(
            api_url = %api_url,
            model = %cfg.model,
            status = %status,
            response_body_len = response_body.len(),
            "anthropic returned non-success status"
        );
        return Err(anyhow!("{}", api_error_message(status, &response_body)));
    }

    let parsed: MessagesResponse = response
        .json()
        .await
        .context("Failed to parse model response")?;
    debug!(
        model = %cfg.model,
        block_count = parsed.content.len(),
        first_block = parsed.content.first().map(|block| block.kind.as_str()).unwrap_or(""),
        "received anthropic messages response"
    );
    first_text(parsed)
}
