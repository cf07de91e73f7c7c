//! HTTP client for the upstream conversational API.
//!
//! The bearer token lives only on this side of the proxy; it is attached
//! to every outbound request and never surfaced to callers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const SEND_PROMPT_PATH: &str = "/api/v2/send-prompt";
const GET_HISTORY_PATH: &str = "/api/v2/get-history";

/// Default upstream endpoint when no override is configured.
pub const DEFAULT_BASE_URL: &str = "https://cnx.thaigpt.com";

#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream answered with a non-success status. The message is a
    /// best-effort extraction from the response body.
    #[error("{message}")]
    Status { status: StatusCode, message: String },

    /// The request never completed (connect failure, body read error,
    /// malformed JSON on a buffered response).
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Request body for the send-prompt endpoint. Also the wire shape the
/// proxy accepts from its own callers, so defaults match the public
/// contract: `message_id` 0, `webhook_url` empty, `stream` 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendPromptRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub node_id: String,
    #[serde(default)]
    pub message_id: u64,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub run_id: String,
    #[serde(default = "default_stream")]
    pub stream: u8,
}

fn default_stream() -> u8 {
    1
}

impl SendPromptRequest {
    pub fn wants_stream(&self) -> bool {
        self.stream == 1
    }
}

/// A successful upstream reply: either a buffered JSON body or a live
/// byte stream the caller relays chunk by chunk.
pub enum UpstreamReply {
    Json(Value),
    Stream(reqwest::Response),
}

/// Client for the upstream API. Cheap to clone; the inner reqwest client
/// shares its connection pool.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl UpstreamClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }

    /// Send a prompt. With `stream = 1` the response body is returned
    /// live; otherwise it is buffered and parsed as JSON.
    pub async fn send_prompt(
        &self,
        request: &SendPromptRequest,
    ) -> Result<UpstreamReply, UpstreamError> {
        let response = self
            .http
            .post(self.endpoint(SEND_PROMPT_PATH))
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        if request.wants_stream() {
            Ok(UpstreamReply::Stream(response))
        } else {
            Ok(UpstreamReply::Json(response.json().await?))
        }
    }

    /// Fetch prior turns for a run. Returns the upstream JSON body
    /// verbatim; callers mirror it to their own clients.
    pub async fn get_history(
        &self,
        user_id: &str,
        node_id: &str,
        run_id: &str,
    ) -> Result<Value, UpstreamError> {
        let body = serde_json::json!({
            "user_id": user_id,
            "node_id": node_id,
            "run_id": run_id,
        });

        let response = self
            .http
            .post(self.endpoint(GET_HISTORY_PATH))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }

        Ok(response.json().await?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Build a mirrored error from a non-success response, extracting the
    /// body's `message` field when the body parses as JSON.
    async fn status_error(response: reqwest::Response) -> UpstreamError {
        let status = response.status();
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| {
                body.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| format!("API request failed with status {}", status.as_u16()));

        UpstreamError::Status { status, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_defaults_on() {
        let request: SendPromptRequest = serde_json::from_str(
            r#"{"prompt":"hi","user_id":"u","node_id":"n","run_id":"r"}"#,
        )
        .unwrap();
        assert!(request.wants_stream());
        assert_eq!(request.message_id, 0);
        assert_eq!(request.webhook_url, "");
    }

    #[test]
    fn test_stream_opt_out() {
        let request: SendPromptRequest =
            serde_json::from_str(r#"{"prompt":"hi","stream":0}"#).unwrap();
        assert!(!request.wants_stream());
    }

    #[test]
    fn test_endpoint_joins_without_double_slash() {
        let client = UpstreamClient::new("https://example.com/", "tok");
        assert_eq!(
            client.endpoint(SEND_PROMPT_PATH),
            "https://example.com/api/v2/send-prompt"
        );
    }
}
