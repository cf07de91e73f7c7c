//! Client-side transport boundary toward the proxy endpoints.

use std::pin::Pin;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::session::HistoryTurn;

/// Byte chunks of an in-flight response, in wire order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// What the conversation session needs from the network.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Submit a prompt and return the live response byte stream.
    async fn send_prompt(
        &self,
        prompt: &str,
        user_id: &str,
        node_id: &str,
        run_id: &str,
    ) -> Result<ByteStream>;

    /// Fetch prior turns for a run, oldest first.
    async fn fetch_history(
        &self,
        user_id: &str,
        node_id: &str,
        run_id: &str,
    ) -> Result<Vec<HistoryTurn>>;
}

/// Transport speaking to a running chatrelay proxy over HTTP.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn send_prompt(
        &self,
        prompt: &str,
        user_id: &str,
        node_id: &str,
        run_id: &str,
    ) -> Result<ByteStream> {
        let body = serde_json::json!({
            "prompt": prompt,
            "user_id": user_id,
            "node_id": node_id,
            "run_id": run_id,
            "stream": 1,
        });

        let response = self
            .http
            .post(self.endpoint("/send-prompt"))
            .json(&body)
            .send()
            .await
            .context("sending prompt to proxy")?;

        if !response.status().is_success() {
            bail!("server error: {}", response.status().as_u16());
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.context("reading response stream"));
        Ok(Box::pin(stream))
    }

    async fn fetch_history(
        &self,
        user_id: &str,
        node_id: &str,
        run_id: &str,
    ) -> Result<Vec<HistoryTurn>> {
        let body = serde_json::json!({
            "user_id": user_id,
            "node_id": node_id,
            "run_id": run_id,
        });

        let response = self
            .http
            .post(self.endpoint("/get-history"))
            .json(&body)
            .send()
            .await
            .context("fetching history from proxy")?;

        if !response.status().is_success() {
            bail!("history request failed: {}", response.status().as_u16());
        }

        let payload: serde_json::Value = response.json().await.context("parsing history body")?;

        // Only a well-formed success payload carries turns; anything else
        // restores as an empty history.
        if payload.get("status").and_then(|s| s.as_str()) != Some("success") {
            return Ok(Vec::new());
        }
        match payload.get("memory") {
            Some(memory) if memory.is_array() => {
                serde_json::from_value(memory.clone()).context("parsing history turns")
            }
            _ => Ok(Vec::new()),
        }
    }
}
