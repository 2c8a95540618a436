use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::rate_limit::{Cancelled, RateLimit};

pub const JSONRPC_VERSION: &str = "2.0";

/// Requests are issued one at a time, so a constant id is enough to pair a
/// response with its request.
const REQUEST_ID: u64 = 1;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to send RPC request: {0}")]
    Request(#[from] reqwest::Error),
    #[error(transparent)]
    RateLimit(#[from] Cancelled),
    #[error("RPC endpoint answered with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Failed to decode RPC response envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    #[serde(skip_serializing_if = "no_params")]
    params: &'a [Value],
}

fn no_params(params: &&[Value]) -> bool {
    params.is_empty()
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Sends single JSON-RPC requests over HTTP. Every request first takes a
/// token from the transport's [RateLimit].
#[derive(Debug)]
pub struct RpcTransport {
    client: Client,
    url: String,
    rate_limit: RateLimit,
    cancel: CancellationToken,
}

impl RpcTransport {
    /// `timeout` bounds each HTTP round-trip. It does not cover the time
    /// spent waiting on the rate limiter, which only `cancel` can interrupt.
    pub fn new(
        url: impl Into<String>,
        timeout: Duration,
        rate_limit: RateLimit,
        cancel: CancellationToken,
    ) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url: url.into(),
            rate_limit,
            cancel,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Calls `method` with positional `params` and returns the untyped
    /// `result` member of the response. A `null` result is returned as
    /// [Value::Null]; interpreting it is up to the caller.
    pub async fn call(
        &self,
        method: &str,
        params: &[Value],
    ) -> Result<Value, TransportError> {
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION,
            id: REQUEST_ID,
            method,
            params,
        };
        let body =
            serde_json::to_vec(&request).map_err(TransportError::Envelope)?;

        self.rate_limit.acquire(&self.cancel).await?;

        tracing::trace!(method, url = %self.url, "Sending RPC request");

        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        let envelope: RpcResponse =
            serde_json::from_slice(&bytes).map_err(TransportError::Envelope)?;

        if let Some(error) = envelope.error {
            return Err(TransportError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        Ok(envelope.result)
    }
}
