//! JSON-RPC client for the legacy JIRA RPC service.
//!
//! The legacy service exposes the same method set as the old SOAP endpoint
//! (`login`, `getIssue`, `getIssuesFromJqlSearch`, ...) through a JSON-RPC
//! facade. Every call is a POST of a JSON-RPC 2.0 envelope with positional
//! parameters.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use super::client::{build_http_client, error_from_response, normalize_base_url};
use super::error::{ApiError, Result};

/// Path of the JSON-RPC endpoint relative to the base URL.
const RPC_PATH: &str = "rpc/json-rpc/jirasoapservice-v2";

/// A remote procedure call transport.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// The normalized base URL of the JIRA instance.
    fn base_url(&self) -> &str;

    /// Invoke `method` with positional `params` and return its result.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value>;
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// The reqwest-backed JSON-RPC transport.
#[derive(Debug)]
pub struct JsonRpcClient {
    client: Client,
    base_url: String,
    endpoint: String,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Create a client for the RPC endpoint of the given instance.
    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = normalize_base_url(base_url);
        Ok(Self {
            client: build_http_client()?,
            endpoint: format!("{}/{}", base_url, RPC_PATH),
            base_url,
            next_id: AtomicU64::new(1),
        })
    }

    /// The full endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RpcTransport for JsonRpcClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self, params), fields(method = %method))]
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header(header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            debug!("RPC error response body: {}", body);
            return Err(error_from_response(status, &self.endpoint, &body));
        }

        decode_response(&body)
    }
}

/// Decode a JSON-RPC response body into its result or fault.
fn decode_response(body: &str) -> Result<Value> {
    let response: RpcResponse = serde_json::from_str(body)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse RPC response: {}", e)))?;

    if let Some(fault) = response.error {
        return Err(ApiError::fault(fault.code, &fault.message));
    }
    Ok(response.result.unwrap_or(Value::Null))
}
