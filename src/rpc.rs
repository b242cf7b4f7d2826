//! JSON-RPC access to an EVM node
//!
//! This module provides the small set of calls enrichment needs:
//! native balances and read-only contract calls.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy_primitives::U256;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// 1 native unit = 10^18 of the smallest unit (wei)
const WEI_PER_UNIT: u64 = 1_000_000_000_000_000_000;

/// JSON-RPC request structure
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Vec<Value>,
    id: u64,
}

/// JSON-RPC response structure
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Client bound to one RPC endpoint
#[derive(Debug)]
pub struct RpcClient {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: &str) -> Self {
        Self::with_client(url, reqwest::Client::new())
    }

    /// Reuse an existing HTTP client (and its connection pool)
    pub fn with_client(url: &str, http: reqwest::Client) -> Self {
        Self {
            url: url.to_string(),
            http,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send a request and return its `result`, `None` when the node sent none
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Option<Value>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} to {}", method, self.url))?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "RPC request failed with status: {}",
                response.status()
            ));
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse JSON response for {}", method))?;

        if let Some(error) = rpc_response.error {
            return Err(anyhow::anyhow!(
                "RPC error {}: {}",
                error.code,
                error.message
            ));
        }

        Ok(rpc_response.result.filter(|result| !result.is_null()))
    }

    /// Native balance in wei, `None` if the node returned no value
    pub async fn get_balance(&self, address: &str) -> Result<Option<U256>> {
        let result = self
            .call("eth_getBalance", vec![json!(address), json!("latest")])
            .await?;

        match result {
            Some(Value::String(hex)) => parse_hex_quantity(&hex).map(Some),
            Some(other) => Err(anyhow::anyhow!("Unexpected balance payload: {}", other)),
            None => Ok(None),
        }
    }

    /// Read-only contract call against the latest block
    pub async fn eth_call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>> {
        let call = json!({
            "to": to,
            "data": format!("0x{}", hex::encode(data)),
        });
        let result = self.call("eth_call", vec![call, json!("latest")]).await?;

        match result {
            Some(Value::String(hex)) => {
                hex::decode(hex.trim_start_matches("0x")).context("Failed to decode eth_call result")
            }
            Some(other) => Err(anyhow::anyhow!("Unexpected eth_call payload: {}", other)),
            None => Ok(Vec::new()),
        }
    }
}

/// Parse a hex quantity such as `0x1bc16d674ec80000`
pub fn parse_hex_quantity(hex_str: &str) -> Result<U256> {
    let digits = hex_str.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }

    U256::from_str_radix(digits, 16)
        .map_err(|e| anyhow::anyhow!("Failed to parse hex quantity {}: {}", hex_str, e))
}

/// Convert wei to a decimal string in whole native units
pub fn format_native(wei: U256) -> String {
    if wei.is_zero() {
        return "0".to_string();
    }

    let unit = U256::from(WEI_PER_UNIT);
    let whole = wei / unit;
    let fraction = wei % unit;

    if fraction.is_zero() {
        return whole.to_string();
    }

    // fraction < 10^18 always fits the low limb
    let fraction_str = format!("{:018}", fraction.as_limbs()[0]);
    let trimmed = fraction_str.trim_end_matches('0');

    format!("{}.{}", whole, trimmed)
}
