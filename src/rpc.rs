//! Latest block lookup against the configured JSON-RPC node.
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

/// `eth_blockNumber` as an integer.
///
/// Any failure (transport, HTTP status, RPC error, bad hex) is logged and
/// reported as `None`: callers must read that as "unavailable", not zero.
pub fn latest_block_number(rpc_url: &str, timeout: Duration) -> Option<u64> {
    match fetch_latest_block_number(rpc_url, timeout) {
        Ok(block) => {
            tracing::info!(block, "latest block number");
            Some(block)
        }
        Err(err) => {
            tracing::warn!(rpc_url, error = %format!("{err:#}"), "error fetching latest block");
            None
        }
    }
}

fn fetch_latest_block_number(rpc_url: &str, timeout: Duration) -> Result<u64> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into();
    let payload = json!({
        "jsonrpc": "2.0",
        "method": "eth_blockNumber",
        "params": [],
        "id": 1,
    });
    let mut response = agent
        .post(rpc_url)
        .send_json(&payload)
        .with_context(|| format!("POST eth_blockNumber to {rpc_url}"))?;
    let body: RpcResponse = response
        .body_mut()
        .read_json()
        .context("decode JSON-RPC response")?;
    block_number_from_response(body)
}

fn block_number_from_response(body: RpcResponse) -> Result<u64> {
    if let Some(result) = body.result {
        return parse_hex_quantity(&result);
    }
    match body.error {
        Some(error) => Err(anyhow!("RPC error: {error}")),
        None => Err(anyhow!("RPC response has neither result nor error")),
    }
}

/// Parse an Ethereum hex quantity such as `0x1b4`.
pub fn parse_hex_quantity(raw: &str) -> Result<u64> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if digits.is_empty() {
        return Err(anyhow!("empty hex quantity {raw:?}"));
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("parse hex quantity {raw:?}"))
}
