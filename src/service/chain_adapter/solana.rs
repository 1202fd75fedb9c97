//! Solana JSON-RPC `getBalance`（lamports）

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::ChainAdapter;
use crate::{
    domain::chain::ChainId,
    error::AdapterError,
    infrastructure::upstream::{JsonRpcRequest, UpstreamClient},
    utils::money::units_to_decimal,
};

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<BalanceResult>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    value: u64,
}

pub struct SolanaAdapter {
    http: UpstreamClient,
    rpc_url: String,
}

impl SolanaAdapter {
    pub fn new(http: UpstreamClient, rpc_url: &str) -> Self {
        Self {
            http,
            rpc_url: rpc_url.to_string(),
        }
    }
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
    fn chain(&self) -> ChainId {
        ChainId::Solana
    }

    async fn fetch_native_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let request = JsonRpcRequest::new("getBalance", [address]);
        let resp: RpcResponse = self.http.post_json(&self.rpc_url, &request).await?;

        if let Some(err) = resp.error {
            return Err(AdapterError::Upstream(err.to_string()));
        }
        let lamports = resp
            .result
            .ok_or_else(|| AdapterError::Parse("missing result".into()))?
            .value;

        units_to_decimal(lamports as u128, ChainId::Solana.decimals())
            .ok_or_else(|| AdapterError::Parse(format!("invalid lamports: {}", lamports)))
    }
}
