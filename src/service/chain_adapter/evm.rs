//! Etherscan 系浏览器 API（Etherscan / BscScan / PolygonScan / Arbiscan / Optimism）

use std::collections::HashSet;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use super::{ChainAdapter, TokenContract};
use crate::{
    config::EvmExplorerConfig, domain::chain::ChainId, error::AdapterError,
    infrastructure::upstream::UpstreamClient, utils::money::parse_units,
};

/// 单次拉取的代币转账记录上限
const TOKEN_TX_PAGE_SIZE: &str = "200";

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    #[serde(default)]
    message: String,
    result: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTransferEvent {
    contract_address: String,
    #[serde(default)]
    token_name: String,
    #[serde(default)]
    token_symbol: String,
    #[serde(default)]
    token_decimal: String,
}

pub struct EvmExplorerAdapter {
    chain: ChainId,
    http: UpstreamClient,
    base_url: String,
    api_key: Option<String>,
}

impl EvmExplorerAdapter {
    pub fn new(chain: ChainId, http: UpstreamClient, config: &EvmExplorerConfig) -> Self {
        Self {
            chain,
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn call(&self, params: &[(&str, &str)]) -> Result<ExplorerResponse, AdapterError> {
        let mut query = params.to_vec();
        if let Some(key) = &self.api_key {
            query.push(("apikey", key.as_str()));
        }
        self.http.get_json(&self.base_url, &query).await
    }

    /// status=1 时 result 为十进制最小单位字符串
    fn raw_amount(&self, resp: ExplorerResponse, decimals: u32) -> Result<Decimal, AdapterError> {
        if resp.status != "1" {
            return Err(AdapterError::Upstream(format!(
                "{}: {}",
                resp.message,
                resp.result.as_str().unwrap_or_default()
            )));
        }
        let raw = resp
            .result
            .as_str()
            .ok_or_else(|| AdapterError::Parse("balance result is not a string".into()))?;
        parse_units(raw, decimals)
            .ok_or_else(|| AdapterError::Parse(format!("invalid balance: {}", raw)))
    }
}

#[async_trait]
impl ChainAdapter for EvmExplorerAdapter {
    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn fetch_native_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let resp = self
            .call(&[
                ("module", "account"),
                ("action", "balance"),
                ("address", address),
                ("tag", "latest"),
            ])
            .await?;
        self.raw_amount(resp, self.chain.decimals())
    }

    fn supports_tokens(&self) -> bool {
        true
    }

    async fn fetch_token_transfers(&self, address: &str) -> Result<Vec<TokenContract>, AdapterError> {
        let resp = self
            .call(&[
                ("module", "account"),
                ("action", "tokentx"),
                ("address", address),
                ("page", "1"),
                ("offset", TOKEN_TX_PAGE_SIZE),
                ("sort", "desc"),
            ])
            .await?;

        if resp.status != "1" {
            // 无任何代币转账是正常情况
            if resp.message.starts_with("No transactions found") {
                return Ok(Vec::new());
            }
            return Err(AdapterError::Upstream(format!(
                "{}: {}",
                resp.message,
                resp.result.as_str().unwrap_or_default()
            )));
        }

        let events: Vec<TokenTransferEvent> = serde_json::from_value(resp.result)
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        // 先丢弃精度不可解析的记录再去重，同一合约的后续有效记录仍可入选
        let mut seen = HashSet::new();
        let contracts = events
            .into_iter()
            .filter_map(|e| {
                Some(TokenContract {
                    decimals: e.token_decimal.trim().parse().ok()?,
                    contract_address: e.contract_address,
                    symbol: e.token_symbol,
                    name: e.token_name,
                })
            })
            .filter(|c| seen.insert(c.contract_address.to_lowercase()))
            .collect();
        Ok(contracts)
    }

    async fn fetch_token_balance(
        &self,
        address: &str,
        token: &TokenContract,
    ) -> Result<Decimal, AdapterError> {
        let resp = self
            .call(&[
                ("module", "account"),
                ("action", "tokenbalance"),
                ("contractaddress", token.contract_address.as_str()),
                ("address", address),
                ("tag", "latest"),
            ])
            .await?;
        self.raw_amount(resp, token.decimals)
    }
}
