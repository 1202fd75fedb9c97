//! Bitcoin：Blockstream/Esplora 风格接口

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;

use super::ChainAdapter;
use crate::{
    domain::chain::ChainId, error::AdapterError, infrastructure::upstream::UpstreamClient,
    utils::money::units_to_decimal,
};

#[derive(Debug, Default, Deserialize)]
struct TxoStats {
    #[serde(default)]
    funded_txo_sum: u64,
    #[serde(default)]
    spent_txo_sum: u64,
}

impl TxoStats {
    fn net(&self) -> i128 {
        self.funded_txo_sum as i128 - self.spent_txo_sum as i128
    }
}

#[derive(Debug, Deserialize)]
struct AddressStats {
    #[serde(default)]
    chain_stats: TxoStats,
    #[serde(default)]
    mempool_stats: TxoStats,
}

pub struct BitcoinAdapter {
    http: UpstreamClient,
    base_url: String,
}

impl BitcoinAdapter {
    pub fn new(http: UpstreamClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChainAdapter for BitcoinAdapter {
    fn chain(&self) -> ChainId {
        ChainId::Bitcoin
    }

    async fn fetch_native_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let url = format!("{}/address/{}", self.base_url, address);
        let stats: AddressStats = self.http.get_json(&url, &[]).await?;

        // 已确认 + 未确认（satoshi），负值（未确认花费先于入账）按 0 处理
        let sats = (stats.chain_stats.net() + stats.mempool_stats.net()).max(0) as u128;
        units_to_decimal(sats, ChainId::Bitcoin.decimals())
            .ok_or_else(|| AdapterError::Parse(format!("invalid satoshi amount: {}", sats)))
    }
}
