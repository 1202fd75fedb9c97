//! Cardano：Koios `POST /address_info`（lovelace）

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ChainAdapter;
use crate::{
    domain::chain::ChainId, error::AdapterError, infrastructure::upstream::UpstreamClient,
    utils::money::parse_units,
};

#[derive(Serialize)]
struct AddressInfoRequest<'a> {
    #[serde(rename = "_addresses")]
    addresses: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct AddressInfo {
    #[serde(default)]
    balance: Option<String>,
}

pub struct CardanoAdapter {
    http: UpstreamClient,
    base_url: String,
}

impl CardanoAdapter {
    pub fn new(http: UpstreamClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ChainAdapter for CardanoAdapter {
    fn chain(&self) -> ChainId {
        ChainId::Cardano
    }

    async fn fetch_native_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let url = format!("{}/address_info", self.base_url);
        let body = AddressInfoRequest {
            addresses: [address],
        };
        let infos: Vec<AddressInfo> = self.http.post_json(&url, &body).await?;

        // 从未使用过的地址返回空数组
        let Some(balance) = infos.into_iter().next().and_then(|i| i.balance) else {
            return Ok(Decimal::ZERO);
        };
        parse_units(&balance, ChainId::Cardano.decimals())
            .ok_or_else(|| AdapterError::Parse(format!("invalid lovelace: {}", balance)))
    }
}
