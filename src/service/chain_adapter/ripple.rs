//! XRP Ledger JSON-RPC `account_info`（drops）

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ChainAdapter;
use crate::{
    domain::chain::ChainId, error::AdapterError, infrastructure::upstream::UpstreamClient,
    utils::money::parse_units,
};

#[derive(Serialize)]
struct AccountInfoRequest<'a> {
    method: &'static str,
    params: [AccountInfoParams<'a>; 1],
}

#[derive(Serialize)]
struct AccountInfoParams<'a> {
    account: &'a str,
    ledger_index: &'static str,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResponse {
    result: AccountInfoResult,
}

#[derive(Debug, Deserialize)]
struct AccountInfoResult {
    #[serde(default)]
    account_data: Option<AccountData>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    #[serde(rename = "Balance")]
    balance: String,
}

pub struct RippleAdapter {
    http: UpstreamClient,
    rpc_url: String,
}

impl RippleAdapter {
    pub fn new(http: UpstreamClient, rpc_url: &str) -> Self {
        Self {
            http,
            rpc_url: rpc_url.to_string(),
        }
    }
}

#[async_trait]
impl ChainAdapter for RippleAdapter {
    fn chain(&self) -> ChainId {
        ChainId::Ripple
    }

    async fn fetch_native_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
        let request = AccountInfoRequest {
            method: "account_info",
            params: [AccountInfoParams {
                account: address,
                ledger_index: "validated",
            }],
        };
        let resp: AccountInfoResponse = self.http.post_json(&self.rpc_url, &request).await?;

        match (resp.result.account_data, resp.result.error) {
            (Some(data), _) => parse_units(&data.balance, ChainId::Ripple.decimals())
                .ok_or_else(|| AdapterError::Parse(format!("invalid drops: {}", data.balance))),
            // 未激活账户：真实的零余额
            (None, Some(err)) if err == "actNotFound" => Ok(Decimal::ZERO),
            (None, Some(err)) => Err(AdapterError::Upstream(
                resp.result.error_message.unwrap_or(err),
            )),
            (None, None) => Err(AdapterError::Parse("missing account_data".into())),
        }
    }
}
