//! 链适配器
//!
//! 每条受支持的链一个适配器，统一暴露原生币余额查询；
//! 只有 Etherscan 系（EVM）适配器支持代币发现。
//!
//! 返回约定：
//! - 网络/HTTP/解析失败 → `Err(AdapterError)`，由聚合器降级
//! - 上游明确表示"账户不存在/无数据" → `Ok(0)`，即真实的零余额

mod bitcoin;
mod cardano;
mod evm;
mod ripple;
mod solana;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use self::{
    bitcoin::BitcoinAdapter, cardano::CardanoAdapter, evm::EvmExplorerAdapter,
    ripple::RippleAdapter, solana::SolanaAdapter,
};
use crate::{
    config::Config,
    domain::chain::{ChainId, EVM_CHAINS},
    error::AdapterError,
    infrastructure::upstream::UpstreamClient,
};

/// 从代币转账记录中发现的合约
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenContract {
    pub contract_address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn chain(&self) -> ChainId;

    /// 原生币余额（显示单位）
    async fn fetch_native_balance(&self, address: &str) -> Result<Decimal, AdapterError>;

    fn supports_tokens(&self) -> bool {
        false
    }

    /// 地址相关的代币转账中出现过的合约（可能重复）
    async fn fetch_token_transfers(&self, _address: &str) -> Result<Vec<TokenContract>, AdapterError> {
        Ok(Vec::new())
    }

    /// 指定合约的代币余额（显示单位）
    async fn fetch_token_balance(
        &self,
        _address: &str,
        token: &TokenContract,
    ) -> Result<Decimal, AdapterError> {
        Err(AdapterError::Unsupported(format!(
            "{} token {}",
            self.chain(),
            token.contract_address
        )))
    }
}

/// 按链索引的适配器集合
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: HashMap<ChainId, Arc<dyn ChainAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置注册所有内置适配器
    pub fn from_config(config: &Config, http: UpstreamClient) -> Self {
        let mut registry = Self::new();
        let explorers = &config.explorers;

        for chain in EVM_CHAINS {
            if let Some(explorer) = explorers.evm(chain) {
                registry.register(Arc::new(EvmExplorerAdapter::new(
                    chain,
                    http.clone(),
                    explorer,
                )));
            }
        }
        registry.register(Arc::new(BitcoinAdapter::new(
            http.clone(),
            &explorers.bitcoin_api_url,
        )));
        registry.register(Arc::new(SolanaAdapter::new(
            http.clone(),
            &explorers.solana_rpc_url,
        )));
        registry.register(Arc::new(RippleAdapter::new(
            http.clone(),
            &explorers.ripple_rpc_url,
        )));
        registry.register(Arc::new(CardanoAdapter::new(http, &explorers.cardano_api_url)));

        tracing::debug!(adapters = registry.len(), "Chain adapters registered");
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn ChainAdapter>) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn get(&self, chain: ChainId) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&chain).cloned()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
