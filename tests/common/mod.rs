//! 测试辅助模块
//! 进程内假数据源与配置构造

#![allow(dead_code)]

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use httpmock::MockServer;
use ironfolio::{
    config::{Config, EvmExplorerConfig},
    domain::{PricePoint, TimeRange},
    error::PriceError,
    service::{
        price_service::{HistoricalPriceSource, SpotPriceSource},
        PriceCache, PriceSources,
    },
};
use uuid::Uuid;

/// 固定价格表，历史序列按天递增 10%
pub struct FixedPrices {
    prices: HashMap<String, f64>,
    history_len: usize,
}

impl FixedPrices {
    pub fn new(prices: &[(&str, f64)], history_len: usize) -> Self {
        Self {
            prices: prices.iter().map(|(s, p)| (s.to_uppercase(), *p)).collect(),
            history_len,
        }
    }
}

#[async_trait]
impl SpotPriceSource for FixedPrices {
    async fn fetch_spot(&self, symbol: &str) -> Result<f64, PriceError> {
        self.prices
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| PriceError::Unavailable(symbol.to_string()))
    }
}

#[async_trait]
impl HistoricalPriceSource for FixedPrices {
    async fn fetch_history(
        &self,
        symbol: &str,
        _range: TimeRange,
    ) -> Result<Vec<PricePoint>, PriceError> {
        let base = self.fetch_spot(symbol).await?;
        Ok((0..self.history_len)
            .map(|k| PricePoint {
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1 + k as u32, 0, 0, 0).unwrap(),
                price: base * (1.0 + 0.1 * k as f64),
            })
            .collect())
    }
}

pub fn price_sources(crypto: Arc<FixedPrices>, quotes: Arc<FixedPrices>) -> PriceSources {
    let ttl = Duration::from_secs(300);
    PriceSources {
        crypto: Arc::new(PriceCache::new(crypto.clone(), ttl)),
        quotes: Arc::new(PriceCache::new(quotes.clone(), ttl)),
        crypto_history: crypto,
        quote_history: quotes,
    }
}

/// 所有上游都指向同一个 MockServer
pub fn mock_config(server: &MockServer) -> Config {
    let mut config = Config::from_env().unwrap();
    let explorer = EvmExplorerConfig {
        base_url: server.url("/api"),
        api_key: None,
    };
    config.explorers.ethereum = explorer.clone();
    config.explorers.bsc = explorer.clone();
    config.explorers.polygon = explorer.clone();
    config.explorers.arbitrum = explorer.clone();
    config.explorers.optimism = explorer;
    config.explorers.bitcoin_api_url = server.url("/btc");
    config.explorers.solana_rpc_url = server.url("/solana");
    config.explorers.ripple_rpc_url = server.url("/xrpl");
    config.explorers.cardano_api_url = server.url("/koios");
    config.price.coingecko_base_url = server.base_url();
    config.price.coingecko_api_key = None;
    config.price.quotes_base_url = server.base_url();
    config.http.timeout_secs = 5;
    config
}

pub fn user() -> Uuid {
    Uuid::new_v4()
}
