//! 代币发现与定价
//!
//! 代币转账记录 → 按合约去重 → 有界并发查询各合约余额并定价（仅正余额）。
//! 任何一步网络/解析失败都放弃整个钱包的代币发现，退回仅原生币结果。

use std::sync::Arc;

use futures::{future, stream, StreamExt, TryStreamExt};
use rust_decimal::Decimal;

use crate::{
    domain::models::{decimal_to_f64, TokenHolding},
    error::EnrichmentError,
    infrastructure::log_redact::redact_address,
    service::{
        chain_adapter::{ChainAdapter, TokenContract},
        price_cache::PriceCache,
    },
};

/// 原生币 + 代币
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTokenBalance {
    pub native_balance: Decimal,
    pub tokens: Vec<TokenHolding>,
}

impl MultiTokenBalance {
    pub fn native_only(native_balance: Decimal) -> Self {
        Self {
            native_balance,
            tokens: Vec::new(),
        }
    }
}

pub struct TokenEnrichment {
    prices: Arc<PriceCache>,
    concurrency: usize,
}

impl TokenEnrichment {
    pub fn new(prices: Arc<PriceCache>, concurrency: usize) -> Self {
        Self {
            prices,
            concurrency: concurrency.max(1),
        }
    }

    /// 永不失败：代币发现出错时只返回原生币
    pub async fn enrich(
        &self,
        adapter: &dyn ChainAdapter,
        address: &str,
        native_balance: Decimal,
    ) -> MultiTokenBalance {
        if !adapter.supports_tokens() {
            return MultiTokenBalance::native_only(native_balance);
        }

        match self.discover(adapter, address).await {
            Ok(tokens) => MultiTokenBalance {
                native_balance,
                tokens,
            },
            Err(e) => {
                tracing::warn!(
                    chain = %adapter.chain(),
                    address = %redact_address(address),
                    error = %e,
                    "Token enrichment failed, falling back to native balance"
                );
                MultiTokenBalance::native_only(native_balance)
            }
        }
    }

    async fn discover(
        &self,
        adapter: &dyn ChainAdapter,
        address: &str,
    ) -> Result<Vec<TokenHolding>, EnrichmentError> {
        let candidates = dedupe_contracts(adapter.fetch_token_transfers(address).await?);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let platform = adapter.chain().info().token_platform;
        let mut holdings: Vec<TokenHolding> = stream::iter(candidates)
            .map(|token| async move {
                let balance = adapter.fetch_token_balance(address, &token).await?;
                if balance <= Decimal::ZERO {
                    return Ok::<_, EnrichmentError>(None);
                }
                let price_usd = match platform {
                    Some(platform) => self.prices.get_token_price(platform, &token.contract_address).await,
                    None => 0.0,
                };
                Ok::<_, EnrichmentError>(Some(TokenHolding {
                    value_usd: decimal_to_f64(balance) * price_usd,
                    symbol: token.symbol,
                    name: token.name,
                    balance,
                    contract_address: token.contract_address,
                    price_usd,
                }))
            })
            .buffer_unordered(self.concurrency)
            .try_filter_map(|holding| future::ready(Ok(holding)))
            .try_collect()
            .await?;

        // 并发完成顺序不定，按价值降序输出
        holdings.sort_by(|a, b| {
            b.value_usd
                .total_cmp(&a.value_usd)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        tracing::debug!(
            chain = %adapter.chain(),
            address = %redact_address(address),
            tokens = holdings.len(),
            "Token enrichment completed"
        );
        Ok(holdings)
    }
}

/// 合约地址大小写不敏感去重，保留首次出现的元数据
fn dedupe_contracts(contracts: Vec<TokenContract>) -> Vec<TokenContract> {
    let mut seen = std::collections::HashSet::new();
    contracts
        .into_iter()
        .filter(|c| seen.insert(c.contract_address.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, str::FromStr, time::Duration};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        domain::chain::ChainId,
        error::{AdapterError, PriceError},
        service::price_service::SpotPriceSource,
    };

    struct FakeEvm {
        transfers: Result<Vec<TokenContract>, AdapterError>,
        balances: HashMap<String, Result<Decimal, AdapterError>>,
    }

    #[async_trait]
    impl ChainAdapter for FakeEvm {
        fn chain(&self) -> ChainId {
            ChainId::Ethereum
        }

        async fn fetch_native_balance(&self, _address: &str) -> Result<Decimal, AdapterError> {
            Ok(Decimal::ONE)
        }

        fn supports_tokens(&self) -> bool {
            true
        }

        async fn fetch_token_transfers(&self, _address: &str) -> Result<Vec<TokenContract>, AdapterError> {
            self.transfers.clone()
        }

        async fn fetch_token_balance(
            &self,
            _address: &str,
            token: &TokenContract,
        ) -> Result<Decimal, AdapterError> {
            self.balances
                .get(&token.contract_address)
                .cloned()
                .unwrap_or(Ok(Decimal::ZERO))
        }
    }

    struct TokenPrices;

    #[async_trait]
    impl SpotPriceSource for TokenPrices {
        async fn fetch_spot(&self, symbol: &str) -> Result<f64, PriceError> {
            Err(PriceError::Unavailable(symbol.into()))
        }

        async fn fetch_token_price(&self, _platform: &str, contract: &str) -> Result<f64, PriceError> {
            match contract {
                "0xusdc" => Ok(1.0),
                "0xlink" => Ok(15.0),
                _ => Err(PriceError::Unavailable(contract.into())),
            }
        }
    }

    fn token(contract: &str, symbol: &str) -> TokenContract {
        TokenContract {
            contract_address: contract.into(),
            symbol: symbol.into(),
            name: symbol.into(),
            decimals: 18,
        }
    }

    fn enrichment() -> TokenEnrichment {
        TokenEnrichment::new(
            Arc::new(PriceCache::new(Arc::new(TokenPrices), Duration::from_secs(300))),
            4,
        )
    }

    #[tokio::test]
    async fn test_positive_balances_priced_and_unpriced_kept() {
        let adapter = FakeEvm {
            transfers: Ok(vec![
                token("0xusdc", "USDC"),
                token("0xUSDC", "USDC"),
                token("0xlink", "LINK"),
                token("0xodd", "ODD"),
                token("0xgone", "GONE"),
            ]),
            balances: HashMap::from([
                ("0xusdc".to_string(), Ok(Decimal::from(100))),
                ("0xlink".to_string(), Ok(Decimal::from(2))),
                ("0xodd".to_string(), Ok(Decimal::from_str("7.5").unwrap())),
                ("0xgone".to_string(), Ok(Decimal::ZERO)),
            ]),
        };

        let result = enrichment().enrich(&adapter, "0xabc", Decimal::ONE).await;
        let symbols: Vec<&str> = result.tokens.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["USDC", "LINK", "ODD"]);
        assert_eq!(result.tokens[1].value_usd, 30.0);
        assert_eq!(result.tokens[2].price_usd, 0.0);
        assert_eq!(result.tokens[2].value_display(), "$0.00");
    }

    #[tokio::test]
    async fn test_balance_error_degrades_to_native_only() {
        let adapter = FakeEvm {
            transfers: Ok(vec![token("0xusdc", "USDC"), token("0xlink", "LINK")]),
            balances: HashMap::from([
                ("0xusdc".to_string(), Ok(Decimal::from(100))),
                ("0xlink".to_string(), Err(AdapterError::Timeout)),
            ]),
        };

        let result = enrichment().enrich(&adapter, "0xabc", Decimal::from(3)).await;
        assert_eq!(result, MultiTokenBalance::native_only(Decimal::from(3)));
    }

    #[tokio::test]
    async fn test_transfer_error_degrades_to_native_only() {
        let adapter = FakeEvm {
            transfers: Err(AdapterError::Status(502)),
            balances: HashMap::new(),
        };

        let result = enrichment().enrich(&adapter, "0xabc", Decimal::ONE).await;
        assert!(result.tokens.is_empty());
        assert_eq!(result.native_balance, Decimal::ONE);
    }

    struct SlowTokenPrices;

    #[async_trait]
    impl SpotPriceSource for SlowTokenPrices {
        async fn fetch_spot(&self, symbol: &str) -> Result<f64, PriceError> {
            Err(PriceError::Unavailable(symbol.into()))
        }

        async fn fetch_token_price(&self, _platform: &str, _contract: &str) -> Result<f64, PriceError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(2.0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_prices_fetched_within_bounded_fan_out() {
        let contracts: Vec<String> = (0..8).map(|i| format!("0xt{}", i)).collect();
        let adapter = FakeEvm {
            transfers: Ok(contracts.iter().map(|c| token(c, c)).collect()),
            balances: contracts.iter().map(|c| (c.clone(), Ok(Decimal::ONE))).collect(),
        };
        let enrichment = TokenEnrichment::new(
            Arc::new(PriceCache::new(Arc::new(SlowTokenPrices), Duration::from_secs(300))),
            4,
        );

        let started = tokio::time::Instant::now();
        let result = enrichment.enrich(&adapter, "0xabc", Decimal::ONE).await;

        assert_eq!(result.tokens.len(), 8);
        assert!(result.tokens.iter().all(|t| t.value_usd == 2.0));
        // 8 个报价、并发 4：约 2 秒而不是 8 秒
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
