//! 统一余额聚合服务
//!
//! 对每个钱包：先尝试原生币 + 代币，失败则退回仅原生币，两者都失败则跳过该钱包。
//! 单个钱包失败不会影响其他钱包；刷新可通过 `CancellationToken` 中止。

use std::{collections::HashMap, sync::Arc};

use futures::{stream, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    domain::{
        chain::ChainId,
        models::{decimal_to_f64, NormalizedBalance, Wallet},
    },
    error::{AdapterError, EnrichmentError},
    infrastructure::log_redact::redact_address,
    service::{
        chain_adapter::{AdapterRegistry, ChainAdapter},
        price_cache::PriceCache,
        token_enrichment::{MultiTokenBalance, TokenEnrichment},
    },
    utils::money::format_native,
};

/// 钱包被跳过的原因
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletFailure {
    pub wallet_id: Uuid,
    pub chain: String,
    pub address: String,
    pub reason: String,
}

/// 一次刷新的结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshReport {
    /// 按钱包 id 索引的余额（同一地址可登记在多条链上）
    pub balances: HashMap<Uuid, NormalizedBalance>,
    pub failures: Vec<WalletFailure>,
    /// 刷新被取消时为 true，`balances` 只包含取消前完成的钱包
    pub cancelled: bool,
}

enum Outcome {
    Balance(Uuid, NormalizedBalance),
    Failed(WalletFailure),
    Cancelled,
}

pub struct BalanceAggregator {
    adapters: AdapterRegistry,
    prices: Arc<PriceCache>,
    enrichment: TokenEnrichment,
    concurrency: usize,
}

impl BalanceAggregator {
    pub fn new(
        adapters: AdapterRegistry,
        prices: Arc<PriceCache>,
        wallet_concurrency: usize,
        token_concurrency: usize,
    ) -> Self {
        Self {
            adapters,
            enrichment: TokenEnrichment::new(prices.clone(), token_concurrency),
            prices,
            concurrency: wallet_concurrency.max(1),
        }
    }

    /// 获取单个地址余额，不支持的链或全部失败时返回 None
    pub async fn fetch_balance(&self, address: &str, chain: &str) -> Option<NormalizedBalance> {
        self.try_fetch_balance(address, chain).await.ok()
    }

    async fn try_fetch_balance(
        &self,
        address: &str,
        chain: &str,
    ) -> Result<NormalizedBalance, AdapterError> {
        let chain_id = ChainId::parse(chain).ok_or_else(|| AdapterError::Unsupported(chain.to_string()))?;
        let adapter = self
            .adapters
            .get(chain_id)
            .ok_or_else(|| AdapterError::Unsupported(chain.to_string()))?;

        let balance = match self.fetch_multi_token(adapter.as_ref(), address).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(
                    chain = %chain_id,
                    address = %redact_address(address),
                    error = %e,
                    "Multi-token fetch failed, retrying native only"
                );
                let native = adapter.fetch_native_balance(address).await.map_err(|e| {
                    tracing::warn!(
                        chain = %chain_id,
                        address = %redact_address(address),
                        error = %e,
                        "Native balance fetch failed, wallet skipped"
                    );
                    e
                })?;
                MultiTokenBalance::native_only(native)
            }
        };

        Ok(self.price(chain_id, address, balance).await)
    }

    async fn fetch_multi_token(
        &self,
        adapter: &dyn ChainAdapter,
        address: &str,
    ) -> Result<MultiTokenBalance, EnrichmentError> {
        let native = adapter
            .fetch_native_balance(address)
            .await
            .map_err(|e| EnrichmentError::Native(e.to_string()))?;
        Ok(self.enrichment.enrich(adapter, address, native).await)
    }

    async fn price(&self, chain: ChainId, address: &str, balance: MultiTokenBalance) -> NormalizedBalance {
        let native_price_usd = self.prices.get_spot(chain.native_symbol()).await;
        NormalizedBalance {
            chain,
            address: address.to_string(),
            native_symbol: chain.native_symbol().to_string(),
            native_balance: format_native(balance.native_balance),
            native_price_usd,
            native_value_usd: native_value(balance.native_balance, native_price_usd),
            tokens: balance.tokens,
        }
    }

    /// 刷新所有钱包余额，按地址分组；同一地址在多条链上各占一项
    pub async fn fetch_all_balances(
        &self,
        wallets: &[Wallet],
        cancel: &CancellationToken,
    ) -> HashMap<String, Vec<NormalizedBalance>> {
        let mut by_address: HashMap<String, Vec<NormalizedBalance>> = HashMap::new();
        for balance in self.refresh(wallets, cancel).await.balances.into_values() {
            by_address.entry(balance.address.clone()).or_default().push(balance);
        }
        by_address
    }

    /// 有界并发刷新，附带失败与取消信息
    pub async fn refresh(&self, wallets: &[Wallet], cancel: &CancellationToken) -> RefreshReport {
        let mut report = RefreshReport::default();

        let mut outcomes = stream::iter(wallets)
            .map(|wallet| async move {
                if cancel.is_cancelled() {
                    return Outcome::Cancelled;
                }
                tokio::select! {
                    _ = cancel.cancelled() => Outcome::Cancelled,
                    result = self.try_fetch_balance(&wallet.address, &wallet.chain) => match result {
                        Ok(balance) => Outcome::Balance(wallet.id, balance),
                        Err(e) => Outcome::Failed(WalletFailure {
                            wallet_id: wallet.id,
                            chain: wallet.chain.clone(),
                            address: wallet.address.clone(),
                            reason: e.to_string(),
                        }),
                    },
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Outcome::Balance(wallet_id, balance) => {
                    report.balances.insert(wallet_id, balance);
                }
                Outcome::Failed(failure) => report.failures.push(failure),
                Outcome::Cancelled => {
                    report.cancelled = true;
                    break;
                }
            }
        }

        tracing::info!(
            wallets = wallets.len(),
            refreshed = report.balances.len(),
            failed = report.failures.len(),
            cancelled = report.cancelled,
            "Balance refresh finished"
        );
        report
    }
}

fn native_value(amount: Decimal, price: f64) -> f64 {
    let value = decimal_to_f64(amount) * price;
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
