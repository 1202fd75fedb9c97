//! 组合服务：仓储 → 余额聚合 → 价格缓存 → 估值引擎
//!
//! 刷新过程中的部分失败只体现在 `RefreshReport` 里；
//! 对外传播的错误只有解密失败、持久化失败和参数错误。

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::{
    config::Config,
    domain::{
        models::{
            decimal_to_f64, AssetClass, CreatePositionParams, CreateWalletParams, ManualPosition,
            NormalizedBalance, UpdatePositionParams, UpdateWalletParams, Wallet,
        },
        time_range::TimeRange,
    },
    error::{PortfolioError, PortfolioResult},
    infrastructure::{
        log_redact::{redact_address, redact_email, SensitiveRedact},
        upstream::UpstreamClient,
    },
    repository::portfolio_repository::{PositionRepository, WalletRepository},
    service::{
        balance_aggregator::{BalanceAggregator, WalletFailure},
        chain_adapter::AdapterRegistry,
        history_builder::{AssetSeries, HistoricalSeriesBuilder, TimePoint},
        price_cache::PriceCache,
        price_service::{CoinGeckoClient, HistoricalPriceSource, QuoteClient},
        secret_vault::SecretVault,
        valuation_engine::{Performance, Valuation, ValuationEngine},
    },
    utils::{
        address_classifier::{check_selection, classify, ChainMismatchWarning},
        money::format_usd,
    },
};

/// 价格相关依赖
#[derive(Clone)]
pub struct PriceSources {
    pub crypto: Arc<PriceCache>,
    pub quotes: Arc<PriceCache>,
    pub crypto_history: Arc<dyn HistoricalPriceSource>,
    pub quote_history: Arc<dyn HistoricalPriceSource>,
}

/// 组合快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub user_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub total_value_display: String,
    pub valuation: Valuation,
    pub balances: Vec<NormalizedBalance>,
    /// 本次刷新被跳过的钱包
    pub failures: Vec<WalletFailure>,
    pub cancelled: bool,
}

/// 组合历史
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioHistory {
    pub range: TimeRange,
    pub points: Vec<TimePoint>,
    pub performance: Option<Performance>,
    /// 拉取失败而未计入的序列
    pub missing_series: Vec<String>,
}

/// 保存后的钱包及链选择提示
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedWallet {
    pub wallet: Wallet,
    pub warning: Option<ChainMismatchWarning>,
}

pub struct PortfolioService {
    wallets: Arc<dyn WalletRepository>,
    positions: Arc<dyn PositionRepository>,
    aggregator: Arc<BalanceAggregator>,
    prices: PriceSources,
}

impl PortfolioService {
    pub fn new(
        wallets: Arc<dyn WalletRepository>,
        positions: Arc<dyn PositionRepository>,
        aggregator: Arc<BalanceAggregator>,
        prices: PriceSources,
    ) -> Self {
        Self {
            wallets,
            positions,
            aggregator,
            prices,
        }
    }

    /// 按配置装配真实的 HTTP 客户端
    pub fn from_config(
        config: &Config,
        wallets: Arc<dyn WalletRepository>,
        positions: Arc<dyn PositionRepository>,
    ) -> Self {
        let http = UpstreamClient::new(&config.http);
        let ttl = Duration::from_secs(config.price.ttl_secs);

        let coingecko = Arc::new(CoinGeckoClient::new(http.clone(), &config.price));
        let quotes = Arc::new(QuoteClient::new(http.clone(), &config.price));

        let prices = PriceSources {
            crypto: Arc::new(PriceCache::new(coingecko.clone(), ttl)),
            quotes: Arc::new(PriceCache::new(quotes.clone(), ttl)),
            crypto_history: coingecko,
            quote_history: quotes,
        };

        let aggregator = Arc::new(BalanceAggregator::new(
            AdapterRegistry::from_config(config, http),
            prices.crypto.clone(),
            config.refresh.wallet_concurrency,
            config.refresh.token_concurrency,
        ));

        Self::new(wallets, positions, aggregator, prices)
    }

    // ===== 估值 =====

    /// 刷新余额与价格并估值
    pub async fn snapshot(
        &self,
        user_id: Uuid,
        cancel: &CancellationToken,
    ) -> PortfolioResult<PortfolioSnapshot> {
        let wallets = self.wallets.list_wallets(user_id).await?;
        let positions = self.positions.list_positions(user_id).await?;

        let (report, unit_prices) = tokio::join!(
            self.aggregator.refresh(&wallets, cancel),
            self.position_prices(&positions)
        );

        let valuation = ValuationEngine::value(&wallets, &report.balances, &positions, &unit_prices);

        let mut balances: Vec<NormalizedBalance> = report.balances.into_values().collect();
        balances.sort_by(|a, b| {
            b.total_value_usd()
                .total_cmp(&a.total_value_usd())
                .then_with(|| a.address.cmp(&b.address))
                .then_with(|| a.chain.as_str().cmp(b.chain.as_str()))
        });

        tracing::info!(
            user_id = %user_id,
            wallets = wallets.len(),
            positions = positions.len(),
            total_value_usd = valuation.total_value_usd,
            "Portfolio snapshot computed"
        );

        Ok(PortfolioSnapshot {
            user_id,
            generated_at: Utc::now(),
            total_value_display: format_usd(valuation.total_value_usd),
            valuation,
            balances,
            failures: report.failures,
            cancelled: report.cancelled,
        })
    }

    async fn position_prices(&self, positions: &[ManualPosition]) -> HashMap<Uuid, f64> {
        let priced = join_all(positions.iter().map(|p| async move {
            let price = self.position_price(p).await;
            (p.id, price)
        }))
        .await;

        priced
            .into_iter()
            .filter_map(|(id, price)| price.map(|p| (id, p)))
            .collect()
    }

    /// 手动持仓的实时单价（报价单位），无报价时返回 None
    async fn position_price(&self, position: &ManualPosition) -> Option<f64> {
        let symbol = price_symbol(position)?;
        let price = match position.asset_class {
            AssetClass::Crypto => self.prices.crypto.get_spot(&symbol).await,
            AssetClass::Equity | AssetClass::Metal | AssetClass::Commodity => {
                self.prices.quotes.get_spot(&symbol).await
            }
            AssetClass::TokenizedPlaceholder => return None,
        };
        (price > 0.0).then_some(price)
    }

    // ===== 历史 =====

    pub async fn history(
        &self,
        user_id: Uuid,
        range: TimeRange,
        cancel: &CancellationToken,
    ) -> PortfolioResult<PortfolioHistory> {
        let snapshot = self.snapshot(user_id, cancel).await?;
        let positions = self.positions.list_positions(user_id).await?;
        Ok(self.history_for(&snapshot.balances, &positions, range).await)
    }

    /// 按当前持有数量回放历史价格
    ///
    /// 代币没有历史价格来源，不计入历史序列。
    pub async fn history_for(
        &self,
        balances: &[NormalizedBalance],
        positions: &[ManualPosition],
        range: TimeRange,
    ) -> PortfolioHistory {
        // 加密货币按符号合并数量，每个符号只拉取一次
        let mut crypto_qty: HashMap<String, f64> = HashMap::new();
        for balance in balances {
            let qty = balance.native_balance.parse::<f64>().unwrap_or(0.0);
            *crypto_qty.entry(balance.native_symbol.to_uppercase()).or_default() += qty;
        }

        let mut quote_requests: Vec<(String, AssetClass, f64)> = Vec::new();
        for position in positions {
            let Some(symbol) = price_symbol(position) else {
                continue;
            };
            match position.asset_class {
                AssetClass::Crypto => {
                    *crypto_qty.entry(symbol.to_uppercase()).or_default() +=
                        decimal_to_f64(position.quantity);
                }
                AssetClass::Equity | AssetClass::Metal | AssetClass::Commodity => {
                    quote_requests.push((symbol, position.asset_class, position.priced_quantity()));
                }
                AssetClass::TokenizedPlaceholder => {}
            }
        }

        let crypto_fetches = crypto_qty
            .into_iter()
            .filter(|(_, qty)| *qty > 0.0)
            .map(|(symbol, qty)| async move {
                let result = self.prices.crypto_history.fetch_history(&symbol, range).await;
                (symbol, AssetClass::Crypto, qty, result)
            });
        let quote_fetches = quote_requests.into_iter().map(|(symbol, class, qty)| async move {
            let result = self.prices.quote_history.fetch_history(&symbol, range).await;
            (symbol, class, qty, result)
        });

        let (crypto, quotes) = tokio::join!(join_all(crypto_fetches), join_all(quote_fetches));

        let mut series = Vec::new();
        let mut missing_series = Vec::new();
        for (symbol, asset_class, quantity, result) in crypto.into_iter().chain(quotes) {
            match result {
                Ok(points) => series.push(AssetSeries {
                    label: symbol,
                    asset_class,
                    quantity,
                    points,
                }),
                Err(e) => {
                    tracing::warn!(symbol = %symbol, range = %range, error = %e, "History series unavailable");
                    missing_series.push(symbol);
                }
            }
        }
        missing_series.sort();

        let points = HistoricalSeriesBuilder::build(range, &series);
        PortfolioHistory {
            range,
            performance: ValuationEngine::performance(&points),
            points,
            missing_series,
        }
    }

    // ===== 钱包 =====

    pub async fn list_wallets(&self, user_id: Uuid) -> PortfolioResult<Vec<Wallet>> {
        Ok(self.wallets.list_wallets(user_id).await?)
    }

    /// 保存钱包；地址与所选链不符时只给出提示，不阻止保存
    pub async fn add_wallet(&self, mut params: CreateWalletParams) -> PortfolioResult<SavedWallet> {
        params.address = params.address.trim().to_string();
        params.chain = params.chain.trim().to_string();
        if params.address.is_empty() {
            return Err(PortfolioError::InvalidInput("address must not be empty".into()));
        }
        if params.chain.is_empty() {
            return Err(PortfolioError::InvalidInput("chain must not be empty".into()));
        }

        let warning = check_selection(&params.address, &params.chain);
        let classification = classify(&params.address);
        if classification.checksum_valid == Some(false) {
            tracing::warn!(address = %redact_address(&params.address), "EVM address checksum mismatch");
        }

        let wallet = self.wallets.create_wallet(params).await?;
        tracing::info!(wallet = %wallet.redact(), format = classification.format_label(), "Wallet saved");
        Ok(SavedWallet { wallet, warning })
    }

    pub async fn update_wallet(
        &self,
        wallet_id: Uuid,
        params: UpdateWalletParams,
    ) -> PortfolioResult<SavedWallet> {
        let wallet = self.wallets.update_wallet(wallet_id, params).await?;
        let warning = check_selection(&wallet.address, &wallet.chain);
        Ok(SavedWallet { wallet, warning })
    }

    pub async fn delete_wallet(&self, wallet_id: Uuid) -> PortfolioResult<()> {
        self.wallets.delete_wallet(wallet_id).await?;
        tracing::info!(wallet_id = %wallet_id, "Wallet deleted");
        Ok(())
    }

    // ===== 助记词 =====

    pub async fn store_secret(
        &self,
        wallet_id: Uuid,
        secret: &str,
        identity: &str,
    ) -> PortfolioResult<()> {
        let blob = SecretVault::encrypt(secret, identity)?;
        self.wallets.replace_secret(wallet_id, Some(blob)).await?;
        tracing::info!(wallet_id = %wallet_id, identity = %redact_email(identity), "Wallet secret stored");
        Ok(())
    }

    /// 解密失败必须展示给用户
    pub async fn reveal_secret(
        &self,
        wallet_id: Uuid,
        identity: &str,
    ) -> PortfolioResult<Zeroizing<String>> {
        let wallet = self.wallets.get_wallet(wallet_id).await?;
        let blob = wallet
            .encrypted_secret
            .as_deref()
            .ok_or_else(|| PortfolioError::InvalidInput("wallet has no stored secret".into()))?;

        SecretVault::decrypt(blob, identity).map_err(|e| {
            tracing::warn!(wallet_id = %wallet_id, identity = %redact_email(identity), "Secret decryption failed");
            e.into()
        })
    }

    /// 身份变更：用旧身份解密、新身份重新加密该用户所有钱包的助记词
    ///
    /// 任一钱包失败即中止，已轮换的钱包保持新密文。
    pub async fn rotate_secrets(
        &self,
        user_id: Uuid,
        old_identity: &str,
        new_identity: &str,
    ) -> PortfolioResult<usize> {
        let wallets = self.wallets.list_wallets(user_id).await?;
        let mut rotated = 0;
        for wallet in wallets {
            let Some(blob) = wallet.encrypted_secret.as_deref() else {
                continue;
            };
            let new_blob = SecretVault::rotate(blob, old_identity, new_identity)?;
            self.wallets.replace_secret(wallet.id, Some(new_blob)).await?;
            rotated += 1;
        }
        tracing::info!(user_id = %user_id, rotated, "Wallet secrets re-encrypted");
        Ok(rotated)
    }

    pub async fn remove_secret(&self, wallet_id: Uuid) -> PortfolioResult<()> {
        Ok(self.wallets.replace_secret(wallet_id, None).await?)
    }

    // ===== 手动持仓 =====

    pub async fn list_positions(&self, user_id: Uuid) -> PortfolioResult<Vec<ManualPosition>> {
        Ok(self.positions.list_positions(user_id).await?)
    }

    pub async fn add_position(&self, params: CreatePositionParams) -> PortfolioResult<ManualPosition> {
        if params.name.trim().is_empty() {
            return Err(PortfolioError::InvalidInput("name must not be empty".into()));
        }
        if params.quantity.is_sign_negative() || params.unit_cost.is_sign_negative() {
            return Err(PortfolioError::InvalidInput(
                "quantity and unit cost must not be negative".into(),
            ));
        }
        if params.weight_unit.is_some() && params.asset_class != AssetClass::Metal {
            return Err(PortfolioError::InvalidInput(
                "weight unit only applies to metals".into(),
            ));
        }
        Ok(self.positions.create_position(params).await?)
    }

    pub async fn update_position(
        &self,
        position_id: Uuid,
        params: UpdatePositionParams,
    ) -> PortfolioResult<ManualPosition> {
        let negative = |v: &Option<rust_decimal::Decimal>| v.map_or(false, |d| d.is_sign_negative());
        if negative(&params.quantity) || negative(&params.unit_cost) {
            return Err(PortfolioError::InvalidInput(
                "quantity and unit cost must not be negative".into(),
            ));
        }
        Ok(self.positions.update_position(position_id, params).await?)
    }

    pub async fn delete_position(&self, position_id: Uuid) -> PortfolioResult<()> {
        Ok(self.positions.delete_position(position_id).await?)
    }
}

/// 报价符号：优先 ticker，贵金属允许用名称（Gold / Silver ...）
fn price_symbol(position: &ManualPosition) -> Option<String> {
    let ticker = position
        .ticker
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty());
    match (ticker, position.asset_class) {
        (Some(t), _) => Some(t.to_string()),
        (None, AssetClass::Metal) => Some(position.name.trim().to_string()).filter(|n| !n.is_empty()),
        (None, _) => None,
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use super::*;
    use crate::{
        domain::{chain::ChainId, time_range::PricePoint},
        error::{AdapterError, PriceError, VaultError},
        repository::portfolio_repository::InMemoryPortfolioRepository,
        service::{chain_adapter::ChainAdapter, price_service::SpotPriceSource},
    };

    struct StaticPrices(HashMap<&'static str, f64>);

    #[async_trait]
    impl SpotPriceSource for StaticPrices {
        async fn fetch_spot(&self, symbol: &str) -> Result<f64, PriceError> {
            self.0
                .get(symbol.to_uppercase().as_str())
                .copied()
                .ok_or_else(|| PriceError::Unavailable(symbol.into()))
        }
    }

    #[async_trait]
    impl HistoricalPriceSource for StaticPrices {
        async fn fetch_history(
            &self,
            symbol: &str,
            _range: TimeRange,
        ) -> Result<Vec<PricePoint>, PriceError> {
            let price = self.fetch_spot(symbol).await?;
            let now = Utc::now();
            Ok((0..3)
                .map(|k| PricePoint {
                    timestamp: now - chrono::Duration::days(2 - k),
                    price: price * (1.0 + k as f64 * 0.1),
                })
                .collect())
        }
    }

    struct OneEthAdapter;

    #[async_trait]
    impl ChainAdapter for OneEthAdapter {
        fn chain(&self) -> ChainId {
            ChainId::Ethereum
        }

        async fn fetch_native_balance(&self, address: &str) -> Result<Decimal, AdapterError> {
            if address.ends_with("dead") {
                return Err(AdapterError::Timeout);
            }
            Ok(Decimal::ONE)
        }
    }

    fn service() -> (PortfolioService, Arc<InMemoryPortfolioRepository>) {
        let repo = Arc::new(InMemoryPortfolioRepository::new());
        let crypto = Arc::new(StaticPrices(HashMap::from([("ETH", 2000.0)])));
        let quotes = Arc::new(StaticPrices(HashMap::from([("AAPL", 200.0), ("XAU", 2000.0)])));
        let ttl = Duration::from_secs(300);

        let prices = PriceSources {
            crypto: Arc::new(PriceCache::new(crypto.clone(), ttl)),
            quotes: Arc::new(PriceCache::new(quotes.clone(), ttl)),
            crypto_history: crypto,
            quote_history: quotes,
        };
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(OneEthAdapter));
        let aggregator = Arc::new(BalanceAggregator::new(registry, prices.crypto.clone(), 4, 4));

        (
            PortfolioService::new(repo.clone(), repo.clone(), aggregator, prices),
            repo,
        )
    }

    fn wallet_params(user_id: Uuid, chain: &str, address: &str) -> CreateWalletParams {
        CreateWalletParams {
            user_id,
            name: "main".into(),
            chain: chain.into(),
            address: address.into(),
            encrypted_secret: None,
            note: None,
        }
    }

    fn position_params(user_id: Uuid, class: AssetClass, ticker: &str, qty: i64, cost: i64) -> CreatePositionParams {
        CreatePositionParams {
            user_id,
            asset_class: class,
            name: ticker.into(),
            ticker: Some(ticker.into()),
            quantity: Decimal::from(qty),
            unit_cost: Decimal::from(cost),
            weight_unit: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_snapshot_combines_wallets_and_positions() {
        let (svc, _) = service();
        let user = Uuid::new_v4();
        svc.add_wallet(wallet_params(user, "ethereum", "0x1234567890abcdef1234567890abcdef12345678"))
            .await
            .unwrap();
        svc.add_wallet(wallet_params(user, "ethereum", "0x1234567890abcdef1234567890abcdef1234dead"))
            .await
            .unwrap();
        svc.add_wallet(wallet_params(user, "dogecoin", "DH5yaieqoZN36fDVciNyRueRGvGLR3mr7L"))
            .await
            .unwrap();
        svc.add_position(position_params(user, AssetClass::Equity, "AAPL", 10, 150))
            .await
            .unwrap();
        svc.add_position(position_params(user, AssetClass::TokenizedPlaceholder, "RWA", 5, 20))
            .await
            .unwrap();

        let snapshot = svc.snapshot(user, &CancellationToken::new()).await.unwrap();

        assert_eq!(snapshot.balances.len(), 1);
        assert_eq!(snapshot.failures.len(), 2);
        // 2000 (ETH) + 10 × 200 (AAPL) + 5 × 20 (成本价)
        assert_eq!(snapshot.valuation.total_value_usd, 4100.0);
        assert_eq!(snapshot.total_value_display, "$4,100.00");
    }

    #[tokio::test]
    async fn test_chain_mismatch_warning_does_not_block_save() {
        let (svc, _) = service();
        let user = Uuid::new_v4();
        let saved = svc
            .add_wallet(wallet_params(user, "solana", "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq"))
            .await
            .unwrap();

        let warning = saved.warning.unwrap();
        assert_eq!(warning.detected, vec![ChainId::Bitcoin]);
        assert_eq!(svc.list_wallets(user).await.unwrap().len(), 1);

        assert!(matches!(
            svc.add_wallet(wallet_params(user, "ethereum", "  ")).await,
            Err(PortfolioError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_secret_store_reveal_and_rotate() {
        let (svc, _) = service();
        let user = Uuid::new_v4();
        let seed = "apple banana cherry delta eagle falcon grape harbor island jungle kettle lemon";
        let saved = svc
            .add_wallet(wallet_params(user, "ethereum", "0x1234567890abcdef1234567890abcdef12345678"))
            .await
            .unwrap();

        svc.store_secret(saved.wallet.id, seed, "user@example.com")
            .await
            .unwrap();
        assert_eq!(
            svc.reveal_secret(saved.wallet.id, "user@example.com").await.unwrap().as_str(),
            seed
        );
        assert!(matches!(
            svc.reveal_secret(saved.wallet.id, "other@example.com").await,
            Err(PortfolioError::Vault(VaultError::Decryption(_)))
        ));

        assert_eq!(
            svc.rotate_secrets(user, "user@example.com", "new@example.com").await.unwrap(),
            1
        );
        assert!(svc.reveal_secret(saved.wallet.id, "new@example.com").await.is_ok());

        svc.remove_secret(saved.wallet.id).await.unwrap();
        assert!(matches!(
            svc.reveal_secret(saved.wallet.id, "new@example.com").await,
            Err(PortfolioError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_repository_errors_propagate() {
        let (svc, _) = service();
        assert!(matches!(
            svc.delete_wallet(Uuid::new_v4()).await,
            Err(PortfolioError::Repository(_))
        ));
    }

    #[tokio::test]
    async fn test_position_validation() {
        let (svc, _) = service();
        let user = Uuid::new_v4();
        assert!(svc
            .add_position(position_params(user, AssetClass::Equity, "AAPL", -1, 10))
            .await
            .is_err());

        let mut params = position_params(user, AssetClass::Equity, "AAPL", 1, 10);
        params.weight_unit = Some(crate::domain::models::WeightUnit::Gram);
        assert!(svc.add_position(params).await.is_err());
    }

    #[tokio::test]
    async fn test_history_uses_current_quantities() {
        let (svc, _) = service();
        let balances = vec![NormalizedBalance {
            chain: ChainId::Ethereum,
            address: "0xabc".into(),
            native_symbol: "ETH".into(),
            native_balance: "2".into(),
            native_price_usd: 2000.0,
            native_value_usd: 4000.0,
            tokens: Vec::new(),
        }];
        let gold = ManualPosition {
            id: Uuid::new_v4(),
            user_id: Uuid::nil(),
            asset_class: AssetClass::Metal,
            name: "XAU".into(),
            ticker: None,
            quantity: Decimal::from_str("1").unwrap(),
            unit_cost: Decimal::from(1800),
            weight_unit: None,
            notes: None,
        };
        let unknown = ManualPosition {
            ticker: Some("ZZZZ".into()),
            asset_class: AssetClass::Equity,
            ..gold.clone()
        };

        let history = svc.history_for(&balances, &[gold, unknown], TimeRange::Week).await;
        assert_eq!(history.points.len(), 3);
        assert_eq!(history.missing_series, vec!["ZZZZ".to_string()]);
        // 2 ETH × 2000 + 1 oz × 2000
        assert!((history.points[0].value_usd - 6000.0).abs() < 1e-9);
        let perf = history.performance.unwrap();
        assert!((perf.change_pct.unwrap() - 20.0).abs() < 1e-9);
    }
}
