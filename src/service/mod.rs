pub mod balance_aggregator; // 多链余额聚合
pub mod chain_adapter;
pub mod history_builder;
pub mod portfolio_service;
pub mod price_cache;
pub mod price_service;
pub mod secret_vault; // 助记词加密存储
pub mod session_guard;
pub mod token_enrichment;
pub mod valuation_engine;

pub use balance_aggregator::{BalanceAggregator, RefreshReport, WalletFailure};
pub use chain_adapter::{AdapterRegistry, ChainAdapter};
pub use portfolio_service::{PortfolioService, PortfolioSnapshot, PriceSources};
pub use price_cache::PriceCache;
pub use secret_vault::SecretVault;
pub use valuation_engine::{Valuation, ValuationEngine};
