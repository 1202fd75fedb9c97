//! ironfolio - 多链资产组合估值核心
//!
//! 本地加密助记词，只读查询链上余额，汇总手动持仓并计算组合价值与历史走势

pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod repository;
pub mod service;
pub mod utils;

// 重新导出常用类型
pub use error::{PortfolioError, PortfolioResult};

// 统一模块导出
pub mod prelude {
    pub use crate::{
        config::Config,
        domain::{AssetClass, ChainId, ManualPosition, NormalizedBalance, TimeRange, Wallet},
        error::{AdapterError, PortfolioError, PortfolioResult, PriceError, VaultError},
        repository::{InMemoryPortfolioRepository, PositionRepository, WalletRepository},
        service::{PortfolioService, PortfolioSnapshot, SecretVault},
    };
}
