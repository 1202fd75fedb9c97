//! TOML 组合文件（CLI 输入）
//!
//! ```toml
//! [[wallets]]
//! name = "cold"
//! chain = "ethereum"
//! address = "0x..."
//!
//! [[positions]]
//! asset_class = "metal"
//! name = "Gold"
//! ticker = "XAU"
//! quantity = "31.1034768"
//! unit_cost = "60"
//! weight_unit = "gram"
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    domain::models::{AssetClass, CreatePositionParams, CreateWalletParams, WeightUnit},
    repository::portfolio_repository::{
        InMemoryPortfolioRepository, PositionRepository, WalletRepository,
    },
};

#[derive(Debug, Clone, Deserialize)]
pub struct WalletEntry {
    pub name: String,
    pub chain: String,
    pub address: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositionEntry {
    pub asset_class: AssetClass,
    pub name: String,
    #[serde(default)]
    pub ticker: Option<String>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    #[serde(default)]
    pub weight_unit: Option<WeightUnit>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PortfolioFile {
    /// 缺省时随机生成
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub wallets: Vec<WalletEntry>,
    #[serde(default)]
    pub positions: Vec<PositionEntry>,
}

impl PortfolioFile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse portfolio file as TOML")
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read portfolio file: {:?}", path.as_ref()))?;
        Self::parse(&content)
    }

    /// 写入内存仓储，返回组合所属用户
    pub async fn load_into(self, repo: &InMemoryPortfolioRepository) -> Result<Uuid> {
        let user_id = self.user_id.unwrap_or_else(Uuid::new_v4);

        for w in self.wallets {
            repo.create_wallet(CreateWalletParams {
                user_id,
                name: w.name,
                chain: w.chain,
                address: w.address,
                encrypted_secret: None,
                note: w.note,
            })
            .await
            .context("Failed to load wallet")?;
        }

        for p in self.positions {
            repo.create_position(CreatePositionParams {
                user_id,
                asset_class: p.asset_class,
                name: p.name,
                ticker: p.ticker,
                quantity: p.quantity,
                unit_cost: p.unit_cost,
                weight_unit: p.weight_unit,
                notes: p.notes,
            })
            .await
            .context("Failed to load position")?;
        }

        Ok(user_id)
    }
}
