//! 资产领域模型
//!
//! 钱包、手动持仓与余额快照。余额快照每次刷新重新计算，不落库。

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chain::ChainId;
use crate::utils::money::format_usd;

/// 链上钱包（只读地址，可选加密助记词）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    /// 用户选择的链标识（可能是不受支持的链）
    pub chain: String,
    pub address: String,
    /// 版本化密文（None 表示仅地址钱包）
    #[serde(default)]
    pub encrypted_secret: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    /// 解析链标识，不支持的链返回 None
    pub fn chain_id(&self) -> Option<ChainId> {
        ChainId::parse(&self.chain)
    }

    pub fn has_secret(&self) -> bool {
        self.encrypted_secret.is_some()
    }
}

/// 创建钱包参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWalletParams {
    pub user_id: Uuid,
    pub name: String,
    pub chain: String,
    pub address: String,
    #[serde(default)]
    pub encrypted_secret: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// 更新钱包参数（None 字段保持不变）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWalletParams {
    pub name: Option<String>,
    pub chain: Option<String>,
    pub address: Option<String>,
    pub note: Option<String>,
}

/// 资产类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Metal,
    Commodity,
    Crypto,
    /// 代币化资产占位（无报价源）
    TokenizedPlaceholder,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equity => "equity",
            AssetClass::Metal => "metal",
            AssetClass::Commodity => "commodity",
            AssetClass::Crypto => "crypto",
            AssetClass::TokenizedPlaceholder => "tokenized_placeholder",
        }
    }
}

/// 贵金属重量单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightUnit {
    TroyOunce,
    Gram,
    Kilogram,
}

/// 1 金衡盎司 = 31.1034768 克
const GRAMS_PER_TROY_OUNCE: f64 = 31.103_476_8;

impl WeightUnit {
    /// 换算为金衡盎司（贵金属报价单位）
    pub fn to_troy_ounces(&self, quantity: f64) -> f64 {
        match self {
            WeightUnit::TroyOunce => quantity,
            WeightUnit::Gram => quantity / GRAMS_PER_TROY_OUNCE,
            WeightUnit::Kilogram => quantity * 1000.0 / GRAMS_PER_TROY_OUNCE,
        }
    }
}

/// 手动录入的持仓
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualPosition {
    pub id: Uuid,
    pub user_id: Uuid,
    pub asset_class: AssetClass,
    pub name: String,
    #[serde(default)]
    pub ticker: Option<String>,
    pub quantity: Decimal,
    /// 单位成本
    pub unit_cost: Decimal,
    /// 仅对贵金属有意义
    #[serde(default)]
    pub weight_unit: Option<WeightUnit>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ManualPosition {
    /// 报价单位下的数量（贵金属换算为金衡盎司）
    pub fn priced_quantity(&self) -> f64 {
        let quantity = decimal_to_f64(self.quantity);
        match (self.asset_class, self.weight_unit) {
            (AssetClass::Metal, Some(unit)) => unit.to_troy_ounces(quantity),
            _ => quantity,
        }
    }

    pub fn cost_basis(&self) -> f64 {
        decimal_to_f64(self.quantity) * decimal_to_f64(self.unit_cost)
    }
}

/// 创建持仓参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePositionParams {
    pub user_id: Uuid,
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

/// 更新持仓参数（None 字段保持不变）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePositionParams {
    pub name: Option<String>,
    pub ticker: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub weight_unit: Option<WeightUnit>,
    pub notes: Option<String>,
}

/// 非原生代币持仓（仅余额严格为正时产生）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub symbol: String,
    pub name: String,
    /// 显示单位余额
    pub balance: Decimal,
    pub contract_address: String,
    /// 单价（0 表示无报价）
    pub price_usd: f64,
    pub value_usd: f64,
}

impl TokenHolding {
    pub fn value_display(&self) -> String {
        format_usd(self.value_usd)
    }
}

/// 归一化余额快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBalance {
    pub chain: ChainId,
    pub address: String,
    pub native_symbol: String,
    /// 原生币余额（十进制字符串，按链精度）
    pub native_balance: String,
    pub native_price_usd: f64,
    pub native_value_usd: f64,
    pub tokens: Vec<TokenHolding>,
}

impl NormalizedBalance {
    /// 原生币 + 所有代币价值（未知价格的代币计为 0）
    pub fn total_value_usd(&self) -> f64 {
        self.native_value_usd + self.tokens.iter().map(|t| t.value_usd).sum::<f64>()
    }

    pub fn native_value_display(&self) -> String {
        format_usd(self.native_value_usd)
    }

    pub fn total_value_display(&self) -> String {
        format_usd(self.total_value_usd())
    }
}

pub(crate) fn decimal_to_f64(value: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    value.to_f64().unwrap_or(0.0)
}
