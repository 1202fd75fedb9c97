//! 估值引擎（纯计算，无 I/O）
//!
//! 总值 = Σ 钱包（原生币 + 代币）美元价值 + Σ 手动持仓数量 × 当前单价；
//! 手动持仓无实时价格时按成本价计值。

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::models::{AssetClass, ManualPosition, NormalizedBalance, Wallet},
    service::history_builder::TimePoint,
};

/// 持仓来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldingKind {
    Wallet,
    Position,
}

/// 单项持仓估值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub id: Uuid,
    pub kind: HoldingKind,
    pub name: String,
    pub asset_class: AssetClass,
    pub current_value_usd: f64,
    /// 钱包无成本信息
    pub cost_basis_usd: Option<f64>,
    pub pnl_usd: Option<f64>,
    /// 成本为 0 时没有百分比
    pub pnl_pct: Option<f64>,
    /// false 表示按成本价计值（无实时价格）
    pub live_price: bool,
}

/// 按资产类别的配置比例
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSlice {
    pub asset_class: AssetClass,
    pub value_usd: f64,
    pub percentage: f64,
}

/// 组合估值结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub total_value_usd: f64,
    pub wallets_value_usd: f64,
    pub positions_value_usd: f64,
    pub total_cost_basis_usd: f64,
    pub holdings: Vec<HoldingValuation>,
    pub allocation: Vec<AllocationSlice>,
}

/// 区间表现
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub start_value_usd: f64,
    pub end_value_usd: f64,
    pub change_usd: f64,
    pub change_pct: Option<f64>,
}

pub struct ValuationEngine;

impl ValuationEngine {
    /// `balances`：钱包 id → 余额
    /// `unit_prices`：手动持仓 id → 报价单位下的实时单价（缺失或 ≤0 视为无价格）
    pub fn value(
        wallets: &[Wallet],
        balances: &HashMap<Uuid, NormalizedBalance>,
        positions: &[ManualPosition],
        unit_prices: &HashMap<Uuid, f64>,
    ) -> Valuation {
        let mut holdings = Vec::with_capacity(wallets.len() + positions.len());

        for wallet in wallets {
            // 余额缺失的钱包（刷新失败或不支持的链）不计入
            let Some(balance) = balances.get(&wallet.id) else {
                continue;
            };
            holdings.push(HoldingValuation {
                id: wallet.id,
                kind: HoldingKind::Wallet,
                name: wallet.name.clone(),
                asset_class: AssetClass::Crypto,
                current_value_usd: balance.total_value_usd(),
                cost_basis_usd: None,
                pnl_usd: None,
                pnl_pct: None,
                live_price: balance.native_price_usd > 0.0,
            });
        }

        for position in positions {
            holdings.push(Self::value_position(position, unit_prices.get(&position.id).copied()));
        }

        let sum_by = |kind: HoldingKind| -> f64 {
            holdings
                .iter()
                .filter(|h| h.kind == kind)
                .map(|h| h.current_value_usd)
                .sum()
        };
        let wallets_value_usd = sum_by(HoldingKind::Wallet);
        let positions_value_usd = sum_by(HoldingKind::Position);
        let total_value_usd = wallets_value_usd + positions_value_usd;
        let total_cost_basis_usd = holdings.iter().filter_map(|h| h.cost_basis_usd).sum();

        Valuation {
            allocation: Self::allocation(&holdings, total_value_usd),
            total_value_usd,
            wallets_value_usd,
            positions_value_usd,
            total_cost_basis_usd,
            holdings,
        }
    }

    fn value_position(position: &ManualPosition, unit_price: Option<f64>) -> HoldingValuation {
        let cost_basis = position.cost_basis();
        let live = unit_price.filter(|p| p.is_finite() && *p > 0.0);

        let current_value_usd = match live {
            Some(price) => position.priced_quantity() * price,
            None => cost_basis,
        };
        let pnl = current_value_usd - cost_basis;

        HoldingValuation {
            id: position.id,
            kind: HoldingKind::Position,
            name: position.name.clone(),
            asset_class: position.asset_class,
            current_value_usd,
            cost_basis_usd: Some(cost_basis),
            pnl_usd: Some(pnl),
            pnl_pct: (cost_basis != 0.0).then(|| pnl / cost_basis * 100.0),
            live_price: live.is_some(),
        }
    }

    fn allocation(holdings: &[HoldingValuation], total: f64) -> Vec<AllocationSlice> {
        let mut by_class: BTreeMap<AssetClass, f64> = BTreeMap::new();
        for h in holdings {
            *by_class.entry(h.asset_class).or_default() += h.current_value_usd;
        }

        by_class
            .into_iter()
            .map(|(asset_class, value_usd)| AllocationSlice {
                asset_class,
                value_usd,
                percentage: if total > 0.0 { value_usd / total * 100.0 } else { 0.0 },
            })
            .collect()
    }

    /// 历史序列首尾变化
    pub fn performance(series: &[TimePoint]) -> Option<Performance> {
        let start = series.first()?.value_usd;
        let end = series.last()?.value_usd;
        let change = end - start;
        Some(Performance {
            start_value_usd: start,
            end_value_usd: end,
            change_usd: change,
            change_pct: (start != 0.0).then(|| change / start * 100.0),
        })
    }
}
