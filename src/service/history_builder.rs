//! 组合历史序列构建
//!
//! 输入若干资产价格序列（各自粒度不同），输出一条组合价值时间线：
//! - 存在锚定序列（加密货币序列中点数最多者）时，以其时间轴为准，
//!   其他序列按比例索引 `round(i/(n-1) * (m-1))` 重采样
//! - 否则以最长序列的日期标签为时间轴，按标签精确匹配；
//!   某序列缺失某标签时沿用该序列上一个已知价格

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    models::AssetClass,
    time_range::{PricePoint, SampleInterval, TimeRange},
};

/// 一条资产价格序列及持有数量
#[derive(Debug, Clone)]
pub struct AssetSeries {
    pub label: String,
    pub asset_class: AssetClass,
    /// 报价单位下的持有数量
    pub quantity: f64,
    pub points: Vec<PricePoint>,
}

/// 组合价值时间点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePoint {
    pub timestamp: DateTime<Utc>,
    pub label: String,
    pub value_usd: f64,
}

/// 比例索引：长度 n 的时间轴上第 i 个点对应长度 m 序列中的下标
pub fn proportional_index(i: usize, n: usize, m: usize) -> usize {
    if m == 0 {
        return 0;
    }
    if n <= 1 {
        return m - 1;
    }
    let idx = (i as f64 / (n - 1) as f64 * (m - 1) as f64).round() as usize;
    idx.min(m - 1)
}

pub struct HistoricalSeriesBuilder;

impl HistoricalSeriesBuilder {
    pub fn build(range: TimeRange, series: &[AssetSeries]) -> Vec<TimePoint> {
        let interval = range.spec().interval;
        let usable: Vec<&AssetSeries> = series.iter().filter(|s| !s.points.is_empty()).collect();
        if usable.is_empty() {
            return Vec::new();
        }

        let anchor = usable
            .iter()
            .filter(|s| s.asset_class == AssetClass::Crypto)
            .max_by_key(|s| s.points.len());

        match anchor {
            Some(anchor) => Self::resample_on_anchor(anchor, &usable, interval),
            None => Self::align_by_label(&usable, interval),
        }
    }

    fn resample_on_anchor(
        anchor: &AssetSeries,
        series: &[&AssetSeries],
        interval: SampleInterval,
    ) -> Vec<TimePoint> {
        let n = anchor.points.len();
        (0..n)
            .map(|i| {
                let value_usd = series
                    .iter()
                    .map(|s| {
                        let j = proportional_index(i, n, s.points.len());
                        s.quantity * s.points[j].price
                    })
                    .sum();
                let timestamp = anchor.points[i].timestamp;
                TimePoint {
                    timestamp,
                    label: interval.label(timestamp),
                    value_usd,
                }
            })
            .collect()
    }

    fn align_by_label(series: &[&AssetSeries], interval: SampleInterval) -> Vec<TimePoint> {
        let Some(base) = series.iter().max_by_key(|s| s.points.len()) else {
            return Vec::new();
        };

        let by_label: Vec<HashMap<String, f64>> = series
            .iter()
            .map(|s| {
                s.points
                    .iter()
                    .map(|p| (interval.label(p.timestamp), p.price))
                    .collect()
            })
            .collect();

        let mut last_known: Vec<Option<f64>> = vec![None; series.len()];
        base.points
            .iter()
            .map(|p| {
                let label = interval.label(p.timestamp);
                let mut value_usd = 0.0;
                for (k, s) in series.iter().enumerate() {
                    if let Some(price) = by_label[k].get(&label) {
                        last_known[k] = Some(*price);
                    }
                    if let Some(price) = last_known[k] {
                        value_usd += s.quantity * price;
                    }
                }
                TimePoint {
                    timestamp: p.timestamp,
                    label,
                    value_usd,
                }
            })
            .collect()
    }
}
