//! 历史区间与采样粒度
//!
//! 所有序列类型（加密货币、股票、贵金属）共用同一张区间表。

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 用户可选的历史区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1D")]
    Day,
    #[serde(rename = "1W")]
    Week,
    #[serde(rename = "1M")]
    Month,
    #[serde(rename = "3M")]
    ThreeMonths,
    #[serde(rename = "1Y")]
    Year,
    #[serde(rename = "ALL")]
    All,
}

/// 采样粒度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleInterval {
    Hourly,
    Daily,
    Weekly,
}

impl SampleInterval {
    pub fn seconds(&self) -> i64 {
        match self {
            SampleInterval::Hourly => 3_600,
            SampleInterval::Daily => 86_400,
            SampleInterval::Weekly => 7 * 86_400,
        }
    }

    /// 日期标签格式，同一粒度下不同来源的同一时刻得到相同标签
    pub fn label(&self, ts: DateTime<Utc>) -> String {
        match self {
            SampleInterval::Hourly => ts.format("%Y-%m-%d %H:00").to_string(),
            SampleInterval::Daily | SampleInterval::Weekly => ts.format("%Y-%m-%d").to_string(),
        }
    }
}

/// 区间表的一行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub interval: SampleInterval,
    pub lookback_days: u32,
}

impl RangeSpec {
    /// 按上游可提供的最长历史截断回看天数
    pub fn clipped(self, max_history_days: u32) -> RangeSpec {
        RangeSpec {
            interval: self.interval,
            lookback_days: self.lookback_days.min(max_history_days).max(1),
        }
    }
}

pub const ALL_RANGES: [TimeRange; 6] = [
    TimeRange::Day,
    TimeRange::Week,
    TimeRange::Month,
    TimeRange::ThreeMonths,
    TimeRange::Year,
    TimeRange::All,
];

impl TimeRange {
    pub fn spec(&self) -> RangeSpec {
        let (interval, lookback_days) = match self {
            TimeRange::Day => (SampleInterval::Hourly, 1),
            TimeRange::Week => (SampleInterval::Hourly, 7),
            TimeRange::Month => (SampleInterval::Daily, 30),
            TimeRange::ThreeMonths => (SampleInterval::Daily, 90),
            TimeRange::Year => (SampleInterval::Daily, 365),
            TimeRange::All => (SampleInterval::Weekly, 3650),
        };
        RangeSpec {
            interval,
            lookback_days,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Day => "1D",
            TimeRange::Week => "1W",
            TimeRange::Month => "1M",
            TimeRange::ThreeMonths => "3M",
            TimeRange::Year => "1Y",
            TimeRange::All => "ALL",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        ALL_RANGES
            .into_iter()
            .find(|r| r.as_str() == upper)
            .ok_or_else(|| anyhow::anyhow!("Unknown time range: {} (expected 1D/1W/1M/3M/1Y/ALL)", s))
    }
}

/// 单个价格点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// 按粒度降采样：每个时间桶保留最后一个点，输出按时间升序
pub fn downsample(mut points: Vec<PricePoint>, interval: SampleInterval) -> Vec<PricePoint> {
    points.sort_by_key(|p| p.timestamp);
    let bucket = interval.seconds();
    let mut out: Vec<PricePoint> = Vec::with_capacity(points.len());
    for point in points {
        let key = point.timestamp.timestamp().div_euclid(bucket);
        match out.last_mut() {
            Some(last) if last.timestamp.timestamp().div_euclid(bucket) == key => *last = point,
            _ => out.push(point),
        }
    }
    out
}
