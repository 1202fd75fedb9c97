//! 价格源
//!
//! - `CoinGeckoClient`：加密货币现价、合约代币现价、历史行情
//! - `QuoteClient`：股票/贵金属报价（Yahoo chart 接口格式）
//!
//! 两者都只做单次请求与解析，缓存与降级由 `PriceCache` 负责。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;

use crate::{
    config::PriceConfig,
    domain::time_range::{downsample, PricePoint, SampleInterval, TimeRange},
    error::{AdapterError, PriceError},
    infrastructure::upstream::UpstreamClient,
};

/// 现价来源
#[async_trait]
pub trait SpotPriceSource: Send + Sync {
    /// 按符号查询美元现价（ETH、AAPL、XAU ...）
    async fn fetch_spot(&self, symbol: &str) -> Result<f64, PriceError>;

    /// 按合约地址查询代币美元现价
    async fn fetch_token_price(&self, platform: &str, contract: &str) -> Result<f64, PriceError> {
        Err(PriceError::Unavailable(format!("{}:{}", platform, contract)))
    }
}

/// 历史价格来源
#[async_trait]
pub trait HistoricalPriceSource: Send + Sync {
    async fn fetch_history(&self, symbol: &str, range: TimeRange)
        -> Result<Vec<PricePoint>, PriceError>;
}

/// 符号转 CoinGecko ID
pub fn symbol_to_coingecko_id(symbol: &str) -> String {
    let lower = symbol.trim().to_lowercase();
    match lower.as_str() {
        "eth" => "ethereum",
        "btc" => "bitcoin",
        "sol" => "solana",
        "bnb" => "binancecoin",
        "matic" | "pol" => "matic-network",
        "xrp" => "ripple",
        "ada" => "cardano",
        "avax" => "avalanche-2",
        "dot" => "polkadot",
        "usdt" => "tether",
        "usdc" => "usd-coin",
        "dai" => "dai",
        "link" => "chainlink",
        _ => return lower,
    }
    .to_string()
}

/// 贵金属代码转期货报价符号，其他符号原样返回（大写）
pub fn quote_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    match upper.as_str() {
        "XAU" | "GOLD" => "GC=F".to_string(),
        "XAG" | "SILVER" => "SI=F".to_string(),
        "XPT" | "PLATINUM" => "PL=F".to_string(),
        "XPD" | "PALLADIUM" => "PA=F".to_string(),
        _ => upper,
    }
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    usd: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<(f64, f64)>,
}

/// CoinGecko 客户端
pub struct CoinGeckoClient {
    http: UpstreamClient,
    base_url: String,
    api_key: Option<String>,
    max_history_days: u32,
}

impl CoinGeckoClient {
    pub fn new(http: UpstreamClient, config: &PriceConfig) -> Self {
        Self {
            http,
            base_url: config.coingecko_base_url.trim_end_matches('/').to_string(),
            api_key: config.coingecko_api_key.clone(),
            max_history_days: config.max_history_days,
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, AdapterError> {
        let url = format!("{}{}", self.base_url, path);
        let mut query = query.to_vec();
        if let Some(key) = &self.api_key {
            query.push(("x_cg_demo_api_key", key.as_str()));
        }
        self.http.get_json(&url, &query).await
    }
}

#[async_trait]
impl SpotPriceSource for CoinGeckoClient {
    async fn fetch_spot(&self, symbol: &str) -> Result<f64, PriceError> {
        let coin_id = symbol_to_coingecko_id(symbol);
        tracing::debug!(symbol, coin_id = %coin_id, "Fetching spot price from CoinGecko");

        let data: HashMap<String, UsdQuote> = self
            .get("/simple/price", &[("ids", coin_id.as_str()), ("vs_currencies", "usd")])
            .await?;

        data.get(&coin_id)
            .and_then(|q| q.usd)
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| PriceError::Unavailable(symbol.to_string()))
    }

    async fn fetch_token_price(&self, platform: &str, contract: &str) -> Result<f64, PriceError> {
        let contract = contract.to_lowercase();
        let data: HashMap<String, UsdQuote> = self
            .get(
                &format!("/simple/token_price/{}", platform),
                &[("contract_addresses", contract.as_str()), ("vs_currencies", "usd")],
            )
            .await?;

        // 返回的键为小写合约地址
        data.iter()
            .find(|(k, _)| k.to_lowercase() == contract)
            .and_then(|(_, q)| q.usd)
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| PriceError::Unavailable(format!("{}:{}", platform, contract)))
    }
}

#[async_trait]
impl HistoricalPriceSource for CoinGeckoClient {
    async fn fetch_history(
        &self,
        symbol: &str,
        range: TimeRange,
    ) -> Result<Vec<PricePoint>, PriceError> {
        let spec = range.spec().clipped(self.max_history_days);
        let coin_id = symbol_to_coingecko_id(symbol);
        let days = spec.lookback_days.to_string();

        let mut query = vec![("vs_currency", "usd"), ("days", days.as_str())];
        if spec.interval != SampleInterval::Hourly {
            query.push(("interval", "daily"));
        }

        let chart: MarketChart = self
            .get(&format!("/coins/{}/market_chart", coin_id), &query)
            .await?;

        let points: Vec<PricePoint> = chart
            .prices
            .into_iter()
            .filter_map(|(ms, price)| {
                let timestamp = Utc.timestamp_millis_opt(ms as i64).single()?;
                (price.is_finite() && price > 0.0).then_some(PricePoint { timestamp, price })
            })
            .collect();

        if points.is_empty() {
            return Err(PriceError::Unavailable(format!("{} history", symbol)));
        }
        Ok(downsample(points, spec.interval))
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

impl ChartResult {
    fn points(&self) -> Vec<PricePoint> {
        let closes = match self.indicators.quote.first() {
            Some(q) => &q.close,
            None => return Vec::new(),
        };
        self.timestamp
            .iter()
            .zip(closes.iter())
            .filter_map(|(ts, close)| {
                let price = (*close)?;
                let timestamp = Utc.timestamp_opt(*ts, 0).single()?;
                (price.is_finite() && price > 0.0).then_some(PricePoint { timestamp, price })
            })
            .collect()
    }
}

/// 回看天数 → chart 接口的 range 参数（取能覆盖回看期的最小档位）
fn chart_range(lookback_days: u32) -> &'static str {
    match lookback_days {
        0..=1 => "1d",
        2..=7 => "5d",
        8..=31 => "1mo",
        32..=92 => "3mo",
        93..=183 => "6mo",
        184..=366 => "1y",
        367..=731 => "2y",
        732..=1827 => "5y",
        1828..=3653 => "10y",
        _ => "max",
    }
}

fn chart_interval(interval: SampleInterval) -> &'static str {
    match interval {
        SampleInterval::Hourly => "1h",
        SampleInterval::Daily => "1d",
        SampleInterval::Weekly => "1wk",
    }
}

/// 股票/贵金属报价客户端
pub struct QuoteClient {
    http: UpstreamClient,
    base_url: String,
    max_history_days: u32,
}

impl QuoteClient {
    pub fn new(http: UpstreamClient, config: &PriceConfig) -> Self {
        Self {
            http,
            base_url: config.quotes_base_url.trim_end_matches('/').to_string(),
            max_history_days: config.quotes_max_history_days,
        }
    }

    async fn chart(&self, symbol: &str, range: &str, interval: &str) -> Result<ChartResult, PriceError> {
        let symbol = quote_symbol(symbol);
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let envelope: ChartEnvelope = self
            .http
            .get_json(&url, &[("range", range), ("interval", interval)])
            .await?;

        if let Some(err) = envelope.chart.error.filter(|e| !e.is_null()) {
            return Err(AdapterError::Upstream(err.to_string()).into());
        }

        envelope
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or(PriceError::Unavailable(symbol))
    }
}

#[async_trait]
impl SpotPriceSource for QuoteClient {
    async fn fetch_spot(&self, symbol: &str) -> Result<f64, PriceError> {
        let result = self.chart(symbol, "5d", "1d").await?;
        let from_meta = result
            .meta
            .as_ref()
            .and_then(|m| m.regular_market_price)
            .filter(|p| p.is_finite() && *p > 0.0);

        from_meta
            .or_else(|| result.points().last().map(|p| p.price))
            .ok_or_else(|| PriceError::Unavailable(symbol.to_string()))
    }
}

#[async_trait]
impl HistoricalPriceSource for QuoteClient {
    async fn fetch_history(
        &self,
        symbol: &str,
        range: TimeRange,
    ) -> Result<Vec<PricePoint>, PriceError> {
        let spec = range.spec().clipped(self.max_history_days);
        let result = self
            .chart(symbol, chart_range(spec.lookback_days), chart_interval(spec.interval))
            .await?;

        let points = result.points();
        if points.is_empty() {
            return Err(PriceError::Unavailable(format!("{} history", symbol)));
        }
        Ok(downsample(points, spec.interval))
    }
}
