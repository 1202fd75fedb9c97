//! 带 TTL 的价格缓存
//!
//! 命中且未过期 → 不发请求；未命中或过期 → 请求上游，成功覆盖旧值；
//! 上游失败 → 返回过期旧值（若有），否则返回 0（0 表示"无数据"）。
//! 同一个键的并发未命中只会产生一次上游请求。

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{error::PriceError, service::price_service::SpotPriceSource};

/// 可注入的时钟
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// 缓存条目
#[derive(Debug, Clone, PartialEq)]
pub struct PriceCacheEntry {
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
}

enum CacheKey<'a> {
    Spot(&'a str),
    Token { platform: &'a str, contract: &'a str },
}

impl CacheKey<'_> {
    /// 大小写不敏感
    fn normalized(&self) -> String {
        match self {
            CacheKey::Spot(symbol) => symbol.trim().to_lowercase(),
            CacheKey::Token { platform, contract } => {
                format!("token:{}:{}", platform.to_lowercase(), contract.trim().to_lowercase())
            }
        }
    }
}

pub struct PriceCache {
    source: Arc<dyn SpotPriceSource>,
    ttl: chrono::Duration,
    clock: Clock,
    entries: RwLock<HashMap<String, PriceCacheEntry>>,
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PriceCache {
    pub fn new(source: Arc<dyn SpotPriceSource>, ttl: Duration) -> Self {
        Self::with_clock(source, ttl, Arc::new(Utc::now))
    }

    pub fn with_clock(source: Arc<dyn SpotPriceSource>, ttl: Duration, clock: Clock) -> Self {
        Self {
            source,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::minutes(5)),
            clock,
            entries: RwLock::new(HashMap::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 美元现价，0 表示无数据
    pub async fn get_spot(&self, symbol: &str) -> f64 {
        self.try_get_spot(symbol).await.unwrap_or(0.0)
    }

    pub async fn try_get_spot(&self, symbol: &str) -> Result<f64, PriceError> {
        self.resolve(CacheKey::Spot(symbol)).await
    }

    /// 合约代币美元现价，0 表示无数据
    pub async fn get_token_price(&self, platform: &str, contract: &str) -> f64 {
        self.resolve(CacheKey::Token { platform, contract })
            .await
            .unwrap_or(0.0)
    }

    /// 查看缓存条目（不触发请求）
    pub async fn peek(&self, symbol: &str) -> Option<PriceCacheEntry> {
        let key = CacheKey::Spot(symbol).normalized();
        self.entries.read().await.get(&key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    async fn fresh(&self, key: &str) -> Option<f64> {
        let now = (self.clock)();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|e| now - e.fetched_at < self.ttl)
            .map(|e| e.price)
    }

    fn fetch_slot<'a>(&'a self, key: &'a str) -> FetchSlot<'a> {
        let mut locks = self
            .fetch_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        FetchSlot {
            cache: self,
            key,
            lock: locks.entry(key.to_string()).or_default().clone(),
        }
    }

    #[cfg(test)]
    fn pending_fetch_locks(&self) -> usize {
        self.fetch_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    async fn resolve(&self, key: CacheKey<'_>) -> Result<f64, PriceError> {
        let normalized = key.normalized();

        if let Some(price) = self.fresh(&normalized).await {
            return Ok(price);
        }

        let slot = self.fetch_slot(&normalized);
        let _guard = slot.lock.lock().await;

        // 等锁期间可能已被其他任务刷新
        if let Some(price) = self.fresh(&normalized).await {
            return Ok(price);
        }

        let fetched = match key {
            CacheKey::Spot(symbol) => self.source.fetch_spot(symbol).await,
            CacheKey::Token { platform, contract } => {
                self.source.fetch_token_price(platform, contract).await
            }
        };

        match fetched {
            Ok(price) => {
                let entry = PriceCacheEntry {
                    price,
                    fetched_at: (self.clock)(),
                };
                self.entries.write().await.insert(normalized.clone(), entry);
                Ok(price)
            }
            Err(e) => {
                let stale = self.entries.read().await.get(&normalized).map(|entry| entry.price);
                match stale {
                    Some(price) => {
                        tracing::warn!(key = %normalized, error = %e, "Price upstream failed, serving stale value");
                        Ok(price)
                    }
                    None => {
                        tracing::warn!(key = %normalized, error = %e, "Price unavailable");
                        Err(e)
                    }
                }
            }
        }
    }
}

/// 单键请求锁的持有者；最后一个持有者离开时从映射表中移除该键
struct FetchSlot<'a> {
    cache: &'a PriceCache,
    key: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for FetchSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .cache
            .fetch_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // 映射表 + 自身 = 2，克隆只能在持有映射表锁时发生
        if Arc::strong_count(&self.lock) <= 2 {
            locks.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::TimeZone;

    use super::*;
    use crate::error::AdapterError;

    #[derive(Default)]
    struct FakeSource {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl SpotPriceSource for FakeSource {
        async fn fetch_spot(&self, symbol: &str) -> Result<f64, PriceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(AdapterError::Status(503).into());
            }
            match symbol.to_uppercase().as_str() {
                "BTC" => Ok(50000.0),
                "ETH" => Ok(2500.0),
                _ => Err(PriceError::Unavailable(symbol.to_string())),
            }
        }
    }

    fn manual_clock(start: DateTime<Utc>) -> (Clock, Arc<Mutex<DateTime<Utc>>>) {
        let now = Arc::new(Mutex::new(start));
        let handle = now.clone();
        let clock: Clock = Arc::new(move || *handle.lock().unwrap());
        (clock, now)
    }

    #[tokio::test]
    async fn test_two_calls_within_ttl_hit_upstream_once() {
        let source = Arc::new(FakeSource::default());
        let cache = PriceCache::new(source.clone(), Duration::from_secs(300));

        assert_eq!(cache.get_spot("BTC").await, 50000.0);
        assert_eq!(cache.get_spot("btc").await, 50000.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_value_served_when_upstream_fails() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let (clock, now) = manual_clock(t0);
        let source = Arc::new(FakeSource::default());
        let cache = PriceCache::with_clock(source.clone(), Duration::from_secs(300), clock);

        assert_eq!(cache.get_spot("BTC").await, 50000.0);

        *now.lock().unwrap() = t0 + chrono::Duration::minutes(6);
        source.failing.store(true, Ordering::SeqCst);

        assert_eq!(cache.get_spot("BTC").await, 50000.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        // 过期值不刷新时间戳
        assert_eq!(cache.peek("BTC").await.unwrap().fetched_at, t0);
    }

    #[tokio::test]
    async fn test_no_data_returns_zero() {
        let source = Arc::new(FakeSource::default());
        let cache = PriceCache::new(source.clone(), Duration::from_secs(300));

        assert_eq!(cache.get_spot("UNKNOWN").await, 0.0);
        assert!(cache.try_get_spot("UNKNOWN").await.is_err());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_entry_refetched_on_success() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let (clock, now) = manual_clock(t0);
        let source = Arc::new(FakeSource::default());
        let cache = PriceCache::with_clock(source.clone(), Duration::from_secs(300), clock);

        cache.get_spot("ETH").await;
        *now.lock().unwrap() = t0 + chrono::Duration::minutes(4);
        cache.get_spot("ETH").await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        *now.lock().unwrap() = t0 + chrono::Duration::minutes(5);
        cache.get_spot("ETH").await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_fetch() {
        let source = Arc::new(FakeSource::default());
        let cache = Arc::new(PriceCache::new(source.clone(), Duration::from_secs(300)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.get_spot("ETH").await })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap(), 2500.0);
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.pending_fetch_locks(), 0);
    }

    #[tokio::test]
    async fn test_fetch_locks_released_after_many_keys() {
        let source = Arc::new(FakeSource::default());
        let cache = Arc::new(PriceCache::new(source.clone(), Duration::from_secs(300)));

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache.get_token_price("ethereum", &format!("0x{:040x}", i)).await
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.await.unwrap(), 0.0);
        }
        cache.get_spot("BTC").await;
        cache.get_spot("BTC").await;

        assert_eq!(cache.pending_fetch_locks(), 0);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_releases_lock() {
        struct SlowSource;

        #[async_trait]
        impl SpotPriceSource for SlowSource {
            async fn fetch_spot(&self, _symbol: &str) -> Result<f64, PriceError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1.0)
            }
        }

        let cache = PriceCache::new(Arc::new(SlowSource), Duration::from_secs(300));
        let result = tokio::time::timeout(Duration::from_secs(1), cache.get_spot("SOL")).await;
        assert!(result.is_err());
        assert_eq!(cache.pending_fetch_locks(), 0);
    }

    #[tokio::test]
    async fn test_token_price_without_source_support_is_zero() {
        let source = Arc::new(FakeSource::default());
        let cache = PriceCache::new(source, Duration::from_secs(300));
        assert_eq!(cache.get_token_price("ethereum", "0xdead").await, 0.0);
    }
}
