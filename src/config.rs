//! 配置管理模块
//! 支持从环境变量和配置文件加载配置

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::chain::ChainId;

/// 应用配置结构体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub price: PriceConfig,
    #[serde(default)]
    pub explorers: ExplorersConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "text"
}

/// 外部HTTP调用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// 每个外部请求的超时时间
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// 价格服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// 缓存有效期
    pub ttl_secs: u64,
    pub coingecko_base_url: String,
    #[serde(default)]
    pub coingecko_api_key: Option<String>,
    /// 股票/贵金属报价服务
    pub quotes_base_url: String,
    /// 加密货币历史价格上游可保留的最长天数
    pub max_history_days: u32,
    /// 股票/贵金属历史报价上游可保留的最长天数
    #[serde(default = "default_quotes_max_history_days")]
    pub quotes_max_history_days: u32,
}

fn default_quotes_max_history_days() -> u32 {
    env_parse("QUOTES_MAX_HISTORY_DAYS", 3650)
}

/// Etherscan 系浏览器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmExplorerConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// 各链浏览器/RPC 端点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorersConfig {
    pub ethereum: EvmExplorerConfig,
    pub bsc: EvmExplorerConfig,
    pub polygon: EvmExplorerConfig,
    pub arbitrum: EvmExplorerConfig,
    pub optimism: EvmExplorerConfig,
    pub bitcoin_api_url: String,
    pub solana_rpc_url: String,
    pub ripple_rpc_url: String,
    pub cardano_api_url: String,
}

/// 余额刷新配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// 同时刷新的钱包数
    pub wallet_concurrency: usize,
    /// 单个钱包内同时查询的代币合约数
    pub token_concurrency: usize,
}

/// 敏感信息会话配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub idle_timeout_secs: u64,
    pub clipboard_clear_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: env_or("LOG_LEVEL", "info"),
            format: env_or("LOG_FORMAT", "text"),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: env_parse("HTTP_TIMEOUT_SECS", 10),
            user_agent: env_or("HTTP_USER_AGENT", "ironfolio/0.1"),
        }
    }
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            ttl_secs: env_parse("PRICE_TTL_SECS", 300), // 5分钟
            coingecko_base_url: env_or("COINGECKO_BASE_URL", "https://api.coingecko.com/api/v3"),
            coingecko_api_key: std::env::var("COINGECKO_API_KEY").ok(),
            quotes_base_url: env_or("QUOTES_BASE_URL", "https://query1.finance.yahoo.com"),
            max_history_days: env_parse("PRICE_MAX_HISTORY_DAYS", 365),
            quotes_max_history_days: default_quotes_max_history_days(),
        }
    }
}

impl EvmExplorerConfig {
    fn from_env(url_key: &str, key_key: &str, default_url: &str) -> Self {
        Self {
            base_url: env_or(url_key, default_url),
            api_key: std::env::var(key_key).ok(),
        }
    }
}

impl Default for ExplorersConfig {
    fn default() -> Self {
        Self {
            ethereum: EvmExplorerConfig::from_env(
                "ETHERSCAN_URL",
                "ETHERSCAN_API_KEY",
                "https://api.etherscan.io/api",
            ),
            bsc: EvmExplorerConfig::from_env(
                "BSCSCAN_URL",
                "BSCSCAN_API_KEY",
                "https://api.bscscan.com/api",
            ),
            polygon: EvmExplorerConfig::from_env(
                "POLYGONSCAN_URL",
                "POLYGONSCAN_API_KEY",
                "https://api.polygonscan.com/api",
            ),
            arbitrum: EvmExplorerConfig::from_env(
                "ARBISCAN_URL",
                "ARBISCAN_API_KEY",
                "https://api.arbiscan.io/api",
            ),
            optimism: EvmExplorerConfig::from_env(
                "OPTIMISM_EXPLORER_URL",
                "OPTIMISM_EXPLORER_API_KEY",
                "https://api-optimistic.etherscan.io/api",
            ),
            bitcoin_api_url: env_or("BITCOIN_API_URL", "https://blockstream.info/api"),
            solana_rpc_url: env_or("SOLANA_RPC_URL", "https://api.mainnet-beta.solana.com"),
            ripple_rpc_url: env_or("RIPPLE_RPC_URL", "https://s1.ripple.com:51234"),
            cardano_api_url: env_or("CARDANO_API_URL", "https://api.koios.rest/api/v1"),
        }
    }
}

impl ExplorersConfig {
    /// EVM 链对应的浏览器配置
    pub fn evm(&self, chain: ChainId) -> Option<&EvmExplorerConfig> {
        match chain {
            ChainId::Ethereum => Some(&self.ethereum),
            ChainId::Bsc => Some(&self.bsc),
            ChainId::Polygon => Some(&self.polygon),
            ChainId::Arbitrum => Some(&self.arbitrum),
            ChainId::Optimism => Some(&self.optimism),
            _ => None,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            wallet_concurrency: env_parse("REFRESH_WALLET_CONCURRENCY", 6),
            token_concurrency: env_parse("REFRESH_TOKEN_CONCURRENCY", 4),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: env_parse("SESSION_IDLE_TIMEOUT_SECS", 300),
            clipboard_clear_secs: env_parse("CLIPBOARD_CLEAR_SECS", 30),
        }
    }
}

impl Config {
    /// 从环境变量加载配置
    pub fn from_env() -> Result<Self> {
        Ok(Self::default())
    }

    /// 从配置文件加载配置（缺失的段落使用环境变量/默认值）
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// 从环境变量和配置文件合并加载（配置文件优先级更高）
    pub fn from_env_and_file<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let config = match path {
            Some(path) if path.as_ref().exists() => Self::from_file(path)?,
            _ => Self::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<()> {
        // 验证日志级别
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("LOG_LEVEL must be one of: {:?}", valid_levels);
        }

        // 验证日志格式
        if self.logging.format != "json" && self.logging.format != "text" {
            anyhow::bail!("LOG_FORMAT must be 'json' or 'text'");
        }

        if !(1..=60).contains(&self.http.timeout_secs) {
            anyhow::bail!("HTTP_TIMEOUT_SECS must be between 1 and 60");
        }

        if self.price.ttl_secs == 0 {
            anyhow::bail!("PRICE_TTL_SECS must be greater than 0");
        }

        if self.price.max_history_days == 0 || self.price.quotes_max_history_days == 0 {
            anyhow::bail!("PRICE_MAX_HISTORY_DAYS and QUOTES_MAX_HISTORY_DAYS must be greater than 0");
        }

        for (name, value) in [
            ("REFRESH_WALLET_CONCURRENCY", self.refresh.wallet_concurrency),
            ("REFRESH_TOKEN_CONCURRENCY", self.refresh.token_concurrency),
        ] {
            if !(1..=32).contains(&value) {
                anyhow::bail!("{} must be between 1 and 32", name);
            }
        }

        Ok(())
    }
}
