//! 链标识符模块
//!
//! 统一所有链标识符的处理逻辑：规范名称、别名、原生币精度、价格源ID

use std::{collections::HashMap, fmt, str::FromStr};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// 支持的链（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Ethereum,
    Bsc,
    Polygon,
    Arbitrum,
    Optimism,
    Bitcoin,
    Solana,
    Ripple,
    Cardano,
}

/// 链元数据
#[derive(Debug, Clone)]
pub struct ChainInfo {
    /// 规范名称（小写，用于内部处理）
    pub canonical_name: &'static str,
    /// 原生币符号
    pub symbol: &'static str,
    /// 全称
    pub full_name: &'static str,
    /// 原生币精度
    pub decimals: u32,
    /// CoinGecko coin id
    pub coingecko_id: &'static str,
    /// CoinGecko 代币平台ID（仅EVM链）
    pub token_platform: Option<&'static str>,
    pub aliases: &'static [&'static str],
}

/// 所有EVM兼容链，顺序即地址识别结果中的候选顺序
pub const EVM_CHAINS: [ChainId; 5] = [
    ChainId::Ethereum,
    ChainId::Bsc,
    ChainId::Polygon,
    ChainId::Arbitrum,
    ChainId::Optimism,
];

pub const ALL_CHAINS: [ChainId; 9] = [
    ChainId::Ethereum,
    ChainId::Bsc,
    ChainId::Polygon,
    ChainId::Arbitrum,
    ChainId::Optimism,
    ChainId::Bitcoin,
    ChainId::Solana,
    ChainId::Ripple,
    ChainId::Cardano,
];

static CHAIN_INFO: Lazy<HashMap<ChainId, ChainInfo>> = Lazy::new(|| {
    let entries = [
        (
            ChainId::Ethereum,
            ChainInfo {
                canonical_name: "ethereum",
                symbol: "ETH",
                full_name: "Ethereum Mainnet",
                decimals: 18,
                coingecko_id: "ethereum",
                token_platform: Some("ethereum"),
                aliases: &["eth", "mainnet", "1"],
            },
        ),
        (
            ChainId::Bsc,
            ChainInfo {
                canonical_name: "bsc",
                symbol: "BNB",
                full_name: "BNB Smart Chain",
                decimals: 18,
                coingecko_id: "binancecoin",
                token_platform: Some("binance-smart-chain"),
                aliases: &["binance", "bnb", "56"],
            },
        ),
        (
            ChainId::Polygon,
            ChainInfo {
                canonical_name: "polygon",
                symbol: "MATIC",
                full_name: "Polygon",
                decimals: 18,
                coingecko_id: "matic-network",
                token_platform: Some("polygon-pos"),
                aliases: &["matic", "137"],
            },
        ),
        (
            ChainId::Arbitrum,
            ChainInfo {
                canonical_name: "arbitrum",
                symbol: "ETH",
                full_name: "Arbitrum One",
                decimals: 18,
                coingecko_id: "ethereum",
                token_platform: Some("arbitrum-one"),
                aliases: &["arb", "42161"],
            },
        ),
        (
            ChainId::Optimism,
            ChainInfo {
                canonical_name: "optimism",
                symbol: "ETH",
                full_name: "Optimism",
                decimals: 18,
                coingecko_id: "ethereum",
                token_platform: Some("optimistic-ethereum"),
                aliases: &["op", "10"],
            },
        ),
        (
            ChainId::Bitcoin,
            ChainInfo {
                canonical_name: "bitcoin",
                symbol: "BTC",
                full_name: "Bitcoin",
                decimals: 8,
                coingecko_id: "bitcoin",
                token_platform: None,
                aliases: &["btc"],
            },
        ),
        (
            ChainId::Solana,
            ChainInfo {
                canonical_name: "solana",
                symbol: "SOL",
                full_name: "Solana",
                decimals: 9,
                coingecko_id: "solana",
                token_platform: None,
                aliases: &["sol"],
            },
        ),
        (
            ChainId::Ripple,
            ChainInfo {
                canonical_name: "ripple",
                symbol: "XRP",
                full_name: "XRP Ledger",
                decimals: 6,
                coingecko_id: "ripple",
                token_platform: None,
                aliases: &["xrp", "xrpl"],
            },
        ),
        (
            ChainId::Cardano,
            ChainInfo {
                canonical_name: "cardano",
                symbol: "ADA",
                full_name: "Cardano",
                decimals: 6,
                coingecko_id: "cardano",
                token_platform: None,
                aliases: &["ada"],
            },
        ),
    ];
    entries.into_iter().collect()
});

/// 别名 → 链（小写键，大小写不敏感匹配）
static ALIAS_REGISTRY: Lazy<HashMap<String, ChainId>> = Lazy::new(|| {
    let mut registry = HashMap::new();
    for chain in ALL_CHAINS {
        let info = chain.info();
        registry.insert(info.canonical_name.to_string(), chain);
        registry.insert(info.symbol.to_lowercase(), chain);
        for alias in info.aliases {
            registry.insert(alias.to_lowercase(), chain);
        }
    }
    // ETH 符号在多条L2上复用，必须指向主网
    registry.insert("eth".to_string(), ChainId::Ethereum);
    registry
});

impl ChainId {
    pub fn info(&self) -> &'static ChainInfo {
        // 每个变体都在 CHAIN_INFO 中注册
        &CHAIN_INFO[self]
    }

    pub fn as_str(&self) -> &'static str {
        self.info().canonical_name
    }

    pub fn native_symbol(&self) -> &'static str {
        self.info().symbol
    }

    pub fn decimals(&self) -> u32 {
        self.info().decimals
    }

    pub fn is_evm(&self) -> bool {
        EVM_CHAINS.contains(self)
    }

    /// 标准化链标识符，接受规范名称、符号、别名或链ID
    pub fn parse(input: &str) -> Option<ChainId> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        ALIAS_REGISTRY.get(&trimmed.to_lowercase()).copied()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ChainId::parse(s).ok_or_else(|| anyhow::anyhow!("Unsupported chain identifier: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aliases() {
        assert_eq!(ChainId::parse("ETH"), Some(ChainId::Ethereum));
        assert_eq!(ChainId::parse(" Ethereum "), Some(ChainId::Ethereum));
        assert_eq!(ChainId::parse("1"), Some(ChainId::Ethereum));
        assert_eq!(ChainId::parse("BNB"), Some(ChainId::Bsc));
        assert_eq!(ChainId::parse("matic"), Some(ChainId::Polygon));
        assert_eq!(ChainId::parse("XRP"), Some(ChainId::Ripple));
        assert_eq!(ChainId::parse("ada"), Some(ChainId::Cardano));
    }

    #[test]
    fn test_invalid_chain() {
        assert_eq!(ChainId::parse(""), None);
        assert_eq!(ChainId::parse("dogecoin"), None);
        assert!("invalid_chain".parse::<ChainId>().is_err());
    }

    #[test]
    fn test_evm_flags_and_decimals() {
        assert!(ChainId::Arbitrum.is_evm());
        assert!(!ChainId::Solana.is_evm());
        assert_eq!(ChainId::Bitcoin.decimals(), 8);
        assert_eq!(ChainId::Solana.decimals(), 9);
        assert_eq!(ChainId::Ripple.decimals(), 6);
        assert!(ChainId::Polygon.info().token_platform.is_some());
        assert!(ChainId::Cardano.info().token_platform.is_none());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&ChainId::Bsc).unwrap();
        assert_eq!(json, "\"bsc\"");
        let parsed: ChainId = serde_json::from_str("\"optimism\"").unwrap();
        assert_eq!(parsed, ChainId::Optimism);
    }
}
