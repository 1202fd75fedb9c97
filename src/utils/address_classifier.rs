//! 地址格式识别模块
//!
//! 根据地址文本判断可能所属的链。规则按优先级依次匹配，命中即返回：
//! 比特币规则必须先于 Solana 规则，否则 `bc1…`/`1…` 会被误判为 Base58。
//! 结果只用于预选和提示，链选择与识别结果不一致时仍允许保存。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::chain::{ChainId, EVM_CHAINS};

static BTC_LEGACY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[13][1-9A-HJ-NP-Za-km-z]{25,34}$").expect("valid regex"));
static BTC_BECH32: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(bc1|BC1)[02-9ac-hj-np-zAC-HJ-NP-Z]{25,87}$").expect("valid regex"));
static RIPPLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^r[1-9A-HJ-NP-Za-km-z]{24,34}$").expect("valid regex"));
static CARDANO_SHELLEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^addr1[02-9ac-hj-np-z]{53,99}$").expect("valid regex"));
static BASE58_32_44: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").expect("valid regex"));
static EVM_HEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid regex"));

/// 地址格式标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressFormat {
    Invalid,
    BitcoinLegacy,
    BitcoinP2sh,
    BitcoinBech32,
    Ripple,
    CardanoShelley,
    Solana,
    Evm,
    Unknown,
}

impl AddressFormat {
    pub fn label(&self) -> &'static str {
        match self {
            AddressFormat::Invalid => "invalid",
            AddressFormat::BitcoinLegacy => "bitcoin-legacy",
            AddressFormat::BitcoinP2sh => "bitcoin-p2sh",
            AddressFormat::BitcoinBech32 => "bitcoin-bech32",
            AddressFormat::Ripple => "ripple",
            AddressFormat::CardanoShelley => "cardano-shelley",
            AddressFormat::Solana => "solana",
            AddressFormat::Evm => "evm",
            AddressFormat::Unknown => "unknown",
        }
    }
}

/// 识别结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub candidates: Vec<ChainId>,
    /// 格式无法区分具体链（EVM 地址）
    pub ambiguous: bool,
    pub format: AddressFormat,
    /// 混合大小写 EVM 地址的 EIP-55 校验结果；其它情况为 None
    pub checksum_valid: Option<bool>,
}

impl Classification {
    fn single(chain: ChainId, format: AddressFormat) -> Self {
        Self {
            candidates: vec![chain],
            ambiguous: false,
            format,
            checksum_valid: None,
        }
    }

    fn none(format: AddressFormat) -> Self {
        Self {
            candidates: vec![],
            ambiguous: false,
            format,
            checksum_valid: None,
        }
    }

    pub fn format_label(&self) -> &'static str {
        self.format.label()
    }
}

/// 链选择与地址格式不一致时的提示（不阻止保存）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainMismatchWarning {
    pub selected: String,
    pub detected: Vec<ChainId>,
    pub message: String,
}

/// 识别地址可能所属的链
pub fn classify(address: &str) -> Classification {
    let address = address.trim();

    if address.is_empty() {
        return Classification::none(AddressFormat::Invalid);
    }

    if BTC_LEGACY.is_match(address) {
        let format = if address.starts_with('1') {
            AddressFormat::BitcoinLegacy
        } else {
            AddressFormat::BitcoinP2sh
        };
        return Classification::single(ChainId::Bitcoin, format);
    }
    if BTC_BECH32.is_match(address) {
        return Classification::single(ChainId::Bitcoin, AddressFormat::BitcoinBech32);
    }

    if RIPPLE.is_match(address) {
        return Classification::single(ChainId::Ripple, AddressFormat::Ripple);
    }

    if CARDANO_SHELLEY.is_match(address) {
        return Classification::single(ChainId::Cardano, AddressFormat::CardanoShelley);
    }

    if BASE58_32_44.is_match(address)
        && !address.starts_with('1')
        && !address.starts_with('3')
        && !address.starts_with("bc1")
    {
        return Classification::single(ChainId::Solana, AddressFormat::Solana);
    }

    if EVM_HEX.is_match(address) {
        let hex_part = &address[2..];
        let mixed_case = hex_part.chars().any(|c| c.is_ascii_uppercase())
            && hex_part.chars().any(|c| c.is_ascii_lowercase());
        return Classification {
            candidates: EVM_CHAINS.to_vec(),
            ambiguous: true,
            format: AddressFormat::Evm,
            checksum_valid: mixed_case.then(|| verify_eip55_checksum(address)),
        };
    }

    Classification::none(AddressFormat::Unknown)
}

/// 检查用户选择的链与地址格式是否一致
///
/// 地址无法识别时不给出提示（无从判断）。
pub fn check_selection(address: &str, selected_chain: &str) -> Option<ChainMismatchWarning> {
    let classification = classify(address);
    if classification.candidates.is_empty() {
        return None;
    }

    let consistent = ChainId::parse(selected_chain)
        .map(|chain| classification.candidates.contains(&chain))
        .unwrap_or(false);
    if consistent {
        return None;
    }

    let detected_names: Vec<&str> = classification.candidates.iter().map(|c| c.as_str()).collect();
    Some(ChainMismatchWarning {
        selected: selected_chain.to_string(),
        detected: classification.candidates.clone(),
        message: format!(
            "Address looks like {} ({}), but '{}' was selected",
            detected_names.join("/"),
            classification.format_label(),
            selected_chain
        ),
    })
}

/// 验证EIP-55 Checksum
/// https://eips.ethereum.org/EIPS/eip-55
fn verify_eip55_checksum(address: &str) -> bool {
    use sha3::{Digest, Keccak256};

    let hex_chars = &address[2..];
    let hash = Keccak256::digest(hex_chars.to_lowercase().as_bytes());

    hex_chars.chars().enumerate().all(|(i, ch)| {
        if !ch.is_ascii_alphabetic() {
            return true;
        }
        let hash_byte = hash[i / 2];
        let nibble = if i % 2 == 0 {
            hash_byte >> 4
        } else {
            hash_byte & 0x0f
        };
        ch.is_ascii_uppercase() == (nibble >= 8)
    })
}
