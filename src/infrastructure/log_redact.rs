//! 日志脱敏
//! 地址、身份标识、助记词在写入日志前统一经过这里

use serde::Serialize;

use crate::domain::models::Wallet;

/// 可脱敏trait
pub trait SensitiveRedact {
    fn redact(&self) -> String;
}

/// 脱敏地址（显示前6位和后4位）
pub fn redact_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() < 10 {
        return "*".repeat(chars.len());
    }

    let prefix: String = chars[..6].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", prefix, suffix)
}

/// 脱敏email（身份标识通常是邮箱）
pub fn redact_email(email: &str) -> String {
    if let Some(at_pos) = email.find('@') {
        let local = &email[..at_pos];
        let domain = &email[at_pos..];

        match local.chars().next() {
            Some(first) if local.chars().count() > 2 => format!("{}***{}", first, domain),
            _ => format!("**{}", domain),
        }
    } else {
        "***@***".to_string()
    }
}

/// 助记词只记录词数
pub fn redact_secret(secret: &str) -> String {
    format!("[REDACTED {} words]", secret.split_whitespace().count())
}

/// 钱包日志视图
#[derive(Debug, Serialize)]
pub struct RedactedWallet {
    pub id: String,
    pub chain: String,
    pub address: String,
    pub has_secret: bool,
    // ❌ 不包含：encrypted_secret, note
}

impl SensitiveRedact for Wallet {
    fn redact(&self) -> String {
        serde_json::to_string(&RedactedWallet {
            id: self.id.to_string(),
            chain: self.chain.clone(),
            address: redact_address(&self.address),
            has_secret: self.has_secret(),
        })
        .unwrap_or_else(|_| "{ redacted }".to_string())
    }
}
