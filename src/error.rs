//! 错误类型定义
//!
//! 降级类错误（AdapterError / EnrichmentError / PriceError）在组件边界内被吸收；
//! 只有 VaultError 与 RepositoryError 会通过 PortfolioError 传给调用方。

use thiserror::Error;

/// 单条链的网络调用失败
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AdapterError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to parse upstream response: {0}")]
    Parse(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Chain not supported: {0}")]
    Unsupported(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for AdapterError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AdapterError::Timeout
        } else if let Some(status) = e.status() {
            AdapterError::Status(status.as_u16())
        } else if e.is_decode() {
            AdapterError::Parse(e.to_string())
        } else {
            AdapterError::Http(e.to_string())
        }
    }
}

/// 代币发现失败（降级为仅原生币）
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnrichmentError {
    #[error("Token discovery failed: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Native balance unavailable: {0}")]
    Native(String),
}

/// 无可用价格（新鲜或过期均无）
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PriceError {
    #[error("Price unavailable for {0}")]
    Unavailable(String),

    #[error("Price upstream failed: {0}")]
    Upstream(#[from] AdapterError),
}

/// 助记词保险库错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VaultError {
    /// 身份不匹配或密文损坏/截断
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Empty input: {0}")]
    EmptyInput(&'static str),
}

/// 持久化层错误
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// 对调用方可见的错误
#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type PortfolioResult<T> = std::result::Result<T, PortfolioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vault_error_surfaces_through_portfolio_error() {
        let err: PortfolioError = VaultError::Decryption("aead tag mismatch".into()).into();
        assert!(matches!(err, PortfolioError::Vault(VaultError::Decryption(_))));
        assert_eq!(err.to_string(), "Decryption failed: aead tag mismatch");
    }

    #[test]
    fn test_enrichment_wraps_adapter_error() {
        let err: EnrichmentError = AdapterError::Timeout.into();
        assert_eq!(err.to_string(), "Token discovery failed: Request timed out");
    }
}
