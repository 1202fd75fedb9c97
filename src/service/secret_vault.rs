//! 助记词保险库
//!
//! 用身份标识派生的密钥加密/解密助记词，输出自包含的 base64 密文：
//! - v1：`0x01 || nonce(12) || ciphertext`
//! - 旧版（无版本字节）：`nonce(12) || ciphertext`，仅用于解密兼容
//!
//! 派生参数：PBKDF2-HMAC-SHA256，100,000 次迭代，全局固定盐值；AES-256-GCM。

use base64::{engine::general_purpose::STANDARD, Engine};
use zeroize::Zeroizing;

use crate::{
    error::VaultError,
    infrastructure::{
        encryption::{decrypt_data, encrypt_data, NONCE_LENGTH, TAG_LENGTH},
        pbkdf2::derive_identity_key,
    },
};

/// 当前密文方案版本
pub const BLOB_VERSION_V1: u8 = 0x01;

/// 保险库（无状态）
pub struct SecretVault;

impl SecretVault {
    /// 加密助记词
    ///
    /// 每次调用重新派生密钥并生成新的 nonce，相同输入得到不同密文。
    pub fn encrypt(secret: &str, identity: &str) -> Result<String, VaultError> {
        if secret.is_empty() {
            return Err(VaultError::EmptyInput("secret"));
        }
        if identity.is_empty() {
            return Err(VaultError::EmptyInput("identity"));
        }

        let key = derive_identity_key(identity);
        let sealed = encrypt_data(secret.as_bytes(), key.as_slice())?;

        let mut blob = Vec::with_capacity(1 + sealed.len());
        blob.push(BLOB_VERSION_V1);
        blob.extend_from_slice(&sealed);

        Ok(STANDARD.encode(blob))
    }

    /// 解密助记词
    ///
    /// 身份不匹配、密文损坏或被截断时返回 `VaultError::Decryption`，
    /// 调用方必须把该错误展示给用户（意味着用此身份无法恢复）。
    pub fn decrypt(blob: &str, identity: &str) -> Result<Zeroizing<String>, VaultError> {
        if identity.is_empty() {
            return Err(VaultError::EmptyInput("identity"));
        }

        let raw = STANDARD
            .decode(blob.trim())
            .map_err(|e| VaultError::Decryption(format!("invalid base64: {}", e)))?;
        let raw = Zeroizing::new(raw);

        let key = derive_identity_key(identity);

        let plaintext = match raw.split_first() {
            Some((&BLOB_VERSION_V1, sealed)) if sealed.len() >= NONCE_LENGTH + TAG_LENGTH => {
                // 旧版密文的 nonce 首字节恰好为 0x01 时回退到旧版解析
                decrypt_data(sealed, key.as_slice())
                    .or_else(|_| decrypt_data(&raw, key.as_slice()))?
            }
            _ => decrypt_data(&raw, key.as_slice())?,
        };

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| VaultError::Decryption("plaintext is not valid UTF-8".into()))
    }

    /// 轮换：用旧身份解密后用新身份重新加密，旧密文直接丢弃
    pub fn rotate(
        blob: &str,
        old_identity: &str,
        new_identity: &str,
    ) -> Result<String, VaultError> {
        let secret = Self::decrypt(blob, old_identity)?;
        Self::encrypt(&secret, new_identity)
    }

    /// 判断密文是否为旧版（无版本字节）格式
    pub fn is_legacy_blob(blob: &str) -> bool {
        match STANDARD.decode(blob.trim()) {
            Ok(raw) => raw.first() != Some(&BLOB_VERSION_V1),
            Err(_) => false,
        }
    }
}
