//! AES-256-GCM 加密/解密模块
//! 输出格式：nonce（12字节）+ ciphertext（含16字节认证标签）

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};

use crate::error::VaultError;

pub const NONCE_LENGTH: usize = 12;
pub const TAG_LENGTH: usize = 16;

/// 加密数据
///
/// # Arguments
/// * `data` - 要加密的原始数据
/// * `key` - 32字节加密密钥
///
/// # Returns
/// 返回加密后的数据（nonce + ciphertext），每次调用生成新的随机 nonce
pub fn encrypt_data(data: &[u8], key: &[u8]) -> Result<Vec<u8>, VaultError> {
    if key.len() != 32 {
        return Err(VaultError::Encryption("Key must be 32 bytes for AES-256".into()));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::Encryption(format!("Invalid key: {}", e)))?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, data)
        .map_err(|e| VaultError::Encryption(e.to_string()))?;

    let mut result = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// 解密数据
///
/// # Arguments
/// * `encrypted` - 加密的数据（nonce + ciphertext）
/// * `key` - 32字节加密密钥
///
/// # Returns
/// 返回解密后的原始数据；密钥错误、数据被篡改或截断时返回 `VaultError::Decryption`
pub fn decrypt_data(encrypted: &[u8], key: &[u8]) -> Result<Vec<u8>, VaultError> {
    if key.len() != 32 {
        return Err(VaultError::Decryption("Key must be 32 bytes for AES-256".into()));
    }

    if encrypted.len() < NONCE_LENGTH + TAG_LENGTH {
        return Err(VaultError::Decryption("Encrypted data too short".into()));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| VaultError::Decryption(format!("Invalid key: {}", e)))?;

    // 提取 nonce（前12字节）
    let (nonce, ciphertext) = encrypted.split_at(NONCE_LENGTH);

    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| VaultError::Decryption("authentication failed".into()))
}
