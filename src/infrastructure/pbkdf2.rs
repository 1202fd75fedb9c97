//! PBKDF2 密钥派生模块
//! 从用户身份标识派生助记词加密密钥

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// PBKDF2 密钥派生参数
pub const PBKDF2_ITERATIONS: u32 = 100_000; // 100,000次迭代
pub const KEY_LENGTH: usize = 32; // 32字节密钥（AES-256）

/// 全局固定盐值
///
/// 没有服务端主密钥可用，安全性依赖身份标识难以被外部猜到和迭代次数。
/// 修改此值会使所有已存储的密文无法解密。
pub const APP_SALT: &[u8] = b"ironfolio.vault.v1.salt";

/// 派生出的密钥（离开作用域即清零）
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    pub fn as_slice(&self) -> &[u8] {
        &self.key
    }
}

/// 使用给定盐值和迭代次数派生密钥
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> DerivedKey {
    let mut key = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key);
    DerivedKey { key }
}

/// 从身份标识派生密钥（固定盐值，100,000 次迭代）
pub fn derive_identity_key(identity: &str) -> DerivedKey {
    derive_key(identity.as_bytes(), APP_SALT, PBKDF2_ITERATIONS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pbkdf2_derive_is_deterministic() {
        let key1 = derive_identity_key("user@example.com");
        let key2 = derive_identity_key("user@example.com");
        assert_eq!(key1.as_slice().len(), KEY_LENGTH);
        assert_eq!(key1.as_slice(), key2.as_slice());

        // 不同身份应该得到不同密钥
        let key3 = derive_identity_key("other@example.com");
        assert_ne!(key1.as_slice(), key3.as_slice());
    }

    #[test]
    fn test_salt_changes_key() {
        let a = derive_key(b"identity", b"salt-a", 1_000);
        let b = derive_key(b"identity", b"salt-b", 1_000);
        assert_ne!(a.as_slice(), b.as_slice());
    }
}
