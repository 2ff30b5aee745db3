//! Crypto 모듈
//!
//! 마스터키 하나로 모든 비밀번호 필드를 보호합니다.
//!
//! - `kdf`: Argon2id 기반 salted/iterated 키 유도
//! - `fingerprint`: 마스터키 검증용 단방향 지문 (Argon2id PHC, 레거시 SHA-1 호환)
//! - `cipher`: 필드 단위 XChaCha20-Poly1305 암호화

pub mod cipher;
pub mod fingerprint;
pub mod kdf;

use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

pub use cipher::CipherEngine;
pub use fingerprint::FingerprintScheme;
pub use kdf::KdfParams;

/// Crypto 오류
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    Kdf(String),

    #[error("Encryption failed: {0}")]
    Encrypt(String),

    #[error("Decryption failed: {0}")]
    Decrypt(String),

    #[error("Invalid ciphertext format: {0}")]
    Format(String),

    #[error("Fingerprint error: {0}")]
    Fingerprint(String),
}

/// 사용자가 입력한 마스터키 (drop 시 zeroize)
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(String);

impl MasterKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for MasterKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for MasterKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

impl PartialEq for MasterKey {
    fn eq(&self, other: &Self) -> bool {
        fingerprint::constant_time_eq(self.0.as_bytes(), other.0.as_bytes())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey(***)")
    }
}
