//! 마스터키 지문 (KeyFingerprint.hash)
//!
//! 지문 포맷:
//! - 신규: Argon2id PHC 문자열 (`$argon2id$v=19$m=...,t=...,p=...$<salt>$<hash>`)
//! - 레거시: salt 없는 SHA-1 hex (40 chars). 검증만 지원하며 성공 시 Argon2id로 교체합니다.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rand::Rng;
use sha1::{Digest, Sha1};

use super::kdf::{KdfParams, SALT_LEN};
use super::CryptoError;

const LEGACY_SHA1_HEX_LEN: usize = 40;

/// 저장된 지문의 해시 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintScheme {
    Argon2id,
    LegacySha1,
    Unknown,
}

impl FingerprintScheme {
    pub fn detect(stored: &str) -> Self {
        if stored.starts_with("$argon2id$") {
            FingerprintScheme::Argon2id
        } else if stored.len() == LEGACY_SHA1_HEX_LEN
            && stored.bytes().all(|b| b.is_ascii_hexdigit())
        {
            FingerprintScheme::LegacySha1
        } else {
            FingerprintScheme::Unknown
        }
    }
}

/// 마스터키의 Argon2id 지문 생성 (지문마다 랜덤 salt)
pub fn digest(key: &str, params: &KdfParams) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill(&mut salt);
    let salt = SaltString::encode_b64(&salt)
        .map_err(|e| CryptoError::Fingerprint(format!("Invalid salt: {}", e)))?;

    let hash = params
        .argon2()?
        .hash_password(key.as_bytes(), &salt)
        .map_err(|e| CryptoError::Fingerprint(e.to_string()))?;
    Ok(hash.to_string())
}

/// 레거시 지문: SHA-1(key) hex
pub fn legacy_sha1(key: &str) -> String {
    hex::encode(Sha1::digest(key.as_bytes()))
}

/// 입력 키가 저장된 지문과 일치하는지 확인
///
/// 지문 포맷이 손상된 경우에도 `Ok(false)`를 반환하여 어떤 행과 비교했는지 드러내지 않습니다.
pub fn matches(key: &str, stored: &str) -> Result<bool, CryptoError> {
    match FingerprintScheme::detect(stored) {
        FingerprintScheme::Argon2id => {
            let Ok(parsed) = PasswordHash::new(stored) else {
                tracing::warn!("Ignoring unparsable argon2 fingerprint");
                return Ok(false);
            };
            // 파라미터는 PHC 문자열에 포함되어 있으므로 기본 인스턴스로 검증
            Ok(argon2::Argon2::default()
                .verify_password(key.as_bytes(), &parsed)
                .is_ok())
        }
        FingerprintScheme::LegacySha1 => Ok(constant_time_eq(
            legacy_sha1(key).as_bytes(),
            stored.to_ascii_lowercase().as_bytes(),
        )),
        FingerprintScheme::Unknown => Ok(false),
    }
}

/// 길이를 제외한 내용 비교를 상수 시간으로 수행
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
