//! 필드 단위 비밀번호 암호화/복호화
//!
//! 암호문 포맷 (v1, base64 인코딩):
//! - magic: `CVP1` (4 bytes)
//! - salt: 16 bytes (Argon2id, 같은 배치에서 암호화한 필드끼리 공유)
//! - nonce: 24 bytes (XChaCha20-Poly1305)
//! - ciphertext: AEAD 결과 (= 암호문 + 태그)
//!
//! AAD: magic를 AAD로 사용 (포맷 바인딩)

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::Rng;
use zeroize::{Zeroize, Zeroizing};

use super::kdf::{derive_key, KdfParams, DERIVED_KEY_LEN, SALT_LEN};
use super::CryptoError;

/// 암호문 매직 (4 bytes)
pub const CIPHER_MAGIC: &[u8; 4] = b"CVP1";

/// Nonce 길이 (XChaCha20-Poly1305용 24 bytes)
pub const NONCE_LEN: usize = 24;

const TAG_LEN: usize = 16;
const HEADER_LEN: usize = CIPHER_MAGIC.len() + SALT_LEN + NONCE_LEN;

/// 비밀번호 필드 암호화 엔진
///
/// 키는 호출마다 인자로 받으며 내부에 보관하지 않습니다.
#[derive(Debug, Clone, Default)]
pub struct CipherEngine {
    params: KdfParams,
}

impl CipherEngine {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// 같은 마스터키로 여러 필드를 처리하는 배치 시작
    pub fn batch<'a>(&'a self, key: &'a str) -> CipherBatch<'a> {
        let mut seal_salt = [0u8; SALT_LEN];
        rand::thread_rng().fill(&mut seal_salt);
        CipherBatch {
            engine: self,
            key,
            seal_salt,
            derived: HashMap::new(),
        }
    }

    /// 평문을 마스터키로 암호화 (salt/nonce는 매 호출마다 랜덤)
    pub fn encrypt(&self, plaintext: &str, key: &str) -> Result<String, CryptoError> {
        self.batch(key).encrypt(plaintext)
    }

    /// 암호문을 마스터키로 복호화
    ///
    /// 포맷 오류, 키 불일치(태그 검증 실패), UTF-8 오류는 모두 에러로 반환합니다.
    pub fn decrypt(&self, ciphertext: &str, key: &str) -> Result<String, CryptoError> {
        self.batch(key).decrypt(ciphertext)
    }

    /// 단일 레코드 복호화 실패를 격리: 실패 시 로그를 남기고 빈 문자열 반환
    pub fn decrypt_or_empty(&self, record_id: i64, ciphertext: &str, key: &str) -> String {
        self.batch(key).decrypt_or_empty(record_id, ciphertext)
    }
}

/// 한 마스터키로 여러 필드를 암호화/복호화하는 작업 단위
///
/// 유도 키는 salt별로 한 번만 계산합니다. 배치 안의 암호화는 모두 같은 salt를
/// 쓰고 nonce만 필드마다 새로 뽑으므로, 배치 전체의 KDF 비용은 1회입니다.
/// 유도 키는 배치가 drop될 때 zeroize됩니다.
pub struct CipherBatch<'a> {
    engine: &'a CipherEngine,
    key: &'a str,
    seal_salt: [u8; SALT_LEN],
    derived: HashMap<[u8; SALT_LEN], Zeroizing<[u8; DERIVED_KEY_LEN]>>,
}

impl CipherBatch<'_> {
    fn cipher_for(&mut self, salt: [u8; SALT_LEN]) -> Result<XChaCha20Poly1305, CryptoError> {
        if !self.derived.contains_key(&salt) {
            let key = derive_key(self.key, &salt, &self.engine.params)?;
            self.derived.insert(salt, key);
        }
        let derived = self
            .derived
            .get(&salt)
            .ok_or_else(|| CryptoError::Kdf("derived key missing".to_string()))?;
        let derived: &[u8; DERIVED_KEY_LEN] = derived;
        Ok(XChaCha20Poly1305::new(derived.into()))
    }

    /// 지금까지 실행한 키 유도 횟수
    pub fn derivations(&self) -> usize {
        self.derived.len()
    }

    pub fn encrypt(&mut self, plaintext: &str) -> Result<String, CryptoError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce);

        let salt = self.seal_salt;
        let ciphertext = self
            .cipher_for(salt)?
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: CIPHER_MAGIC,
                },
            )
            .map_err(|e| CryptoError::Encrypt(e.to_string()))?;

        let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
        out.extend_from_slice(CIPHER_MAGIC);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(out))
    }

    pub fn decrypt(&mut self, ciphertext: &str) -> Result<String, CryptoError> {
        let raw = BASE64
            .decode(ciphertext.trim())
            .map_err(|e| CryptoError::Format(format!("not base64: {}", e)))?;

        if raw.len() < HEADER_LEN + TAG_LEN {
            return Err(CryptoError::Format("ciphertext too short".to_string()));
        }
        if &raw[..CIPHER_MAGIC.len()] != CIPHER_MAGIC {
            return Err(CryptoError::Format("invalid magic".to_string()));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&raw[CIPHER_MAGIC.len()..CIPHER_MAGIC.len() + SALT_LEN]);
        let nonce = &raw[CIPHER_MAGIC.len() + SALT_LEN..HEADER_LEN];
        let body = &raw[HEADER_LEN..];

        let mut plaintext = self
            .cipher_for(salt)?
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: body,
                    aad: CIPHER_MAGIC,
                },
            )
            .map_err(|_| CryptoError::Decrypt("authentication tag mismatch".to_string()))?;

        let result = String::from_utf8(plaintext.clone())
            .map_err(|_| CryptoError::Decrypt("plaintext is not valid UTF-8".to_string()));
        plaintext.zeroize();
        result
    }

    pub fn decrypt_or_empty(&mut self, record_id: i64, ciphertext: &str) -> String {
        match self.decrypt(ciphertext) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                tracing::warn!(record_id, error = %e, "Password field could not be decrypted, substituting empty value");
                String::new()
            }
        }
    }
}
