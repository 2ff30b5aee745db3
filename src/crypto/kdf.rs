//! 마스터키 → 대칭키 유도 (Argon2id)

use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::CryptoError;

/// 유도 키 길이 (256-bit)
pub const DERIVED_KEY_LEN: usize = 32;

/// salt 길이
pub const SALT_LEN: usize = 16;

const MEMORY_MIN_KIB: u32 = 8;
const MEMORY_MAX_KIB: u32 = 1024 * 1024;
const ITERATIONS_MAX: u32 = 10;
const PARALLELISM_MAX: u32 = 8;

/// Argon2id 비용 파라미터
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// 테스트용 저비용 파라미터
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: MEMORY_MIN_KIB,
            iterations: 1,
            parallelism: 1,
        }
    }

    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.parallelism == 0 || self.parallelism > PARALLELISM_MAX {
            return Err(CryptoError::Kdf(format!(
                "parallelism must be within 1..={}",
                PARALLELISM_MAX
            )));
        }
        if self.iterations == 0 || self.iterations > ITERATIONS_MAX {
            return Err(CryptoError::Kdf(format!(
                "iterations must be within 1..={}",
                ITERATIONS_MAX
            )));
        }
        // Argon2는 lane 당 최소 8 KiB를 요구
        let min_memory = MEMORY_MIN_KIB * self.parallelism;
        if self.memory_kib < min_memory || self.memory_kib > MEMORY_MAX_KIB {
            return Err(CryptoError::Kdf(format!(
                "memory_kib must be within {}..={}",
                min_memory, MEMORY_MAX_KIB
            )));
        }
        Ok(())
    }

    pub(crate) fn argon2(&self) -> Result<Argon2<'static>, CryptoError> {
        self.validate()?;
        let params = Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(DERIVED_KEY_LEN),
        )
        .map_err(|e| CryptoError::Kdf(format!("Invalid Argon2 params: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// 비밀번호와 salt로부터 256-bit 키 유도
pub fn derive_key(
    password: &str,
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; DERIVED_KEY_LEN]>, CryptoError> {
    let argon2 = params.argon2()?;
    let mut key = Zeroizing::new([0u8; DERIVED_KEY_LEN]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key[..])
        .map_err(|e| CryptoError::Kdf(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}
