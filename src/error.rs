//! credvault Error Types
//!
//! 애플리케이션 전역 에러 타입 정의

use serde::Serialize;
use thiserror::Error;

use crate::crypto::CryptoError;

/// credvault 도메인 에러
#[derive(Error, Debug)]
pub enum VaultError {
    /// 잘못된 마스터키 (재입력 요청)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// 단일 필드 복호화 실패
    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 잠금 상태에서 호출된 작업 (호출 순서 오류)
    #[error("Session error: {0}")]
    Session(String),

    #[error("Credential not found: {0}")]
    NotFound(i64),

    #[error("Invalid credential record: {0}")]
    InvalidRecord(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// blocking 스레드 작업이 panic 또는 취소로 끝남
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<CryptoError> for VaultError {
    fn from(error: CryptoError) -> Self {
        match error {
            CryptoError::Decrypt(msg) | CryptoError::Format(msg) => VaultError::Decryption(msg),
            other => VaultError::Crypto(other.to_string()),
        }
    }
}

impl VaultError {
    /// UI로 전달되는 안정적인 에러 코드
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::Authentication(_) => "AUTHENTICATION_FAILED",
            VaultError::Decryption(_) => "DECRYPTION_FAILED",
            VaultError::Database(_) => "DB_ERROR",
            VaultError::Storage(_) => "STORAGE_ERROR",
            VaultError::Io(_) => "IO_ERROR",
            VaultError::Session(_) => "SESSION_LOCKED",
            VaultError::NotFound(_) => "NOT_FOUND",
            VaultError::InvalidRecord(_) => "INVALID_RECORD",
            VaultError::Crypto(_) => "CRYPTO_ERROR",
            VaultError::Config(_) => "CONFIG_ERROR",
            VaultError::Task(_) => "TASK_FAILED",
        }
    }
}

/// Tauri 명령 응답용 직렬화 가능한 에러
#[derive(Debug, Serialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl From<VaultError> for CommandError {
    fn from(error: VaultError) -> Self {
        let details = match &error {
            VaultError::Database(e) => Some(format!("{:?}", e)),
            _ => None,
        };

        CommandError {
            code: error.code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}

/// 도메인 결과 타입
pub type VaultResult<T> = Result<T, VaultError>;

/// Tauri 명령 결과 타입
pub type CommandResult<T> = Result<T, CommandError>;
