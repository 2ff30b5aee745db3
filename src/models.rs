//! credvault Data Models
//!
//! UI(TypeScript) 타입과 매핑되는 Rust 데이터 모델

use serde::{Deserialize, Serialize};

/// 기본 프로토콜
pub const DEFAULT_PROTOCOL: &str = "www";

/// 저장된 자격증명 (비밀번호는 암호문 그대로)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub id: i64,
    pub project_id: i64,
    pub server: String,
    pub protocol: String,
    pub url: String,
    pub username: String,
    pub password_ciphertext: String,
    /// Unix millis
    pub created_at: i64,
    /// Unix millis
    pub updated_at: i64,
}

/// 저장 요청 단위 (UI에서 편집된 행)
///
/// `password`가 `None`이면 기존 암호문을 유지합니다 (기존 id에만 허용).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInput {
    pub id: i64,
    pub server: String,
    #[serde(default)]
    pub protocol: Option<String>,
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl CredentialInput {
    /// 필수 필드 검증 (server, url)
    pub fn validate(&self) -> Result<(), String> {
        if self.server.trim().is_empty() {
            return Err(format!("record {}: server must not be empty", self.id));
        }
        if self.url.trim().is_empty() {
            return Err(format!("record {}: url must not be empty", self.id));
        }
        if matches!(&self.password, Some(p) if p.is_empty()) {
            return Err(format!("record {}: password must not be empty", self.id));
        }
        Ok(())
    }

    pub fn protocol_or_default(&self) -> &str {
        match self.protocol.as_deref().map(str::trim) {
            Some(p) if !p.is_empty() => p,
            _ => DEFAULT_PROTOCOL,
        }
    }
}

/// 암호화가 끝난 저장 행 (CredentialStore 입력)
#[derive(Debug, Clone)]
pub struct SealedCredential {
    pub id: i64,
    pub server: String,
    pub protocol: String,
    pub url: String,
    pub username: String,
    /// `None`이면 기존 암호문 유지
    pub password_ciphertext: Option<String>,
}

/// 복호화된 자격증명 (일괄 조회 결과)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedCredential {
    pub id: i64,
    pub server: String,
    pub protocol: String,
    pub url: String,
    pub username: String,
    pub password: String,
}

/// 검색 조건
///
/// - `server`: 부분 일치 (비어 있으면 전체)
/// - `protocol`: 정확히 일치, `None`/빈 문자열이면 전체
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilter {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub protocol: Option<String>,
}

/// 프로토콜 목록 범위
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolScope {
    /// 저장소 전체 (프로젝트 구분 없음)
    Global,
    Project(i64),
}

/// 키 교체 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationReport {
    pub project_id: i64,
    pub rotated: usize,
    /// 기존 키로 복호화되지 않아 빈 값으로 재암호화된 레코드 id
    pub unreadable: Vec<i64>,
}
