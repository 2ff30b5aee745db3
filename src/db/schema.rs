//! Database Schema
//!
//! SQLite 테이블 스키마 정의. 두 테이블 구조는 버전 간 호환을 유지해야 합니다.

/// 데이터베이스 스키마 생성 SQL
pub const CREATE_SCHEMA: &str = r#"
-- 마스터키 지문 테이블 (프로젝트당 1행)
CREATE TABLE IF NOT EXISTS key_fingerprints (
    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
    hash TEXT NOT NULL
);

-- 자격증명 테이블 (id는 호출자가 지정)
CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    server TEXT NOT NULL CHECK (length(trim(server)) > 0),
    protocol TEXT NOT NULL DEFAULT 'www',
    url TEXT NOT NULL CHECK (length(trim(url)) > 0),
    username TEXT NOT NULL DEFAULT '',
    password_ciphertext TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (project_id) REFERENCES key_fingerprints(project_id)
);

-- 자격증명 인덱스
CREATE INDEX IF NOT EXISTS idx_credentials_project ON credentials(project_id);
CREATE INDEX IF NOT EXISTS idx_credentials_created ON credentials(created_at);
CREATE INDEX IF NOT EXISTS idx_credentials_protocol ON credentials(protocol);
"#;
