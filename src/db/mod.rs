//! Database Module
//!
//! SQLite 저장소 관리. 테이블별 연산은 하위 모듈에 있습니다.
//!
//! - `registry`: 마스터키 지문 (KeyRegistry)
//! - `credentials`: 자격증명 레코드 (CredentialStore)
//! - `migrate`: 구버전 저장소 레이아웃 변환
//!
//! `credentials.project_id`는 `key_fingerprints`를 참조하며 외래 키 검사는 항상 켜져 있습니다.

mod schema;

pub mod credentials;
pub mod migrate;
pub mod registry;

use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction};

use crate::error::VaultResult;

pub use credentials::CredentialStore;
pub use registry::KeyRegistry;

/// 데이터베이스 래퍼
pub struct Database {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// 새 데이터베이스 연결 생성 (스키마 초기화 포함)
    pub fn open(path: &Path) -> VaultResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        let db = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        db.initialize()?;

        tracing::info!(path = %path.display(), "Credential store opened");
        Ok(db)
    }

    /// 메모리 데이터베이스 (테스트 및 임시 세션용)
    pub fn open_in_memory() -> VaultResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn, path: None };
        db.initialize()?;
        Ok(db)
    }

    /// 데이터베이스 스키마 초기화 (구버전 레이아웃이면 먼저 변환)
    pub fn initialize(&self) -> VaultResult<()> {
        self.conn.pragma_update(None, "foreign_keys", true)?;
        migrate::upgrade_legacy_layout(&self.conn)?;
        self.conn.execute_batch(schema::CREATE_SCHEMA)?;
        tracing::debug!("Schema initialized");
        Ok(())
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// 일괄 작업용 트랜잭션 시작 (commit 없이 drop되면 rollback)
    pub fn transaction(&self) -> VaultResult<Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }
}
