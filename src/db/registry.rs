//! KeyRegistry - 프로젝트별 마스터키 지문 관리
//!
//! 마스터키 자체는 저장하지 않고 지문만 `key_fingerprints`에 보관합니다.
//! 첫 실행(지문 0개)이면 bootstrap, 아니면 verify 경로로 분기합니다.

use rusqlite::{params, Connection, Transaction};

use crate::crypto::fingerprint::{self, FingerprintScheme};
use crate::crypto::KdfParams;
use crate::error::{VaultError, VaultResult};

/// 검증 실패 메시지 (어떤 행과 비교했는지 노출하지 않음)
pub const VERIFICATION_FAILED: &str = "key verification failed";

/// 마스터키 지문 레지스트리
#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    params: KdfParams,
}

impl KeyRegistry {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    /// 지문 행이 하나도 없으면 true (신규 저장소)
    pub fn is_empty(&self, conn: &Connection) -> VaultResult<bool> {
        let count: i64 =
            conn.query_row("SELECT count(*) FROM key_fingerprints", [], |row| row.get(0))?;
        Ok(count == 0)
    }

    /// 새 지문 행을 만들고 할당된 project_id 반환
    pub fn create(&self, conn: &Connection, key: &str) -> VaultResult<i64> {
        let hash = fingerprint::digest(key, &self.params)?;
        conn.execute("INSERT INTO key_fingerprints (hash) VALUES (?1)", [&hash])
            .map_err(|e| VaultError::Storage(format!("Failed to register key fingerprint: {}", e)))?;

        let project_id = conn.last_insert_rowid();
        tracing::info!(project_id, "Registered new project key fingerprint");
        Ok(project_id)
    }

    /// 입력 키와 일치하는 지문의 project_id 반환
    ///
    /// 레거시(SHA-1) 지문과 일치하면 같은 행을 Argon2id 지문으로 교체합니다.
    pub fn verify(&self, conn: &Connection, key: &str) -> VaultResult<i64> {
        let rows = {
            let mut stmt =
                conn.prepare("SELECT project_id, hash FROM key_fingerprints ORDER BY project_id")?;
            let iter = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
            let mut rows = Vec::new();
            for row in iter {
                rows.push(row?);
            }
            rows
        };

        let mut matched: Option<(i64, FingerprintScheme)> = None;
        for (project_id, hash) in &rows {
            if fingerprint::matches(key, hash)? && matched.is_none() {
                matched = Some((*project_id, FingerprintScheme::detect(hash)));
            }
        }

        let Some((project_id, scheme)) = matched else {
            tracing::debug!("Master key did not match any fingerprint");
            return Err(VaultError::Authentication(VERIFICATION_FAILED.to_string()));
        };

        if scheme == FingerprintScheme::LegacySha1 {
            let hash = fingerprint::digest(key, &self.params)?;
            conn.execute(
                "UPDATE key_fingerprints SET hash = ?1 WHERE project_id = ?2",
                params![hash, project_id],
            )?;
            tracing::info!(project_id, "Upgraded legacy SHA-1 fingerprint to Argon2id");
        }

        Ok(project_id)
    }

    /// project_id의 지문을 새 키로 교체 (없으면 생성)
    ///
    /// 키 교체와 레코드 재암호화가 함께 커밋되도록 트랜잭션 안에서만 호출합니다.
    pub fn replace_fingerprint(
        &self,
        tx: &Transaction<'_>,
        project_id: i64,
        new_key: &str,
    ) -> VaultResult<()> {
        let hash = fingerprint::digest(new_key, &self.params)?;
        tx.execute(
            "INSERT INTO key_fingerprints (project_id, hash) VALUES (?1, ?2)
             ON CONFLICT(project_id) DO UPDATE SET hash = excluded.hash",
            params![project_id, hash],
        )?;
        Ok(())
    }
}
