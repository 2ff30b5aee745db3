//! CredentialStore - 프로젝트 범위 자격증명 레코드 관리
//!
//! 비밀번호는 항상 암호문 상태로만 저장/조회합니다. 복호화는 세션 계층의 책임입니다.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

use crate::error::{VaultError, VaultResult};
use crate::models::{CredentialRecord, ProtocolScope, SealedCredential, SearchFilter};

const RECORD_COLUMNS: &str = "id, project_id, server, protocol, url, username, password_ciphertext, created_at, updated_at";

/// 자격증명 테이블 연산
#[derive(Debug, Clone, Copy, Default)]
pub struct CredentialStore;

fn map_record(row: &Row<'_>) -> rusqlite::Result<CredentialRecord> {
    Ok(CredentialRecord {
        id: row.get(0)?,
        project_id: row.get(1)?,
        server: row.get(2)?,
        protocol: row.get(3)?,
        url: row.get(4)?,
        username: row.get(5)?,
        password_ciphertext: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// LIKE 패턴용 escape (`\` 기준)
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl CredentialStore {
    /// 프로젝트의 레코드 목록 (생성 시각 역순)
    pub fn list_by_project(
        &self,
        conn: &Connection,
        project_id: i64,
    ) -> VaultResult<Vec<CredentialRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM credentials WHERE project_id = ?1
             ORDER BY created_at DESC, id DESC",
            RECORD_COLUMNS
        ))?;
        let iter = stmt.query_map([project_id], map_record)?;

        let mut records = Vec::new();
        for record in iter {
            records.push(record?);
        }
        Ok(records)
    }

    /// 레코드 일괄 insert-or-overwrite
    ///
    /// 호출자가 넘긴 트랜잭션 안에서 실행되므로 하나라도 실패하면 commit되지 않습니다.
    /// 다른 프로젝트가 소유한 id는 덮어쓰지 않고 에러로 처리합니다.
    pub fn upsert_batch(
        &self,
        tx: &Transaction<'_>,
        project_id: i64,
        records: &[SealedCredential],
    ) -> VaultResult<()> {
        let now = chrono::Utc::now().timestamp_millis();

        for record in records {
            let changed = match &record.password_ciphertext {
                Some(ciphertext) => tx.execute(
                    "INSERT INTO credentials
                        (id, project_id, server, protocol, url, username, password_ciphertext, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                     ON CONFLICT(id) DO UPDATE SET
                        server = excluded.server,
                        protocol = excluded.protocol,
                        url = excluded.url,
                        username = excluded.username,
                        password_ciphertext = excluded.password_ciphertext,
                        updated_at = excluded.updated_at
                     WHERE credentials.project_id = excluded.project_id",
                    params![
                        record.id,
                        project_id,
                        record.server,
                        record.protocol,
                        record.url,
                        record.username,
                        ciphertext,
                        now,
                    ],
                )?,
                None => tx.execute(
                    "UPDATE credentials
                     SET server = ?1, protocol = ?2, url = ?3, username = ?4, updated_at = ?5
                     WHERE id = ?6 AND project_id = ?7",
                    params![
                        record.server,
                        record.protocol,
                        record.url,
                        record.username,
                        now,
                        record.id,
                        project_id,
                    ],
                )?,
            };

            if changed == 0 {
                return Err(self.rejection_reason(tx, record)?);
            }
        }

        tracing::debug!(project_id, count = records.len(), "Credential batch staged");
        Ok(())
    }

    /// 갱신된 행이 없을 때 원인 판별: 다른 프로젝트 소유 id인지, 새 id에 비밀번호가 없는지
    fn rejection_reason(&self, conn: &Connection, record: &SealedCredential) -> VaultResult<VaultError> {
        let owner: Option<i64> = conn
            .query_row(
                "SELECT project_id FROM credentials WHERE id = ?1",
                [record.id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match owner {
            Some(_) => VaultError::Storage(format!(
                "credential id {} is owned by another project",
                record.id
            )),
            None => VaultError::InvalidRecord(format!(
                "record {}: password is required for a new credential",
                record.id
            )),
        })
    }

    /// 단일 레코드의 비밀번호 암호문 조회
    pub fn get_password_ciphertext(
        &self,
        conn: &Connection,
        project_id: i64,
        id: i64,
    ) -> VaultResult<String> {
        conn.query_row(
            "SELECT password_ciphertext FROM credentials WHERE id = ?1 AND project_id = ?2",
            [id, project_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(VaultError::NotFound(id))
    }

    /// 저장된 프로토콜 값 목록 (중복 제거)
    pub fn distinct_protocols(
        &self,
        conn: &Connection,
        scope: ProtocolScope,
    ) -> VaultResult<BTreeSet<String>> {
        let mut protocols = BTreeSet::new();
        match scope {
            ProtocolScope::Global => {
                let mut stmt = conn.prepare("SELECT DISTINCT protocol FROM credentials")?;
                for protocol in stmt.query_map([], |row| row.get::<_, String>(0))? {
                    protocols.insert(protocol?);
                }
            }
            ProtocolScope::Project(project_id) => {
                let mut stmt = conn
                    .prepare("SELECT DISTINCT protocol FROM credentials WHERE project_id = ?1")?;
                for protocol in stmt.query_map([project_id], |row| row.get::<_, String>(0))? {
                    protocols.insert(protocol?);
                }
            }
        }
        Ok(protocols)
    }

    /// 서버 부분 일치 + 프로토콜 정확 일치 검색
    pub fn search(
        &self,
        conn: &Connection,
        project_id: i64,
        filter: &SearchFilter,
    ) -> VaultResult<Vec<CredentialRecord>> {
        let pattern = format!("%{}%", escape_like(filter.server.trim()));
        let protocol = filter
            .protocol
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM credentials
             WHERE project_id = ?1
               AND server LIKE ?2 ESCAPE '\\'
               AND (?3 IS NULL OR protocol = ?3)
             ORDER BY created_at DESC, id DESC",
            RECORD_COLUMNS
        ))?;
        let iter = stmt.query_map(params![project_id, pattern, protocol], map_record)?;

        let mut records = Vec::new();
        for record in iter {
            records.push(record?);
        }
        Ok(records)
    }

    /// 프로젝트 내 레코드 삭제, 삭제된 행 수 반환
    pub fn delete(&self, tx: &Transaction<'_>, project_id: i64, ids: &[i64]) -> VaultResult<usize> {
        let mut stmt = tx.prepare("DELETE FROM credentials WHERE id = ?1 AND project_id = ?2")?;
        let mut deleted = 0;
        for id in ids {
            deleted += stmt.execute([*id, project_id])?;
        }
        Ok(deleted)
    }
}
