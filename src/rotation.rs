//! Rotation Coordinator - 마스터키 교체
//!
//! 활성 프로젝트의 모든 비밀번호를 새 키로 재암호화합니다.
//! 지문 교체와 레코드 갱신은 하나의 트랜잭션으로 commit되며,
//! 세션 키는 commit이 끝난 뒤에만 바뀝니다.

use zeroize::Zeroizing;

use crate::crypto::{CipherEngine, MasterKey};
use crate::db::{CredentialStore, Database, KeyRegistry};
use crate::error::{VaultError, VaultResult};
use crate::models::{RotationReport, SealedCredential};
use crate::session::SessionKeyManager;

/// 키 교체 조정자
#[derive(Debug, Clone)]
pub struct RotationCoordinator {
    pub registry: KeyRegistry,
    pub store: CredentialStore,
    pub cipher: CipherEngine,
}

impl RotationCoordinator {
    pub fn rotate(
        &self,
        db: &Database,
        session: &SessionKeyManager,
        new_key: MasterKey,
    ) -> VaultResult<RotationReport> {
        let (old_key, project_id) = session.require_unlocked()?;

        if new_key.is_empty() {
            return Err(VaultError::Authentication(
                "new master key must not be empty".to_string(),
            ));
        }
        if new_key == old_key {
            return Err(VaultError::Authentication(
                "new master key must differ from the current key".to_string(),
            ));
        }

        let records = self.store.list_by_project(db.conn(), project_id)?;
        tracing::info!(project_id, count = records.len(), "Rotating master key");

        let mut reader = self.cipher.batch(old_key.as_str());
        let mut writer = self.cipher.batch(new_key.as_str());
        let mut unreadable = Vec::new();
        let mut sealed = Vec::with_capacity(records.len());
        for record in records {
            let plaintext = match reader.decrypt(&record.password_ciphertext) {
                Ok(plaintext) => Zeroizing::new(plaintext),
                Err(e) => {
                    tracing::warn!(record_id = record.id, error = %e, "Record unreadable under current key, re-encrypting empty value");
                    unreadable.push(record.id);
                    Zeroizing::new(String::new())
                }
            };

            sealed.push(SealedCredential {
                id: record.id,
                server: record.server,
                protocol: record.protocol,
                url: record.url,
                username: record.username,
                password_ciphertext: Some(writer.encrypt(&plaintext)?),
            });
        }
        drop(reader);
        drop(writer);

        let tx = db.transaction()?;

        // 다른 프로젝트와 같은 키를 쓰면 unlock 시 어느 프로젝트인지 구분할 수 없음
        match self.registry.verify(&tx, new_key.as_str()) {
            Ok(other) if other != project_id => {
                return Err(VaultError::Authentication(
                    "new master key is already bound to another project".to_string(),
                ));
            }
            Ok(_) | Err(VaultError::Authentication(_)) => {}
            Err(e) => return Err(e),
        }

        self.registry.replace_fingerprint(&tx, project_id, new_key.as_str())?;
        self.store.upsert_batch(&tx, project_id, &sealed)?;
        tx.commit()?;

        // commit 이후에는 데이터가 이미 새 키 기준. 도중에 잠겼다면 다음 unlock에서 새 키 사용
        if let Err(e) = session.replace_key(project_id, new_key) {
            tracing::warn!(project_id, error = %e, "Session changed during rotation, keeping it locked");
        }

        tracing::info!(
            project_id,
            rotated = sealed.len(),
            unreadable = unreadable.len(),
            "Master key rotated"
        );

        Ok(RotationReport {
            project_id,
            rotated: sealed.len(),
            unreadable,
        })
    }
}
