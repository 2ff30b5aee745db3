//! Credential Vault - UI에 노출되는 작업 모음
//!
//! 저장소 연결 하나와 세션 하나를 묶어 관리합니다.
//! 모든 저장소 작업은 저장소 mutex를 잡은 상태에서 실행되므로
//! 일괄 저장/키 교체가 서로 끼어들지 않습니다.
//! SQLite 접근과 Argon2 키 유도는 `spawn_blocking` 스레드에서 실행합니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{AppConfig, BUILTIN_PROTOCOLS};
use crate::crypto::{CipherEngine, MasterKey};
use crate::db::{CredentialStore, Database, KeyRegistry};
use crate::error::{VaultError, VaultResult};
use crate::models::{
    CredentialInput, CredentialRecord, DecryptedCredential, ProtocolScope, RotationReport,
    SealedCredential, SearchFilter,
};
use crate::rotation::RotationCoordinator;
use crate::session::{SessionKeyManager, SessionState};

/// 자격증명 금고
pub struct CredentialVault {
    db: Arc<Mutex<Database>>,
    session: Arc<SessionKeyManager>,
    registry: KeyRegistry,
    store: CredentialStore,
    cipher: CipherEngine,
    shared_protocols: bool,
}

impl CredentialVault {
    /// 설정의 기본 저장소 파일로 금고 열기
    pub fn open(config: &AppConfig) -> VaultResult<Self> {
        let db = Database::open(&config.db_path)?;
        Ok(Self::with_database(db, config))
    }

    pub fn with_database(db: Database, config: &AppConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            session: Arc::new(SessionKeyManager::new()),
            registry: KeyRegistry::new(config.kdf),
            store: CredentialStore,
            cipher: CipherEngine::new(config.kdf),
            shared_protocols: config.shared_protocols,
        }
    }

    /// 저장소 lock을 잡은 채 blocking 스레드에서 실행
    async fn with_store<T, F>(&self, f: F) -> VaultResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database, &SessionKeyManager) -> VaultResult<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db).lock_owned().await;
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || f(&db, &session)).await?
    }

    /// 다른 저장소 파일로 전환 (세션은 잠김)
    ///
    /// 열기에 실패하면 기존 저장소와 세션을 그대로 유지합니다.
    pub async fn open_store(&self, path: &Path) -> VaultResult<()> {
        let mut db = self.db.lock().await;
        let path = path.to_path_buf();
        let next = tokio::task::spawn_blocking(move || Database::open(&path)).await??;
        *db = next;
        self.session.lock_for_new_database();
        Ok(())
    }

    pub async fn store_path(&self) -> Option<PathBuf> {
        self.db.lock().await.path().map(Path::to_path_buf)
    }

    /// 지문이 하나도 없으면 true (다음 unlock이 새 프로젝트를 만듦)
    pub async fn is_first_run(&self) -> VaultResult<bool> {
        let registry = self.registry.clone();
        self.with_store(move |db, _| registry.is_empty(db.conn()))
            .await
    }

    pub async fn unlock(&self, key: MasterKey) -> VaultResult<i64> {
        let registry = self.registry.clone();
        self.with_store(move |db, session| session.unlock(db.conn(), &registry, key))
            .await
    }

    pub fn lock(&self) {
        self.session.lock();
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    /// 활성 프로젝트의 레코드 (비밀번호는 암호문 그대로)
    pub async fn list(&self) -> VaultResult<Vec<CredentialRecord>> {
        let store = self.store;
        self.with_store(move |db, session| {
            let (_, project_id) = session.require_unlocked()?;
            store.list_by_project(db.conn(), project_id)
        })
        .await
    }

    /// 단일 레코드 비밀번호 복호화
    pub async fn decrypt_one(&self, id: i64) -> VaultResult<String> {
        let store = self.store;
        let cipher = self.cipher.clone();
        self.with_store(move |db, session| {
            let (key, project_id) = session.require_unlocked()?;
            let ciphertext = store.get_password_ciphertext(db.conn(), project_id, id)?;
            Ok(cipher.decrypt(&ciphertext, key.as_str())?)
        })
        .await
    }

    /// 전체 복호화. 손상된 필드는 빈 문자열로 대체하고 나머지는 계속 진행
    pub async fn decrypt_all(&self) -> VaultResult<Vec<DecryptedCredential>> {
        let store = self.store;
        let cipher = self.cipher.clone();
        self.with_store(move |db, session| {
            let (key, project_id) = session.require_unlocked()?;
            let records = store.list_by_project(db.conn(), project_id)?;

            let mut batch = cipher.batch(key.as_str());
            Ok(records
                .into_iter()
                .map(|record| DecryptedCredential {
                    password: batch.decrypt_or_empty(record.id, &record.password_ciphertext),
                    id: record.id,
                    server: record.server,
                    protocol: record.protocol,
                    url: record.url,
                    username: record.username,
                })
                .collect())
        })
        .await
    }

    /// 편집된 행 일괄 저장 (전부 성공하거나 전부 취소)
    pub async fn save_all(&self, records: Vec<CredentialInput>) -> VaultResult<()> {
        let store = self.store;
        let cipher = self.cipher.clone();
        self.with_store(move |db, session| {
            let (key, project_id) = session.require_unlocked()?;

            for record in &records {
                record.validate().map_err(VaultError::InvalidRecord)?;
            }

            let mut batch = cipher.batch(key.as_str());
            let mut sealed = Vec::with_capacity(records.len());
            for record in &records {
                let password_ciphertext = match &record.password {
                    Some(password) => Some(batch.encrypt(password)?),
                    None => None,
                };
                sealed.push(SealedCredential {
                    id: record.id,
                    server: record.server.trim().to_string(),
                    protocol: record.protocol_or_default().to_string(),
                    url: record.url.trim().to_string(),
                    username: record.username.trim().to_string(),
                    password_ciphertext,
                });
            }
            drop(batch);

            let tx = db.transaction()?;
            store.upsert_batch(&tx, project_id, &sealed)?;
            tx.commit()?;

            tracing::info!(project_id, count = sealed.len(), "Credentials saved");
            Ok(())
        })
        .await
    }

    /// 활성 프로젝트의 레코드 삭제
    pub async fn delete(&self, ids: &[i64]) -> VaultResult<usize> {
        let store = self.store;
        let ids = ids.to_vec();
        self.with_store(move |db, session| {
            let (_, project_id) = session.require_unlocked()?;

            let tx = db.transaction()?;
            let deleted = store.delete(&tx, project_id, &ids)?;
            tx.commit()?;

            tracing::info!(project_id, deleted, "Credentials deleted");
            Ok(deleted)
        })
        .await
    }

    /// 마스터키 교체
    pub async fn rotate(&self, new_key: MasterKey) -> VaultResult<RotationReport> {
        let coordinator = RotationCoordinator {
            registry: self.registry.clone(),
            store: self.store,
            cipher: self.cipher.clone(),
        };
        self.with_store(move |db, session| coordinator.rotate(db, session, new_key))
            .await
    }

    pub async fn search(&self, filter: &SearchFilter) -> VaultResult<Vec<CredentialRecord>> {
        let store = self.store;
        let filter = filter.clone();
        self.with_store(move |db, session| {
            let (_, project_id) = session.require_unlocked()?;
            store.search(db.conn(), project_id, &filter)
        })
        .await
    }

    /// 프로토콜 선택지: 저장된 값 + 기본값(www, ssh, mysql)
    ///
    /// 기본은 활성 프로젝트 범위이며, 잠긴 상태에서는 기본값만 반환합니다.
    pub async fn distinct_protocols(&self) -> VaultResult<Vec<String>> {
        let store = self.store;
        let shared = self.shared_protocols;
        self.with_store(move |db, session| {
            let scope = if shared {
                Some(ProtocolScope::Global)
            } else {
                session.project_id().map(ProtocolScope::Project)
            };

            let mut protocols: Vec<String> = match scope {
                Some(scope) => store
                    .distinct_protocols(db.conn(), scope)?
                    .into_iter()
                    .collect(),
                None => Vec::new(),
            };
            for builtin in BUILTIN_PROTOCOLS {
                if !protocols.iter().any(|p| p == builtin) {
                    protocols.push(builtin.to_string());
                }
            }
            Ok(protocols)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use tempfile::tempdir;

    fn config() -> AppConfig {
        AppConfig {
            kdf: KdfParams::insecure_fast(),
            ..AppConfig::default()
        }
    }

    fn vault() -> CredentialVault {
        CredentialVault::with_database(Database::open_in_memory().unwrap(), &config())
    }

    fn input(id: i64, server: &str, password: &str) -> CredentialInput {
        CredentialInput {
            id,
            server: server.to_string(),
            protocol: None,
            url: format!("10.0.0.{}", id),
            username: "root".to_string(),
            password: Some(password.to_string()),
        }
    }

    #[tokio::test]
    async fn test_first_run_scenario() {
        let vault = vault();
        assert!(vault.is_first_run().await.unwrap());

        let project_id = vault.unlock("secret1".into()).await.unwrap();
        assert_eq!(project_id, 1);
        assert!(!vault.is_first_run().await.unwrap());

        vault
            .save_all(vec![CredentialInput {
                id: 1,
                server: "db1".into(),
                protocol: None,
                url: "10.0.0.1".into(),
                username: "root".into(),
                password: Some("pw".into()),
            }])
            .await
            .unwrap();

        let records = vault.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].protocol, "www");
        assert_ne!(records[0].password_ciphertext, "pw");
        assert_eq!(vault.decrypt_one(1).await.unwrap(), "pw");
    }

    #[tokio::test]
    async fn test_existing_store_scenario() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let config = AppConfig {
            db_path: path.clone(),
            ..config()
        };

        {
            let vault = CredentialVault::open(&config).unwrap();
            vault.unlock("secret1".into()).await.unwrap();
        }

        let vault = CredentialVault::open(&config).unwrap();
        assert!(!vault.is_first_run().await.unwrap());
        let err = vault.unlock("wrong".into()).await.unwrap_err();
        assert!(matches!(err, VaultError::Authentication(_)));
        assert_eq!(vault.state(), SessionState::Locked);
        assert_eq!(vault.unlock("secret1".into()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_operations_require_unlock() {
        let vault = vault();
        assert!(matches!(vault.list().await, Err(VaultError::Session(_))));
        assert!(matches!(vault.decrypt_one(1).await, Err(VaultError::Session(_))));
        assert!(matches!(
            vault.save_all(vec![input(1, "a", "pw")]).await,
            Err(VaultError::Session(_))
        ));
        assert!(matches!(
            vault.rotate("k".into()).await,
            Err(VaultError::Session(_))
        ));
        assert!(matches!(
            vault.search(&SearchFilter::default()).await,
            Err(VaultError::Session(_))
        ));
        assert!(matches!(vault.delete(&[1]).await, Err(VaultError::Session(_))));
    }

    #[tokio::test]
    async fn test_save_all_rejects_whole_batch() {
        let vault = vault();
        vault.unlock("secret1".into()).await.unwrap();

        let result = vault
            .save_all(vec![input(1, "db1", "pw"), input(2, "", "pw"), input(3, "db3", "pw")])
            .await;
        assert!(matches!(result, Err(VaultError::InvalidRecord(_))));
        assert!(vault.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_decrypt_all_isolates_corrupted_field() {
        let vault = vault();
        vault.unlock("secret1".into()).await.unwrap();
        vault
            .save_all(vec![input(1, "db1", "pw1"), input(2, "db2", "pw2")])
            .await
            .unwrap();

        {
            let db = vault.db.lock().await;
            db.conn()
                .execute(
                    "UPDATE credentials SET password_ciphertext = 'corrupt' WHERE id = 2",
                    [],
                )
                .unwrap();
        }

        let mut all = vault.decrypt_all().await.unwrap();
        all.sort_by_key(|c| c.id);
        assert_eq!(all[0].password, "pw1");
        assert_eq!(all[1].password, "");
        assert!(matches!(
            vault.decrypt_one(2).await,
            Err(VaultError::Decryption(_))
        ));
    }

    #[tokio::test]
    async fn test_rotate_then_decrypt() {
        let vault = vault();
        vault.unlock("k1".into()).await.unwrap();
        vault
            .save_all(vec![input(1, "db1", "pw1"), input(2, "db2", "pw2")])
            .await
            .unwrap();
        let before = vault.list().await.unwrap();

        let report = vault.rotate("k2".into()).await.unwrap();
        assert_eq!(report.rotated, 2);

        let after = vault.list().await.unwrap();
        for (b, a) in before.iter().zip(&after) {
            assert_eq!((b.id, &b.server, &b.url, &b.username), (a.id, &a.server, &a.url, &a.username));
            assert_ne!(b.password_ciphertext, a.password_ciphertext);
        }
        assert_eq!(vault.decrypt_one(1).await.unwrap(), "pw1");
        assert_eq!(vault.decrypt_one(2).await.unwrap(), "pw2");

        vault.lock();
        assert!(vault.unlock("k1".into()).await.is_err());
        assert_eq!(vault.unlock("k2".into()).await.unwrap(), report.project_id);
    }

    #[tokio::test]
    async fn test_project_isolation() {
        let vault = vault();
        let a = vault.unlock("alpha".into()).await.unwrap();
        vault.save_all(vec![input(1, "a-db", "pa")]).await.unwrap();

        // 두 번째 프로젝트는 레지스트리에 직접 등록
        let b = {
            let db = vault.db.lock().await;
            vault.registry.create(db.conn(), "beta").unwrap()
        };
        assert_ne!(a, b);

        assert_eq!(vault.unlock("beta".into()).await.unwrap(), b);
        assert!(vault.list().await.unwrap().is_empty());
        assert!(matches!(vault.decrypt_one(1).await, Err(VaultError::NotFound(1))));

        // 다른 프로젝트의 id는 덮어쓸 수 없음
        assert!(vault.save_all(vec![input(1, "b-db", "pb")]).await.is_err());
        vault.save_all(vec![input(2, "b-db", "pb")]).await.unwrap();

        assert_eq!(vault.unlock("alpha".into()).await.unwrap(), a);
        let records = vault.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].server, "a-db");
    }

    #[tokio::test]
    async fn test_open_store_locks_session() {
        let dir = tempdir().unwrap();
        let vault = vault();
        vault.unlock("secret1".into()).await.unwrap();

        let other = dir.path().join("other.db");
        vault.open_store(&other).await.unwrap();
        assert_eq!(vault.state(), SessionState::Locked);
        assert_eq!(vault.store_path().await, Some(other));
        assert!(vault.is_first_run().await.unwrap());
    }

    #[tokio::test]
    async fn test_search_and_delete() {
        let vault = vault();
        vault.unlock("secret1".into()).await.unwrap();
        let mut ssh = input(2, "prod-ssh", "pw");
        ssh.protocol = Some("ssh".into());
        vault
            .save_all(vec![input(1, "prod-web", "pw"), ssh, input(3, "staging", "pw")])
            .await
            .unwrap();

        let found = vault
            .search(&SearchFilter {
                server: "prod".into(),
                protocol: Some("ssh".into()),
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 2);

        assert_eq!(vault.delete(&[1, 3]).await.unwrap(), 2);
        assert_eq!(vault.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_protocols_merges_builtins() {
        let vault = vault();
        assert_eq!(vault.distinct_protocols().await.unwrap(), vec!["www", "ssh", "mysql"]);

        vault.unlock("secret1".into()).await.unwrap();
        let mut rdp = input(1, "win", "pw");
        rdp.protocol = Some("rdp".into());
        vault.save_all(vec![rdp, input(2, "web", "pw")]).await.unwrap();

        assert_eq!(
            vault.distinct_protocols().await.unwrap(),
            vec!["rdp", "www", "ssh", "mysql"]
        );
    }

    #[tokio::test]
    async fn test_edit_without_password_keeps_secret() {
        let vault = vault();
        vault.unlock("secret1".into()).await.unwrap();
        vault.save_all(vec![input(1, "db1", "pw")]).await.unwrap();

        let mut edit = input(1, "db1-renamed", "");
        edit.password = None;
        vault.save_all(vec![edit]).await.unwrap();

        let records = vault.list().await.unwrap();
        assert_eq!(records[0].server, "db1-renamed");
        assert_eq!(vault.decrypt_one(1).await.unwrap(), "pw");
    }

    #[tokio::test]
    async fn test_distinct_protocols_scope_follows_config() {
        let dir = tempdir().unwrap();
        let scoped_config = AppConfig {
            db_path: dir.path().join("vault.db"),
            ..config()
        };
        let shared_config = AppConfig {
            shared_protocols: true,
            ..scoped_config.clone()
        };

        {
            let vault = CredentialVault::open(&scoped_config).unwrap();
            vault.unlock("alpha".into()).await.unwrap();
            let mut rdp = input(1, "win", "pw");
            rdp.protocol = Some("rdp".into());
            vault.save_all(vec![rdp]).await.unwrap();

            let db = vault.db.lock().await;
            vault.registry.create(db.conn(), "beta").unwrap();
        }

        let scoped = CredentialVault::open(&scoped_config).unwrap();
        scoped.unlock("beta".into()).await.unwrap();
        assert_eq!(scoped.distinct_protocols().await.unwrap(), vec!["www", "ssh", "mysql"]);

        let shared = CredentialVault::open(&shared_config).unwrap();
        shared.unlock("beta".into()).await.unwrap();
        assert_eq!(
            shared.distinct_protocols().await.unwrap(),
            vec!["rdp", "www", "ssh", "mysql"]
        );
    }

    #[tokio::test]
    async fn test_batch_save_shares_one_key_derivation() {
        let vault = vault();
        vault.unlock("secret1".into()).await.unwrap();

        let records: Vec<_> = (1..=20).map(|i| input(i, &format!("srv{}", i), &format!("pw{}", i))).collect();
        let save = vault.save_all(records);
        assert_send(&save);
        save.await.unwrap();

        let cipher = vault.cipher.clone();
        let mut batch = cipher.batch("secret1");
        for record in vault.list().await.unwrap() {
            assert_eq!(batch.decrypt(&record.password_ciphertext).unwrap(), format!("pw{}", record.id));
        }
        assert_eq!(batch.derivations(), 1);

        let all = vault.decrypt_all().await.unwrap();
        assert_eq!(all.len(), 20);
        assert!(all.iter().all(|c| c.password == format!("pw{}", c.id)));
    }

    fn assert_send<T: Send>(_: &T) {}
}
