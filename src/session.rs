//! Session Key Manager - 마스터키 세션 상태 관리
//!
//! - 평문 마스터키를 메모리에 보관하는 유일한 컴포넌트
//! - 상태: Locked → (Bootstrapping | Verifying) → Unlocked → Locked
//! - unlock은 중단 지점 없이 한 번에 끝나므로 Unlocked 또는 Locked 중 하나로만 관찰됩니다

use rusqlite::Connection;
use serde::Serialize;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::crypto::MasterKey;
use crate::db::KeyRegistry;
use crate::error::{VaultError, VaultResult};

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Locked,
    Bootstrapping,
    Verifying,
    Unlocked,
}

/// 활성 세션 (프로세스당 1개, 저장하지 않음)
#[derive(Clone)]
struct Session {
    key: MasterKey,
    project_id: i64,
}

struct Inner {
    state: SessionState,
    session: Option<Session>,
}

impl Inner {
    fn clear(&mut self) {
        self.state = SessionState::Locked;
        self.session = None;
    }
}

/// 마스터키 세션 관리자
pub struct SessionKeyManager {
    inner: RwLock<Inner>,
}

impl SessionKeyManager {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: SessionState::Locked,
                session: None,
            }),
        }
    }

    /// 마스터키로 세션 열기
    ///
    /// 지문이 하나도 없으면 새 프로젝트를 만들고(bootstrap), 아니면 기존 지문과 대조합니다.
    /// 실패하면 이전 세션도 지우고 Locked 상태로 돌아갑니다.
    pub fn unlock(
        &self,
        conn: &Connection,
        registry: &KeyRegistry,
        key: MasterKey,
    ) -> VaultResult<i64> {
        let mut inner = self.write();
        inner.clear();

        if key.is_empty() {
            return Err(VaultError::Authentication(
                "master key must not be empty".to_string(),
            ));
        }

        let result = if registry.is_empty(conn)? {
            inner.state = SessionState::Bootstrapping;
            tracing::info!("Empty key registry, bootstrapping first project");
            registry.create(conn, key.as_str())
        } else {
            inner.state = SessionState::Verifying;
            registry.verify(conn, key.as_str())
        };

        match result {
            Ok(project_id) => {
                inner.session = Some(Session { key, project_id });
                inner.state = SessionState::Unlocked;
                tracing::info!(project_id, "Session unlocked");
                Ok(project_id)
            }
            Err(e) => {
                inner.clear();
                tracing::warn!(error = %e, "Unlock failed, session remains locked");
                Err(e)
            }
        }
    }

    /// Unlocked 상태가 아니면 SessionError
    pub fn require_unlocked(&self) -> VaultResult<(MasterKey, i64)> {
        let inner = self.read();
        match (&inner.state, &inner.session) {
            (SessionState::Unlocked, Some(session)) => {
                Ok((session.key.clone(), session.project_id))
            }
            _ => Err(VaultError::Session("not unlocked".to_string())),
        }
    }

    /// 명시적 잠금
    pub fn lock(&self) {
        self.write().clear();
        tracing::info!("Session locked");
    }

    /// 저장소 파일이 바뀌면 캐시된 키와 project_id는 더 이상 유효하지 않음
    pub fn lock_for_new_database(&self) {
        self.write().clear();
        tracing::info!("Session locked for new database");
    }

    /// 키 교체가 commit된 뒤 세션 키를 새 키로 바꿈
    pub(crate) fn replace_key(&self, project_id: i64, new_key: MasterKey) -> VaultResult<()> {
        let mut inner = self.write();
        match inner.session.as_mut() {
            Some(session) if session.project_id == project_id => {
                session.key = new_key;
                Ok(())
            }
            _ => Err(VaultError::Session(
                "session changed during key rotation".to_string(),
            )),
        }
    }

    pub fn state(&self) -> SessionState {
        self.read().state
    }

    pub fn project_id(&self) -> Option<i64> {
        self.read().session.as_ref().map(|s| s.project_id)
    }

    // poison은 무시: Inner는 항상 완결된 값으로만 갱신됨
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SessionKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KdfParams;
    use crate::db::Database;

    fn setup() -> (Database, KeyRegistry, SessionKeyManager) {
        (
            Database::open_in_memory().unwrap(),
            KeyRegistry::new(KdfParams::insecure_fast()),
            SessionKeyManager::new(),
        )
    }

    #[test]
    fn test_starts_locked() {
        let (_, _, session) = setup();
        assert_eq!(session.state(), SessionState::Locked);
        assert!(matches!(
            session.require_unlocked(),
            Err(VaultError::Session(_))
        ));
    }

    #[test]
    fn test_bootstrap_then_verify() {
        let (db, registry, session) = setup();

        let project_id = session
            .unlock(db.conn(), &registry, "secret1".into())
            .unwrap();
        assert_eq!(project_id, 1);
        assert_eq!(session.state(), SessionState::Unlocked);

        let (key, id) = session.require_unlocked().unwrap();
        assert_eq!(key.as_str(), "secret1");
        assert_eq!(id, 1);

        session.lock();
        assert_eq!(session.state(), SessionState::Locked);

        let again = session
            .unlock(db.conn(), &registry, "secret1".into())
            .unwrap();
        assert_eq!(again, 1);
    }

    #[test]
    fn test_wrong_key_clears_session() {
        let (db, registry, session) = setup();
        session
            .unlock(db.conn(), &registry, "secret1".into())
            .unwrap();

        let err = session
            .unlock(db.conn(), &registry, "wrong".into())
            .unwrap_err();
        assert!(matches!(err, VaultError::Authentication(_)));
        assert_eq!(session.state(), SessionState::Locked);
        assert!(session.project_id().is_none());
    }

    #[test]
    fn test_empty_key_rejected_without_bootstrap() {
        let (db, registry, session) = setup();
        let err = session
            .unlock(db.conn(), &registry, "".into())
            .unwrap_err();
        assert!(matches!(err, VaultError::Authentication(_)));
        assert!(registry.is_empty(db.conn()).unwrap());
    }

    #[test]
    fn test_lock_for_new_database() {
        let (db, registry, session) = setup();
        session
            .unlock(db.conn(), &registry, "secret1".into())
            .unwrap();
        session.lock_for_new_database();
        assert_eq!(session.state(), SessionState::Locked);
        assert!(session.require_unlocked().is_err());
    }

    #[test]
    fn test_replace_key_requires_same_project() {
        let (db, registry, session) = setup();
        session
            .unlock(db.conn(), &registry, "secret1".into())
            .unwrap();

        assert!(session.replace_key(2, "other".into()).is_err());
        session.replace_key(1, "secret2".into()).unwrap();
        let (key, _) = session.require_unlocked().unwrap();
        assert_eq!(key.as_str(), "secret2");
    }
}
