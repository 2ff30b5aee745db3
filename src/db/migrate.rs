//! 구버전 저장소 레이아웃 변환
//!
//! 구버전 파일은 지문을 `encrypt_keys.hash_key`(SHA-1 hex)에, 자격증명을
//! `password`/`create_at`/`update_at` 컬럼에 보관합니다.
//! 열 때 한 번 현재 두 테이블 구조로 옮기고, SHA-1 지문은 그대로 복사해
//! 첫 unlock 때 Argon2id로 교체되게 둡니다.

use rusqlite::{Connection, OptionalExtension};

use super::schema;
use crate::error::VaultResult;

/// 변환 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyMigration {
    pub fingerprints: usize,
    pub credentials: usize,
    /// 필수 필드가 비었거나 지문 없는 프로젝트를 가리켜 옮기지 못한 행
    pub skipped: usize,
}

fn table_exists(conn: &Connection, name: &str) -> VaultResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> VaultResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// 구버전 레이아웃이면 변환하고 결과를 반환 (현재 레이아웃이면 None)
pub fn upgrade_legacy_layout(conn: &Connection) -> VaultResult<Option<LegacyMigration>> {
    if !table_exists(conn, "encrypt_keys")? {
        return Ok(None);
    }

    let tx = conn.unchecked_transaction()?;

    let legacy_credentials =
        table_exists(&tx, "credentials")? && !has_column(&tx, "credentials", "password_ciphertext")?;
    if legacy_credentials {
        tx.execute_batch("ALTER TABLE credentials RENAME TO legacy_credentials;")?;
    }
    tx.execute_batch(schema::CREATE_SCHEMA)?;

    let fingerprints = tx.execute(
        "INSERT OR IGNORE INTO key_fingerprints (project_id, hash)
         SELECT id, lower(trim(hash_key)) FROM encrypt_keys",
        [],
    )?;

    let mut migration = LegacyMigration {
        fingerprints,
        ..LegacyMigration::default()
    };

    if legacy_credentials {
        let total: i64 =
            tx.query_row("SELECT count(*) FROM legacy_credentials", [], |row| row.get(0))?;

        // DATETIME 문자열 → epoch millis (파싱 불가/NULL이면 0)
        migration.credentials = tx.execute(
            "INSERT INTO credentials
                (id, project_id, server, protocol, url, username, password_ciphertext, created_at, updated_at)
             SELECT id,
                    project_id,
                    trim(server),
                    COALESCE(NULLIF(trim(protocol), ''), 'www'),
                    trim(url),
                    COALESCE(username, ''),
                    COALESCE(password, ''),
                    COALESCE(CAST(strftime('%s', create_at) AS INTEGER), 0) * 1000,
                    COALESCE(CAST(strftime('%s', update_at) AS INTEGER), 0) * 1000
             FROM legacy_credentials
             WHERE length(trim(COALESCE(server, ''))) > 0
               AND length(trim(COALESCE(url, ''))) > 0
               AND project_id IN (SELECT project_id FROM key_fingerprints)",
            [],
        )?;
        migration.skipped = usize::try_from(total)
            .unwrap_or(0)
            .saturating_sub(migration.credentials);

        tx.execute_batch("DROP TABLE legacy_credentials;")?;
    }

    tx.execute_batch("DROP TABLE encrypt_keys;")?;
    tx.commit()?;

    if migration.skipped > 0 {
        tracing::warn!(skipped = migration.skipped, "Legacy credentials skipped during migration");
    }
    tracing::info!(
        fingerprints = migration.fingerprints,
        credentials = migration.credentials,
        "Migrated legacy store layout"
    );
    Ok(Some(migration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::fingerprint::{self, FingerprintScheme};
    use crate::crypto::KdfParams;
    use crate::db::{CredentialStore, Database, KeyRegistry};
    use tempfile::tempdir;

    const LEGACY_SCHEMA: &str = r#"
        CREATE TABLE encrypt_keys (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hash_key TEXT NOT NULL
        );
        CREATE TABLE credentials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL,
            server TEXT NOT NULL,
            protocol TEXT NOT NULL DEFAULT 'www',
            url TEXT NOT NULL,
            username TEXT,
            password TEXT,
            create_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            update_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
    "#;

    fn legacy_store(path: &std::path::Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(LEGACY_SCHEMA).unwrap();
        conn.execute(
            "INSERT INTO encrypt_keys (hash_key) VALUES (?1)",
            [fingerprint::legacy_sha1("alpha")],
        )
        .unwrap();
        conn.execute_batch(
            "INSERT INTO credentials (project_id, server, protocol, url, username, password, create_at, update_at)
             VALUES (1, 'db1', 'mysql', '10.0.0.1', 'root', NULL, '2023-05-01 10:00:00', '2023-05-02 10:00:00');
             INSERT INTO credentials (project_id, server, url) VALUES (1, '   ', '10.0.0.2');
             INSERT INTO credentials (project_id, server, url) VALUES (7, 'orphan', '10.0.0.3');",
        )
        .unwrap();
    }

    #[test]
    fn test_legacy_store_opens_and_unlocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passman.db");
        legacy_store(&path);

        let db = Database::open(&path).unwrap();
        let registry = KeyRegistry::new(KdfParams::insecure_fast());
        assert!(!registry.is_empty(db.conn()).unwrap());
        assert!(registry.verify(db.conn(), "wrong").is_err());
        assert_eq!(registry.verify(db.conn(), "alpha").unwrap(), 1);

        let hash: String = db
            .conn()
            .query_row("SELECT hash FROM key_fingerprints WHERE project_id = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(FingerprintScheme::detect(&hash), FingerprintScheme::Argon2id);

        let records = CredentialStore.list_by_project(db.conn(), 1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].server, "db1");
        assert_eq!(records[0].protocol, "mysql");
        assert_eq!(records[0].password_ciphertext, "");
        assert_eq!(records[0].created_at, 1_682_935_200_000);
        assert_eq!(records[0].updated_at, 1_683_021_600_000);
    }

    #[test]
    fn test_migration_reports_counts_and_runs_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passman.db");
        legacy_store(&path);

        let conn = Connection::open(&path).unwrap();
        let migration = upgrade_legacy_layout(&conn).unwrap().unwrap();
        assert_eq!(
            migration,
            LegacyMigration {
                fingerprints: 1,
                credentials: 1,
                skipped: 2,
            }
        );
        assert!(!table_exists(&conn, "encrypt_keys").unwrap());
        assert!(!table_exists(&conn, "legacy_credentials").unwrap());
        assert!(upgrade_legacy_layout(&conn).unwrap().is_none());
    }

    #[test]
    fn test_current_layout_is_left_alone() {
        let db = Database::open_in_memory().unwrap();
        assert!(upgrade_legacy_layout(db.conn()).unwrap().is_none());
    }
}
