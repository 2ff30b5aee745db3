//! credvault - 로컬 서버 자격증명 관리자 백엔드 라이브러리
//!
//! 서버 자격증명을 SQLite에 저장하고, 비밀번호는 사용자가 입력한 마스터키로 암호화합니다.
//! 마스터키는 저장하지 않으며 지문(fingerprint)만 보관합니다.

pub mod commands;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod rotation;
pub mod session;
pub mod vault;

use tauri::plugin::TauriPlugin;
use tauri::Runtime;

pub use config::AppConfig;
pub use error::{CommandError, CommandResult, VaultError, VaultResult};
pub use vault::CredentialVault;

/// 설정 로드 + 로깅 초기화 후 Tauri 플러그인 생성
///
/// 앱 셸에서 `tauri::Builder::default().plugin(credvault_lib::plugin()?)` 형태로 등록합니다.
pub fn plugin<R: Runtime>() -> VaultResult<TauriPlugin<R>> {
    let config = AppConfig::load()?;
    logging::init(&config.log_filter);
    tracing::info!(db_path = %config.db_path.display(), "credvault configured");
    Ok(commands::init(config))
}
