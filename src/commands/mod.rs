//! Tauri Commands Module
//!
//! 프론트엔드에서 호출 가능한 Tauri 명령어 정의.
//! 앱 셸은 `init()`이 돌려주는 플러그인을 등록하기만 하면 됩니다.

pub mod credentials;

use tauri::plugin::{Builder, TauriPlugin};
use tauri::{Manager, Runtime};

use crate::config::AppConfig;
use crate::vault::CredentialVault;

/// 플러그인 이름 (`plugin:credvault|<command>`)
pub const PLUGIN_NAME: &str = "credvault";

/// 금고 플러그인 생성. 앱 시작 시 기본 저장소를 열어 상태로 관리합니다.
pub fn init<R: Runtime>(config: AppConfig) -> TauriPlugin<R> {
    Builder::new(PLUGIN_NAME)
        .invoke_handler(tauri::generate_handler![
            credentials::open_store,
            credentials::vault_status,
            credentials::is_first_run,
            credentials::unlock,
            credentials::lock,
            credentials::list_credentials,
            credentials::decrypt_password,
            credentials::decrypt_all,
            credentials::save_credentials,
            credentials::delete_credentials,
            credentials::rotate_key,
            credentials::search_credentials,
            credentials::list_protocols,
        ])
        .setup(move |app, _api| {
            let vault = CredentialVault::open(&config)?;
            app.manage(vault);
            Ok(())
        })
        .build()
}
