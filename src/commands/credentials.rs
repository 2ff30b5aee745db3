//! Credential Commands
//!
//! 금고 잠금 해제, 자격증명 조회/저장/검색, 키 교체 관련 Tauri 명령어

use serde::{Deserialize, Serialize};
use tauri::State;

use crate::error::{CommandError, CommandResult};
use crate::models::{
    CredentialInput, CredentialRecord, DecryptedCredential, RotationReport, SearchFilter,
};
use crate::session::SessionState;
use crate::vault::CredentialVault;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockArgs {
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateArgs {
    pub new_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenStoreArgs {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultStatus {
    pub state: SessionState,
    pub first_run: bool,
    pub store_path: Option<String>,
}

/// 저장소 파일 전환 (세션 잠김)
#[tauri::command]
pub async fn open_store(args: OpenStoreArgs, vault: State<'_, CredentialVault>) -> CommandResult<()> {
    if args.path.trim().is_empty() {
        return Err(CommandError {
            code: "PATH_ERROR".to_string(),
            message: "Store path must not be empty.".to_string(),
            details: None,
        });
    }
    vault
        .open_store(std::path::Path::new(args.path.trim()))
        .await
        .map_err(CommandError::from)
}

/// 현재 세션/저장소 상태
#[tauri::command]
pub async fn vault_status(vault: State<'_, CredentialVault>) -> CommandResult<VaultStatus> {
    let first_run = vault.is_first_run().await.map_err(CommandError::from)?;
    Ok(VaultStatus {
        state: vault.state(),
        first_run,
        store_path: vault
            .store_path()
            .await
            .map(|p| p.to_string_lossy().into_owned()),
    })
}

#[tauri::command]
pub async fn is_first_run(vault: State<'_, CredentialVault>) -> CommandResult<bool> {
    vault.is_first_run().await.map_err(CommandError::from)
}

/// 마스터키로 잠금 해제, project_id 반환
#[tauri::command]
pub async fn unlock(args: UnlockArgs, vault: State<'_, CredentialVault>) -> CommandResult<i64> {
    vault
        .unlock(args.key.into())
        .await
        .map_err(CommandError::from)
}

#[tauri::command]
pub fn lock(vault: State<'_, CredentialVault>) {
    vault.lock();
}

/// 활성 프로젝트 레코드 목록 (비밀번호는 암호문)
#[tauri::command]
pub async fn list_credentials(
    vault: State<'_, CredentialVault>,
) -> CommandResult<Vec<CredentialRecord>> {
    vault.list().await.map_err(CommandError::from)
}

#[tauri::command]
pub async fn decrypt_password(id: i64, vault: State<'_, CredentialVault>) -> CommandResult<String> {
    vault.decrypt_one(id).await.map_err(CommandError::from)
}

#[tauri::command]
pub async fn decrypt_all(
    vault: State<'_, CredentialVault>,
) -> CommandResult<Vec<DecryptedCredential>> {
    vault.decrypt_all().await.map_err(CommandError::from)
}

/// 편집된 행 일괄 저장
#[tauri::command]
pub async fn save_credentials(
    records: Vec<CredentialInput>,
    vault: State<'_, CredentialVault>,
) -> CommandResult<()> {
    vault.save_all(records).await.map_err(CommandError::from)
}

#[tauri::command]
pub async fn delete_credentials(
    ids: Vec<i64>,
    vault: State<'_, CredentialVault>,
) -> CommandResult<usize> {
    vault.delete(&ids).await.map_err(CommandError::from)
}

/// 마스터키 교체
#[tauri::command]
pub async fn rotate_key(
    args: RotateArgs,
    vault: State<'_, CredentialVault>,
) -> CommandResult<RotationReport> {
    vault
        .rotate(args.new_key.into())
        .await
        .map_err(CommandError::from)
}

#[tauri::command]
pub async fn search_credentials(
    filter: SearchFilter,
    vault: State<'_, CredentialVault>,
) -> CommandResult<Vec<CredentialRecord>> {
    vault.search(&filter).await.map_err(CommandError::from)
}

#[tauri::command]
pub async fn list_protocols(vault: State<'_, CredentialVault>) -> CommandResult<Vec<String>> {
    vault.distinct_protocols().await.map_err(CommandError::from)
}
