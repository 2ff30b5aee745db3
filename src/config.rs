//! 애플리케이션 설정
//!
//! 환경 변수(및 `.env.local` / `.env`)에서 읽습니다.
//!
//! | 변수 | 기본값 |
//! |---|---|
//! | `CREDVAULT_DB_PATH` | `default.db` |
//! | `CREDVAULT_KDF_MEMORY_KIB` | 19456 |
//! | `CREDVAULT_KDF_ITERATIONS` | 2 |
//! | `CREDVAULT_KDF_PARALLELISM` | 1 |
//! | `CREDVAULT_SHARED_PROTOCOLS` | `false` |
//! | `CREDVAULT_LOG` | `info` |

use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::crypto::KdfParams;
use crate::error::{VaultError, VaultResult};

const ENV_PREFIX: &str = "CREDVAULT_";

pub const ENV_DB_PATH: &str = "CREDVAULT_DB_PATH";
pub const ENV_KDF_MEMORY_KIB: &str = "CREDVAULT_KDF_MEMORY_KIB";
pub const ENV_KDF_ITERATIONS: &str = "CREDVAULT_KDF_ITERATIONS";
pub const ENV_KDF_PARALLELISM: &str = "CREDVAULT_KDF_PARALLELISM";
pub const ENV_SHARED_PROTOCOLS: &str = "CREDVAULT_SHARED_PROTOCOLS";
pub const ENV_LOG: &str = "CREDVAULT_LOG";

const DEFAULT_DB_FILE: &str = "default.db";

/// UI 프로토콜 선택지에 항상 포함되는 기본값
pub const BUILTIN_PROTOCOLS: [&str; 3] = ["www", "ssh", "mysql"];

/// 런타임 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub kdf: KdfParams,
    /// true면 프로토콜 추천 목록을 저장소 전체에서 수집 (프로젝트 구분 없음)
    pub shared_protocols: bool,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
            kdf: KdfParams::default(),
            shared_protocols: false,
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// `.env` 파일을 로드한 뒤 프로세스 환경에서 설정 구성
    pub fn load() -> VaultResult<Self> {
        load_env_files();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수로 설정 구성 (테스트에서 환경 변수 없이 사용)
    pub fn from_lookup<F>(lookup: F) -> VaultResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let kdf = KdfParams {
            memory_kib: parse_or(get(ENV_KDF_MEMORY_KIB), ENV_KDF_MEMORY_KIB, defaults.kdf.memory_kib)?,
            iterations: parse_or(get(ENV_KDF_ITERATIONS), ENV_KDF_ITERATIONS, defaults.kdf.iterations)?,
            parallelism: parse_or(
                get(ENV_KDF_PARALLELISM),
                ENV_KDF_PARALLELISM,
                defaults.kdf.parallelism,
            )?,
        };
        kdf.validate()
            .map_err(|e| VaultError::Config(e.to_string()))?;

        let shared_protocols = match get(ENV_SHARED_PROTOCOLS).as_deref() {
            None => defaults.shared_protocols,
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            Some(other) => {
                return Err(VaultError::Config(format!(
                    "{} must be a boolean, got {:?}",
                    ENV_SHARED_PROTOCOLS, other
                )))
            }
        };

        Ok(Self {
            db_path: get(ENV_DB_PATH).map(PathBuf::from).unwrap_or(defaults.db_path),
            kdf,
            shared_protocols,
            log_filter: get(ENV_LOG).unwrap_or(defaults.log_filter),
        })
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> VaultResult<T> {
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| VaultError::Config(format!("{} has invalid value {:?}", key, raw))),
    }
}

/// `.env` 한 줄을 `(KEY, VALUE)`로 해석
///
/// 이 크레이트가 읽는 변수(`CREDVAULT_*`, `RUST_LOG`)만 받아들이고 나머지 줄은 무시합니다.
fn parse_env_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;

    let key = key.trim();
    if !(key.starts_with(ENV_PREFIX) || key == "RUST_LOG") {
        return None;
    }

    let value = value.trim();
    let unquoted = ['"', '\'']
        .into_iter()
        .find_map(|quote| value.strip_prefix(quote)?.strip_suffix(quote));
    Some((key, unquoted.unwrap_or(value)))
}

/// strict 파서가 실패한 파일에서 이 크레이트의 변수만 읽어들임
///
/// 이미 비어 있지 않은 값으로 설정된 변수는 덮어쓰지 않습니다.
fn load_env_lenient(path: &Path) -> std::io::Result<usize> {
    let text = std::fs::read_to_string(path)?;
    let mut loaded = 0usize;

    for (key, value) in text.lines().filter_map(parse_env_line) {
        let already_set = std::env::var(key)
            .map(|existing| !existing.trim().is_empty())
            .unwrap_or(false);
        if already_set {
            continue;
        }
        std::env::set_var(key, value);
        loaded += 1;
    }

    Ok(loaded)
}

fn load_env_files() {
    for file in [".env.local", ".env"] {
        if dotenvy::from_filename(file).is_ok() {
            continue;
        }
        let path = Path::new(file);
        if path.exists() {
            match load_env_lenient(path) {
                Ok(loaded) => tracing::debug!(file, loaded, "Loaded env file leniently"),
                Err(e) => tracing::warn!(file, error = %e, "Failed to read env file"),
            }
        }
    }
}
