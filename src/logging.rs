//! 구조화 로깅 초기화
//!
//! 필터 우선순위: `RUST_LOG` → 설정의 `log_filter` (`CREDVAULT_LOG`).
//! 키 자료와 평문 비밀번호는 어떤 레벨에서도 기록하지 않습니다.

use tracing_subscriber::EnvFilter;

/// 전역 subscriber 설치. 이미 설치되어 있으면 false
pub fn init(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
