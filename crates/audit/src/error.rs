//! 감사 로그 에러 타입
//!
//! [`AuditError`]는 플러시 경로에서만 발생하며 호출자에게 전달되지 않습니다.
//! 싱크가 로그로 남기고 다음 주기에 재시도합니다.
//! 시작 시점 에러(저장소 열기 실패 등)는 `From<AuditError> for WatchpostError`로 전파됩니다.

use watchpost_core::error::WatchpostError;

/// 감사 로그 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// 저장소 배치 쓰기 실패
    #[error("write failed on store '{store}': {reason}")]
    Write {
        /// 저장소 이름
        store: String,
        /// 실패 사유
        reason: String,
    },

    /// 배치 쓰기 시간 초과
    #[error("write timed out after {timeout_ms}ms")]
    Timeout {
        /// 적용된 제한 시간 (밀리초)
        timeout_ms: u64,
    },

    /// 레코드 직렬화 실패
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// 지원하지 않는 저장소 종류
    #[error("unknown audit store: {0}")]
    UnknownStore(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<AuditError> for WatchpostError {
    fn from(err: AuditError) -> Self {
        WatchpostError::Audit(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_error_display() {
        let err = AuditError::Write {
            store: "jsonl".to_owned(),
            reason: "disk full".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("jsonl"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn timeout_display() {
        let err = AuditError::Timeout { timeout_ms: 10_000 };
        assert!(err.to_string().contains("10000ms"));
    }

    #[test]
    fn converts_to_watchpost_error() {
        let err: WatchpostError = AuditError::UnknownStore("s3".to_owned()).into();
        assert!(matches!(err, WatchpostError::Audit(_)));
        assert!(err.to_string().contains("s3"));
    }
}
