//! 에러 타입: 도메인별 에러 정의
//!
//! 수집 경로(탐지, 카운터, 점수, 알림 생성)는 에러를 호출자에게 올리지 않습니다.
//! 호출자에게 전달되는 에러는 설정 에러(시작 시 치명적)와
//! 상태 에러(존재하지 않는 알림 ID)뿐입니다.

/// Watchpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum WatchpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 탐지 엔진 에러
    #[error("detection error: {0}")]
    Detection(#[from] DetectionError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// 알림 상태 에러
    #[error("alert error: {0}")]
    Alert(String),

    /// 감사 로그 에러
    #[error("audit error: {0}")]
    Audit(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 백그라운드 태스크 종료 실패
    #[error("task '{name}' failed to stop: {reason}")]
    TaskJoin { name: String, reason: String },
}

/// 탐지 엔진 에러
///
/// 규칙 컴파일 실패처럼 시작 시점에만 발생합니다.
/// 이벤트 검사 중에는 발생하지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    /// 탐지 규칙 컴파일 실패
    #[error("rule '{rule_id}' failed to compile: {reason}")]
    RuleCompile { rule_id: String, reason: String },

    /// 중복된 규칙 ID
    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),
}

/// 스토리지 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 백엔드 연결 실패
    #[error("connection failed: {0}")]
    Connection(String),

    /// 읽기/쓰기 실패
    #[error("operation failed: {0}")]
    Operation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: WatchpostError = ConfigError::InvalidValue {
            field: "audit.batch_size".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        assert!(matches!(err, WatchpostError::Config(_)));
        assert!(err.to_string().contains("audit.batch_size"));
    }

    #[test]
    fn pipeline_error_display() {
        let err = PipelineError::TaskJoin {
            name: "alert-sweep".to_owned(),
            reason: "panicked".to_owned(),
        };
        assert_eq!(err.to_string(), "task 'alert-sweep' failed to stop: panicked");
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: WatchpostError = io.into();
        assert!(matches!(err, WatchpostError::Io(_)));
    }
}
