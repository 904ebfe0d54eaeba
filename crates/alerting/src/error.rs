//! 알림 상태 에러
//!
//! 존재하지 않는 알림 ID나 허용되지 않는 전이는 호출자에게 에러로 보고됩니다.
//! 이미 확인/해결된 알림을 다시 확인/해결하는 것은 에러가 아닙니다.

use watchpost_core::error::WatchpostError;

/// 알림 상태 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlertError {
    /// 알림을 찾을 수 없음
    #[error("alert not found: {0}")]
    NotFound(String),

    /// 해결된 알림은 에스컬레이션할 수 없음
    #[error("alert {0} is resolved and cannot be escalated")]
    AlreadyResolved(String),

    /// 이미 에스컬레이션된 알림
    #[error("alert {id} was already escalated as {escalated_id}")]
    AlreadyEscalated { id: String, escalated_id: String },
}

impl From<AlertError> for WatchpostError {
    fn from(err: AlertError) -> Self {
        WatchpostError::Alert(err.to_string())
    }
}
