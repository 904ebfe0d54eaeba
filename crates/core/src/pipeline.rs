//! 파이프라인 trait: 모듈 확장 포인트 정의
//!
//! - [`Pipeline`]: 백그라운드 태스크를 가진 모듈의 생명주기 (시작, 정지, 상태 확인)
//! - [`Detector`]: 이벤트를 검사하여 [`Finding`]을 만드는 탐지기

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::WatchpostError;
use crate::event::SecurityEvent;
use crate::types::Finding;

/// 모듈 건강 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작하지만 성능 저하 (사유 포함)
    Degraded(String),
    /// 동작 불가 (사유 포함)
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 백그라운드 태스크를 소유하는 모듈의 생명주기 trait
///
/// `stop()`은 graceful shutdown을 수행해야 합니다 (버퍼 드레인, 최종 플러시).
pub trait Pipeline: Send + Sync {
    /// 모듈을 시작합니다. 이미 실행 중이면 `PipelineError::AlreadyRunning`.
    fn start(&mut self) -> impl Future<Output = Result<(), WatchpostError>> + Send;

    /// 모듈을 정지합니다. 실행 중이 아니면 `PipelineError::NotRunning`.
    fn stop(&mut self) -> impl Future<Output = Result<(), WatchpostError>> + Send;

    /// 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// 탐지 로직을 구현하는 trait
///
/// 새로운 탐지기를 추가하려면 이 trait을 구현합니다.
/// 구현은 순수해야 합니다: 같은 이벤트에 대해 항상 같은 결과를 반환하고,
/// 검사할 수 없는 입력에는 에러 대신 빈 결과를 반환합니다.
pub trait Detector: Send + Sync {
    /// 탐지기 이름
    fn name(&self) -> &str;

    /// 이벤트를 검사하여 탐지 결과를 반환합니다.
    fn detect(&self, event: &SecurityEvent) -> Vec<Finding>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert_eq!(
            HealthStatus::Degraded("buffer 90% full".to_owned()).to_string(),
            "degraded: buffer 90% full"
        );
    }

    #[test]
    fn health_status_predicates() {
        assert!(HealthStatus::Healthy.is_healthy());
        assert!(HealthStatus::Unhealthy("x".to_owned()).is_unhealthy());
        assert!(!HealthStatus::Degraded("x".to_owned()).is_unhealthy());
    }
}
