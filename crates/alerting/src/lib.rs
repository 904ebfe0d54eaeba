#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`alert`]: 알림, 생성 요청, 조회 필터, 집계 타입
//! - [`manager`]: 생성/에스컬레이션/확인/해결/스윕을 담당하는 알림 관리자
//! - [`sanitize`]: 알림 데이터 정제 (길이 제한, 제어 문자, 마크업 이스케이프)
//! - [`error`]: 알림 상태 에러

pub mod alert;
pub mod error;
pub mod manager;
pub mod sanitize;

// --- 주요 타입 re-export ---

pub use alert::{
    Acknowledgement, Alert, AlertData, AlertFilter, AlertMetrics, AlertRequest, FindingSummary,
    Resolution, Transition,
};
pub use error::AlertError;
pub use manager::{AlertManager, AlertManagerConfig, AlertOutcome, SweepStats};
pub use sanitize::sanitize;
