#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rules`]: 내장 시그니처 규칙 테이블과 컴파일
//! - [`signature`]: 페이로드/컨텍스트 시그니처 탐지기
//! - [`agent`]: User-Agent 휴리스틱 탐지기
//! - [`detector`]: 탐지기 합성 ([`ThreatDetector`])
//! - [`score`]: 위험 점수 계산
//! - [`config`]: 탐지기 설정 (core 설정에서 파생)

pub mod agent;
pub mod config;
pub mod detector;
pub mod rules;
pub mod score;
pub mod signature;

// --- 주요 타입 re-export ---

pub use agent::AgentDetector;
pub use config::DetectorConfig;
pub use detector::ThreatDetector;
pub use rules::{BUILTIN_RULES, SignatureRule};
pub use score::{RiskAssessment, base_score, score};
pub use signature::SignatureDetector;
