#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`engine`]: 이벤트 평가 ([`SecurityEngine::assess`])와 행위 카운터 매핑
//! - [`service`]: 감사 싱크와 주기 작업을 포함한 서비스 생명주기 (`Pipeline` 구현)

pub mod engine;
pub mod service;

// --- 주요 타입 re-export ---

pub use engine::{Assessment, SecurityEngine, Verdict, counters_for};
pub use service::EngineService;
