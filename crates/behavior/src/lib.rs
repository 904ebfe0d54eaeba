#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`window`]: 시간순 타임스탬프 슬라이딩 윈도우
//! - [`tracker`]: 식별자별 카운터, 임계값 판정, brute-force 차단

pub mod tracker;
pub mod window;

// --- 주요 타입 re-export ---

pub use tracker::{BehaviorTracker, CounterState, PurgeStats};
pub use window::CounterWindow;
