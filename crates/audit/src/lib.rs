#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`record`]: 감사 레코드와 종류
//! - [`buffer`]: 최근 N개만 보관하는 인메모리 버퍼 (진단 레코드 우선 제거)
//! - [`store`]: 저장소 trait과 메모리/JSON Lines 구현
//! - [`sink`]: 호출자 핸들과 백그라운드 플러시 싱크 (`Pipeline` 구현)
//! - [`storage`]: 접근을 감사 로그로 남기는 키-값 저장소 데코레이터
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! AuditHandle::enqueue -> AuditBuffer -> flush loop -> AuditStore::write_batch
//!                              ^                |
//!                              +--- requeue ----+ (실패/시간 초과)
//! ```

pub mod buffer;
pub mod error;
pub mod record;
pub mod sink;
pub mod storage;
pub mod store;

// --- 주요 타입 re-export ---

pub use buffer::AuditBuffer;
pub use error::AuditError;
pub use record::{AuditRecord, RecordKind};
pub use sink::{AuditHandle, AuditSink, BufferStats, SinkConfig};
pub use storage::{AuditedStore, KeyValueStore, MemoryKeyValueStore};
pub use store::{AuditStore, ConfiguredStore, JsonlAuditStore, MemoryAuditStore};
