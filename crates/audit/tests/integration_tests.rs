//! 통합 테스트 -- 감사 싱크의 전달 보장과 종료 동작 검증

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use serde_json::json;

use watchpost_audit::{
    AuditError, AuditRecord, AuditSink, AuditStore, AuditedStore, ConfiguredStore,
    KeyValueStore, MemoryAuditStore, MemoryKeyValueStore, RecordKind, SinkConfig,
};
use watchpost_core::config::AuditConfig;
use watchpost_core::pipeline::{HealthStatus, Pipeline};

/// 처음 `failures`번은 실패하고 이후에는 메모리에 기록하는 저장소
#[derive(Clone)]
struct FlakyStore {
    remaining_failures: Arc<AtomicU32>,
    written: MemoryAuditStore,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            remaining_failures: Arc::new(AtomicU32::new(failures)),
            written: MemoryAuditStore::new(),
        }
    }
}

impl AuditStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn write_batch(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AuditError::Write {
                store: "flaky".to_owned(),
                reason: "simulated outage".to_owned(),
            });
        }
        self.written.write_batch(records).await
    }
}

/// 첫 쓰기는 제한 시간보다 오래 걸리는 저장소
#[derive(Clone)]
struct SlowStore {
    calls: Arc<AtomicU32>,
    written: MemoryAuditStore,
}

impl AuditStore for SlowStore {
    fn name(&self) -> &str {
        "slow"
    }

    async fn write_batch(&self, records: &[AuditRecord]) -> Result<(), AuditError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        self.written.write_batch(records).await
    }
}

fn config(batch_size: usize, max_buffered: usize) -> SinkConfig {
    SinkConfig {
        batch_size,
        max_buffered,
        flush_interval: Duration::from_secs(30),
        flush_timeout: Duration::from_secs(10),
    }
}

fn record(i: usize) -> AuditRecord {
    AuditRecord::from_value(RecordKind::Event, "event_assessed", json!({ "seq": i }))
}

/// 한 번 실패한 뒤 성공하는 저장소에서도 모든 레코드가 최소 한 번 기록된다
#[tokio::test(start_paused = true)]
async fn test_at_least_once_delivery_after_failed_write() {
    let store = FlakyStore::new(1);
    let mut sink = AuditSink::new(config(10, 1000), store.clone());
    let handle = sink.handle();
    sink.start().await.unwrap();

    let ids: Vec<String> = (0..25)
        .map(|i| {
            let record = record(i);
            let id = record.id.clone();
            handle.enqueue(record);
            id
        })
        .collect();

    // batch_size 도달 알림 -> 첫 쓰기 실패 -> 다음 주기에 재시도
    tokio::time::sleep(Duration::from_secs(31)).await;
    sink.stop().await.unwrap();

    let written = store.written.records();
    for id in &ids {
        assert!(written.iter().any(|r| &r.id == id), "record {id} lost");
    }
    assert!(handle.is_empty());
    // 실패했던 배치는 attempts가 올라간 채 기록된다
    assert!(written.iter().any(|r| r.attempts == 1));
}

/// 시간 초과한 쓰기는 실패로 간주되어 재시도된다
#[tokio::test(start_paused = true)]
async fn test_timed_out_write_is_requeued() {
    let store = SlowStore {
        calls: Arc::new(AtomicU32::new(0)),
        written: MemoryAuditStore::new(),
    };
    let sink = AuditSink::new(config(5, 100), store.clone());
    let handle = sink.handle();
    for i in 0..3 {
        handle.enqueue(record(i));
    }

    let err = sink.flush_once().await.unwrap_err();
    assert!(matches!(err, AuditError::Timeout { timeout_ms: 10_000 }));
    assert_eq!(handle.len(), 3);
    assert!(handle.pending().iter().all(|r| r.attempts == 1));

    assert_eq!(sink.flush_once().await.unwrap(), 3);
    assert!(handle.is_empty());
}

/// 종료 시 남은 레코드를 최종 드레인한다
#[tokio::test(start_paused = true)]
async fn test_stop_drains_remaining_records() {
    let store = MemoryAuditStore::new();
    let mut sink = AuditSink::new(config(50, 1000), store.clone());
    let handle = sink.handle();
    sink.start().await.unwrap();

    for i in 0..7 {
        handle.enqueue(record(i));
    }
    sink.stop().await.unwrap();

    assert_eq!(store.len(), 7);
    let order: Vec<_> = store
        .records()
        .iter()
        .map(|r| r.payload["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(order, vec![0, 1, 2, 3, 4, 5, 6]);
}

/// 버퍼 초과는 최근 레코드만 남기고 진단 레코드로 보고된다
#[tokio::test]
async fn test_overflow_is_reported_as_diagnostic() {
    let store = MemoryAuditStore::new();
    let sink = AuditSink::new(config(50, 10), store.clone());
    let handle = sink.handle();
    for i in 0..15 {
        handle.enqueue(record(i));
    }

    sink.flush_all().await.unwrap();

    let written = store.records();
    let events: Vec<_> = written
        .iter()
        .filter(|r| r.kind == RecordKind::Event)
        .map(|r| r.payload["seq"].as_u64().unwrap())
        .collect();
    assert_eq!(events, (5..15).collect::<Vec<u64>>());

    let diagnostics: Vec<_> = written.iter().filter(|r| r.is_diagnostic()).collect();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].action, "buffer_overflow");
    assert_eq!(diagnostics[0].payload["dropped"], 5);
    assert_eq!(handle.stats().dropped_total, 5);
}

/// 연속 실패 시 Degraded 보고
#[tokio::test]
async fn test_health_degrades_after_repeated_failures() {
    let mut sink = AuditSink::new(config(1, 100), FlakyStore::new(u32::MAX));
    let handle = sink.handle();
    sink.start().await.unwrap();

    handle.enqueue(record(0));
    for _ in 0..3 {
        assert!(sink.flush_once().await.is_err());
    }
    assert!(matches!(
        sink.health_check().await,
        HealthStatus::Degraded(_)
    ));
    sink.stop().await.unwrap();
}

/// JSON Lines 저장소를 설정으로 선택하여 끝까지 기록
#[tokio::test]
async fn test_configured_jsonl_store_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.jsonl");
    let audit_config = AuditConfig {
        store: "jsonl".to_owned(),
        path: path.display().to_string(),
        ..AuditConfig::default()
    };

    let store = ConfiguredStore::from_config(&audit_config).unwrap();
    let mut sink = AuditSink::new(SinkConfig::from_core(&audit_config), store);
    let handle = sink.handle();
    sink.start().await.unwrap();

    let kv = AuditedStore::new(MemoryKeyValueStore::new(), handle.clone(), "profiles");
    kv.put("user-1", "{\"name\":\"a\"}".to_owned()).await.unwrap();
    kv.get("user-1").await.unwrap();
    handle.record(RecordKind::Alert, "alert_created", &json!({"id": "a-1"}));

    sink.stop().await.unwrap();

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    let records: Vec<AuditRecord> = content
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let actions: Vec<_> = records.iter().map(|r| r.action.as_str()).collect();
    assert_eq!(actions, vec!["put", "get", "alert_created"]);
    assert_eq!(records[0].kind, RecordKind::StorageAccess);
}
