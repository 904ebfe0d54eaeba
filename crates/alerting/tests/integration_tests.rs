//! 통합 테스트 -- 알림 생명주기와 감사 기록 검증

use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use watchpost_alerting::{
    AlertData, AlertFilter, AlertManager, AlertManagerConfig, AlertRequest, Transition,
};
use watchpost_audit::{AuditSink, MemoryAuditStore, RecordKind, SinkConfig};
use watchpost_core::config::{AlertingConfig, ThresholdsConfig};
use watchpost_core::pipeline::Pipeline;
use watchpost_core::types::Severity;

fn t0() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_700_000_000)
}

/// 생성 -> 에스컬레이션 -> 확인 -> 해결이 모두 저장소까지 기록된다
#[tokio::test]
async fn test_lifecycle_is_fully_audited() {
    let store = MemoryAuditStore::new();
    let mut sink = AuditSink::new(SinkConfig::default(), store.clone());
    let manager = AlertManager::new(AlertManagerConfig::default(), sink.handle());
    sink.start().await.unwrap();

    let mut outcomes = Vec::new();
    for i in 0..4 {
        outcomes.push(manager.submit(
            AlertRequest::new(
                "high_error_rate",
                Severity::Medium,
                "svc-payments",
                AlertData::summary("error ratio above threshold", 256),
            )
            .with_created_at(t0() + Duration::from_secs(i * 30)),
        ));
    }
    assert!(outcomes[..3].iter().all(|o| o.escalated.is_none()));
    let third = &outcomes[2].alert;
    let outcome = &outcomes[3];
    let escalated = outcome.escalated.clone().unwrap();
    assert_eq!(outcome.alert_ids(), vec![outcome.alert.id.clone(), escalated.id.clone()]);

    assert_eq!(
        manager.acknowledge(&escalated.id, "oncall", t0()).unwrap(),
        Transition::Applied
    );
    assert_eq!(
        manager
            .resolve(&escalated.id, "oncall", "rolled back", t0())
            .unwrap(),
        Transition::Applied
    );
    sink.stop().await.unwrap();

    let records = store.records();
    assert!(records.iter().all(|r| r.kind == RecordKind::Alert));
    let actions: Vec<_> = records.iter().map(|r| r.action.as_str()).collect();
    assert_eq!(
        actions,
        vec![
            "alert_created",
            "alert_created",
            "alert_created",
            "alert_created",
            "alert_escalated",
            "alert_acknowledged",
            "alert_resolved",
        ]
    );
    let escalation = &records[4].payload;
    assert_eq!(escalation["type"], "high_error_rate_escalated");
    assert_eq!(escalation["severity"], "high");
    assert_eq!(escalation["escalated_from"], third.id.as_str());
    assert_eq!(escalation["by"], "system");
    assert_eq!(records[6].payload["reason"], "rolled back");
}

/// 여러 스레드에서 동시에 알림을 만들어도 모두 보존되고 에스컬레이션 수가 일관된다
#[test]
fn test_concurrent_submissions() {
    let audit = watchpost_audit::AuditHandle::new(&SinkConfig {
        max_buffered: 10_000,
        ..SinkConfig::default()
    });
    let manager = Arc::new(AlertManager::new(AlertManagerConfig::default(), audit));

    let workers: Vec<_> = (0..8)
        .map(|worker| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for i in 0..25 {
                    manager.submit(
                        AlertRequest::new(
                            "noise",
                            Severity::Low,
                            format!("worker-{worker}"),
                            AlertData::default(),
                        )
                        .with_created_at(t0() + Duration::from_secs(i)),
                    );
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // low 임계값 50: 51번째부터 200번째까지 150건이 각각 직전 알림을 에스컬레이션한다
    let escalated = manager.list_alerts(&AlertFilter::new().severity(Severity::Medium));
    assert_eq!(escalated.len(), 150);
    let mut origins: Vec<_> = escalated
        .iter()
        .filter_map(|a| a.escalated_from.clone())
        .collect();
    origins.sort();
    origins.dedup();
    assert_eq!(origins.len(), 150, "each original is escalated at most once");
    let metrics = manager.metrics();
    assert_eq!(metrics.total_alerts, 350);
    assert_eq!(metrics.active_count, 350);
}

/// 설정의 임계값이 에스컬레이션에 반영된다
#[test]
fn test_thresholds_come_from_config() {
    let mut thresholds = ThresholdsConfig::default();
    thresholds.high_severity_alert.limit = 2;
    let config = AlertManagerConfig::from_core(&AlertingConfig::default(), &thresholds);
    let manager = AlertManager::new(config, watchpost_audit::AuditHandle::new(&SinkConfig::default()));

    let request = || {
        AlertRequest::new("xss", Severity::High, "user-1", AlertData::default())
            .with_created_at(t0())
    };
    assert!(manager.submit(request()).escalated.is_none());
    let second = manager.submit(request());
    assert!(second.escalated.is_none(), "one prior high alert is below the limit of 2");
    let third = manager.submit(request());
    let escalated = third.escalated.unwrap();
    assert_eq!(escalated.severity, Severity::Critical);
    assert_eq!(escalated.escalated_from.as_deref(), Some(second.alert.id.as_str()));
}
