//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `watchpost_`
//! - 모듈명: `detection_`, `behavior_`, `alerting_`, `audit_`, `engine_`, `ingest_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(watchpost_core::metrics::AUDIT_RECORDS_FLUSHED_TOTAL).increment(50);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (low, medium, high, critical)
pub const LABEL_SEVERITY: &str = "severity";

/// 탐지 카테고리 레이블 키 (xss, sql-injection, ...)
pub const LABEL_CATEGORY: &str = "category";

/// 카운터 종류 레이블 키 (login-failure, api-request, ...)
pub const LABEL_COUNTER: &str = "counter";

/// 알림 액션 레이블 키 (acknowledged, resolved)
pub const LABEL_ACTION: &str = "action";

// ─── Detection 메트릭 ───────────────────────────────────────────────

/// Detection: 검사한 이벤트 수 (counter)
pub const DETECTION_EVENTS_SCANNED_TOTAL: &str = "watchpost_detection_events_scanned_total";

/// Detection: 생성된 탐지 결과 수 (counter, label: category)
pub const DETECTION_FINDINGS_TOTAL: &str = "watchpost_detection_findings_total";

/// Detection: 크기/깊이 제한으로 일부만 검사한 이벤트 수 (counter)
pub const DETECTION_PAYLOADS_TRUNCATED_TOTAL: &str =
    "watchpost_detection_payloads_truncated_total";

// ─── Behavior 메트릭 ────────────────────────────────────────────────

/// Behavior: 임계값 초과 횟수 (counter, label: counter)
pub const BEHAVIOR_THRESHOLD_EXCEEDED_TOTAL: &str =
    "watchpost_behavior_threshold_exceeded_total";

/// Behavior: 차단된 식별자 수 (counter)
pub const BEHAVIOR_IDENTITIES_BLOCKED_TOTAL: &str =
    "watchpost_behavior_identities_blocked_total";

/// Behavior: 차단으로 단락된 기록 요청 수 (counter)
pub const BEHAVIOR_BLOCKED_RECORDS_TOTAL: &str = "watchpost_behavior_blocked_records_total";

/// Behavior: 추적 중인 카운터 윈도우 수 (gauge)
pub const BEHAVIOR_TRACKED_WINDOWS: &str = "watchpost_behavior_tracked_windows";

// ─── Alerting 메트릭 ────────────────────────────────────────────────

/// Alerting: 생성된 알림 수 (counter, label: severity)
pub const ALERTING_ALERTS_CREATED_TOTAL: &str = "watchpost_alerting_alerts_created_total";

/// Alerting: 에스컬레이션 수 (counter)
pub const ALERTING_ESCALATIONS_TOTAL: &str = "watchpost_alerting_escalations_total";

/// Alerting: 운영자 상태 전이 수 (counter, label: action)
pub const ALERTING_TRANSITIONS_TOTAL: &str = "watchpost_alerting_transitions_total";

/// Alerting: 자동 해결된 알림 수 (counter)
pub const ALERTING_AUTO_RESOLVED_TOTAL: &str = "watchpost_alerting_auto_resolved_total";

/// Alerting: 미해결 알림 수 (gauge)
pub const ALERTING_ACTIVE_ALERTS: &str = "watchpost_alerting_active_alerts";

// ─── Audit 메트릭 ───────────────────────────────────────────────────

/// Audit: 큐에 들어온 레코드 수 (counter)
pub const AUDIT_RECORDS_ENQUEUED_TOTAL: &str = "watchpost_audit_records_enqueued_total";

/// Audit: 버퍼 초과로 버려진 레코드 수 (counter)
pub const AUDIT_RECORDS_DROPPED_TOTAL: &str = "watchpost_audit_records_dropped_total";

/// Audit: 저장소에 기록된 레코드 수 (counter)
pub const AUDIT_RECORDS_FLUSHED_TOTAL: &str = "watchpost_audit_records_flushed_total";

/// Audit: 실패한 배치 쓰기 수 (counter)
pub const AUDIT_FLUSH_FAILURES_TOTAL: &str = "watchpost_audit_flush_failures_total";

/// Audit: 버퍼 내 레코드 수 (gauge)
pub const AUDIT_BUFFER_SIZE: &str = "watchpost_audit_buffer_size";

/// Audit: 배치 쓰기 소요 시간 (histogram, 초)
pub const AUDIT_FLUSH_DURATION_SECONDS: &str = "watchpost_audit_flush_duration_seconds";

// ─── Engine 메트릭 ──────────────────────────────────────────────────

/// Engine: 평가한 이벤트 수 (counter)
pub const ENGINE_EVENTS_ASSESSED_TOTAL: &str = "watchpost_engine_events_assessed_total";

/// Engine: 이벤트 평가 소요 시간 (histogram, 초)
pub const ENGINE_ASSESS_DURATION_SECONDS: &str = "watchpost_engine_assess_duration_seconds";

// ─── Ingest 메트릭 ──────────────────────────────────────────────────

/// Ingest: 수락한 연결 수 (counter)
pub const INGEST_CONNECTIONS_TOTAL: &str = "watchpost_ingest_connections_total";

/// Ingest: 파싱에 실패한 줄 수 (counter)
pub const INGEST_REJECTED_LINES_TOTAL: &str = "watchpost_ingest_rejected_lines_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "watchpost_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "watchpost_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출합니다 (`watchpost-daemon` 시작 시점).
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Detection
    describe_counter!(
        DETECTION_EVENTS_SCANNED_TOTAL,
        "Total number of events scanned by the threat detector"
    );
    describe_counter!(
        DETECTION_FINDINGS_TOTAL,
        "Total number of findings produced, by category"
    );
    describe_counter!(
        DETECTION_PAYLOADS_TRUNCATED_TOTAL,
        "Events whose payload exceeded the scan size or depth limit"
    );

    // Behavior
    describe_counter!(
        BEHAVIOR_THRESHOLD_EXCEEDED_TOTAL,
        "Sliding-window threshold breaches, by counter kind"
    );
    describe_counter!(
        BEHAVIOR_IDENTITIES_BLOCKED_TOTAL,
        "Identities blocked after a brute-force threshold breach"
    );
    describe_counter!(
        BEHAVIOR_BLOCKED_RECORDS_TOTAL,
        "Counter records short-circuited because the identity is blocked"
    );
    describe_gauge!(
        BEHAVIOR_TRACKED_WINDOWS,
        "Number of live per-identity counter windows"
    );

    // Alerting
    describe_counter!(
        ALERTING_ALERTS_CREATED_TOTAL,
        "Total number of alerts created, by severity"
    );
    describe_counter!(
        ALERTING_ESCALATIONS_TOTAL,
        "Total number of escalated alerts created"
    );
    describe_counter!(
        ALERTING_TRANSITIONS_TOTAL,
        "Acknowledge/resolve transitions applied, by action"
    );
    describe_counter!(
        ALERTING_AUTO_RESOLVED_TOTAL,
        "Alerts resolved automatically by the expiry sweep"
    );
    describe_gauge!(ALERTING_ACTIVE_ALERTS, "Number of unresolved alerts");

    // Audit
    describe_counter!(
        AUDIT_RECORDS_ENQUEUED_TOTAL,
        "Total number of audit records enqueued"
    );
    describe_counter!(
        AUDIT_RECORDS_DROPPED_TOTAL,
        "Audit records dropped due to buffer overflow"
    );
    describe_counter!(
        AUDIT_RECORDS_FLUSHED_TOTAL,
        "Audit records written to the durable store"
    );
    describe_counter!(
        AUDIT_FLUSH_FAILURES_TOTAL,
        "Failed or timed-out audit batch writes"
    );
    describe_gauge!(AUDIT_BUFFER_SIZE, "Audit records waiting in memory");
    describe_histogram!(
        AUDIT_FLUSH_DURATION_SECONDS,
        "Time to write one audit batch in seconds"
    );

    // Engine
    describe_counter!(
        ENGINE_EVENTS_ASSESSED_TOTAL,
        "Total number of events assessed by the engine"
    );
    describe_histogram!(
        ENGINE_ASSESS_DURATION_SECONDS,
        "Time to assess a single event in seconds"
    );

    // Ingest
    describe_counter!(
        INGEST_CONNECTIONS_TOTAL,
        "Connections accepted by the event ingest listener"
    );
    describe_counter!(
        INGEST_REJECTED_LINES_TOTAL,
        "Ingest lines rejected as malformed"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, labels carry version)"
    );
}
