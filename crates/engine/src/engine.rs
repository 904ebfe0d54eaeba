//! 보안 엔진: 이벤트 한 건의 평가 흐름
//!
//! ```text
//! SecurityEvent
//!   -> ThreatDetector::detect          (시그니처/에이전트 탐지 결과)
//!   -> BehaviorTracker::record         (카운터 증가, 합성 탐지 결과, 차단)
//!   -> score                           (위험 점수)
//!   -> AlertManager::create_alert      (최소 심각도 이상일 때, 인라인 에스컬레이션)
//!   -> AuditHandle::record             (event_assessed)
//! ```
//!
//! 엔진은 한 번 만들어 `Arc`로 공유합니다. 내부 상태는 추적기(샤드 뮤텍스)와
//! 알림 관리자(단일 뮤텍스)뿐이므로 `assess`는 여러 태스크에서 동시에 호출할 수 있습니다.

use std::time::{Instant, SystemTime};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use watchpost_alerting::{Alert, AlertManager, AlertManagerConfig};
use watchpost_audit::{AuditHandle, RecordKind};
use watchpost_behavior::{BehaviorTracker, CounterState};
use watchpost_core::config::WatchpostConfig;
use watchpost_core::error::WatchpostError;
use watchpost_core::event::{EventKind, SecurityEvent, rfc3339_option};
use watchpost_core::metrics as m;
use watchpost_core::pipeline::Detector;
use watchpost_core::types::{CounterKind, Finding, FindingCategory, Severity};
use watchpost_detection::{DetectorConfig, RiskAssessment, ThreatDetector, score};

/// 실패한 로그인을 나타내는 `outcome` 컨텍스트 값
const FAILED_OUTCOMES: [&str; 3] = ["failure", "failed", "denied"];

/// 이벤트 평가 결과
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub event_id: String,
    pub identity: String,
    /// 탐지기 결과와 행위 추적기가 합성한 결과
    pub findings: Vec<Finding>,
    pub risk: RiskAssessment,
    /// 생성된 알림 (에스컬레이션 포함, 생성 순서)
    pub alerts: Vec<Alert>,
    /// 식별자가 차단 중이면 만료 시각
    pub blocked_until: Option<SystemTime>,
}

impl Assessment {
    pub fn is_blocked(&self) -> bool {
        self.blocked_until.is_some()
    }

    pub fn alert_ids(&self) -> Vec<String> {
        self.alerts.iter().map(|a| a.id.clone()).collect()
    }

    /// 수집 리스너와 CLI가 내보내는 요약
    pub fn verdict(&self) -> Verdict {
        Verdict {
            event_id: self.event_id.clone(),
            risk_score: self.risk.score,
            severity: self.risk.severity,
            findings: self.findings.clone(),
            alert_ids: self.alert_ids(),
            blocked_until: self.blocked_until,
        }
    }
}

/// 평가 결과 요약 (와이어 형식)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub event_id: String,
    pub risk_score: u8,
    pub severity: Option<Severity>,
    pub findings: Vec<Finding>,
    pub alert_ids: Vec<String>,
    #[serde(default, with = "rfc3339_option")]
    pub blocked_until: Option<SystemTime>,
}

/// `event_assessed` 감사 레코드 본문
#[derive(Serialize)]
struct AssessedRecord<'a> {
    event: &'a SecurityEvent,
    risk_score: u8,
    severity: Option<Severity>,
    rules: Vec<&'a str>,
    alert_ids: Vec<String>,
    #[serde(with = "rfc3339_option")]
    blocked_until: Option<SystemTime>,
}

/// 실시간 보안 이벤트 탐지/알림 엔진
pub struct SecurityEngine {
    detector: ThreatDetector,
    tracker: BehaviorTracker,
    alerts: AlertManager,
    audit: AuditHandle,
    min_alert_severity: Severity,
}

impl SecurityEngine {
    /// 설정으로 엔진을 만듭니다.
    ///
    /// 시그니처 규칙 컴파일에 실패하면 에러를 반환합니다.
    pub fn new(config: &WatchpostConfig, audit: AuditHandle) -> Result<Self, WatchpostError> {
        let detector = ThreatDetector::new(DetectorConfig::from_core(&config.detection))?;
        let tracker = BehaviorTracker::new(&config.behavior);
        let alerts = AlertManager::new(
            AlertManagerConfig::from_core(&config.alerting, &config.behavior.thresholds),
            audit.clone(),
        );

        info!(
            rules = detector.rules().count(),
            detectors = ?detector.detector_names(),
            min_alert_severity = %config.detection.min_alert_severity(),
            "security engine initialized"
        );

        Ok(Self {
            detector,
            tracker,
            alerts,
            audit,
            min_alert_severity: config.detection.min_alert_severity(),
        })
    }

    /// 사용자 정의 탐지기를 추가합니다.
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detector = self.detector.with_detector(detector);
        self
    }

    /// 이벤트 한 건을 평가합니다.
    ///
    /// 탐지 실패는 탐지 결과 없음으로, 감사 기록 실패는 싱크의 재시도로 처리되므로
    /// 호출자에게 에러를 반환하지 않습니다.
    pub fn assess(&self, event: &SecurityEvent) -> Assessment {
        let started = Instant::now();
        let mut findings = self.detector.detect(event);

        let mut blocked_until = None;
        for kind in counters_for(event, &findings) {
            match self.tracker.record(event.identity(), kind, event.timestamp()) {
                CounterState::Blocked { until } => {
                    blocked_until = Some(until);
                    break;
                }
                CounterState::Counted {
                    finding,
                    blocked_until: newly_blocked,
                    ..
                } => {
                    findings.extend(finding);
                    if newly_blocked.is_some() {
                        blocked_until = newly_blocked;
                        break;
                    }
                }
            }
        }
        if blocked_until.is_none() {
            blocked_until = self
                .tracker
                .blocked_until(event.identity(), event.timestamp());
        }

        let risk = score(&findings);
        let alertable: Vec<Finding> = findings
            .iter()
            .filter(|f| f.severity >= self.min_alert_severity)
            .cloned()
            .collect();
        let alerts = self
            .alerts
            .create_alert(event, &alertable, risk.score)
            .map(|outcome| {
                std::iter::once(outcome.alert)
                    .chain(outcome.escalated)
                    .collect()
            })
            .unwrap_or_default();

        let assessment = Assessment {
            event_id: event.id().to_owned(),
            identity: event.identity().to_owned(),
            findings,
            risk,
            alerts,
            blocked_until,
        };

        self.audit.record(
            RecordKind::Event,
            "event_assessed",
            &AssessedRecord {
                event,
                risk_score: assessment.risk.score,
                severity: assessment.risk.severity,
                rules: assessment
                    .findings
                    .iter()
                    .map(|f| f.matched_rule.as_str())
                    .collect(),
                alert_ids: assessment.alert_ids(),
                blocked_until: assessment.blocked_until,
            },
        );

        metrics::counter!(m::ENGINE_EVENTS_ASSESSED_TOTAL).increment(1);
        metrics::histogram!(m::ENGINE_ASSESS_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!(
            event_id = %assessment.event_id,
            kind = %event.kind(),
            identity = %assessment.identity,
            findings = assessment.findings.len(),
            risk_score = assessment.risk.score,
            alerts = assessment.alerts.len(),
            blocked = assessment.is_blocked(),
            "event assessed"
        );
        assessment
    }

    pub fn detector(&self) -> &ThreatDetector {
        &self.detector
    }

    pub fn tracker(&self) -> &BehaviorTracker {
        &self.tracker
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn audit(&self) -> &AuditHandle {
        &self.audit
    }

    pub fn min_alert_severity(&self) -> Severity {
        self.min_alert_severity
    }
}

/// 이벤트가 증가시키는 행위 카운터 (기록 순서)
///
/// 실패한 로그인은 `login-failure`를 먼저 기록하여, 차단이 걸리면
/// 같은 이벤트의 `auth-request`는 기록되지 않습니다.
pub fn counters_for(event: &SecurityEvent, findings: &[Finding]) -> Vec<CounterKind> {
    match event.kind() {
        EventKind::AuthAttempt => {
            let failed = event
                .context_value("outcome")
                .is_some_and(|outcome| {
                    FAILED_OUTCOMES
                        .iter()
                        .any(|f| outcome.eq_ignore_ascii_case(f))
                });
            if failed {
                vec![CounterKind::LoginFailure, CounterKind::AuthRequest]
            } else {
                vec![CounterKind::AuthRequest]
            }
        }
        EventKind::NetworkRequest => vec![CounterKind::ApiRequest],
        EventKind::InputSubmission if findings.iter().any(is_attack) => {
            vec![CounterKind::InputRejection]
        }
        EventKind::InputSubmission | EventKind::StorageAccess | EventKind::RuntimeError => {
            Vec::new()
        }
    }
}

/// 입력 거부로 간주되는 공격 시그니처 탐지 결과
fn is_attack(finding: &Finding) -> bool {
    matches!(
        finding.category,
        FindingCategory::Xss
            | FindingCategory::SqlInjection
            | FindingCategory::PathTraversal
            | FindingCategory::CommandInjection
    )
}
