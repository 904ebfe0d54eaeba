//! 알림 관리자: 생성, 인라인 에스컬레이션, 확인/해결, 스윕, 조회
//!
//! # 동시성
//! 모든 상태는 하나의 뮤텍스 뒤에 있습니다. 임계 구역에서는 맵 갱신만 하고,
//! 감사 레코드 발행과 메트릭 갱신은 락을 놓은 뒤에 수행합니다.
//!
//! # 에스컬레이션
//! `(type, severity)`마다 생성 시각 윈도우를 둡니다. 새 알림이 들어올 때
//! 윈도우에 이미 있던 알림 수가 해당 심각도의 알림 카운터 임계값 이상이면
//! 직전 알림을 원본으로 `type + "_escalated"`, 한 단계 높은 심각도의 알림을
//! 만듭니다. 기본값(medium 3/15분)에서는 네 번째 알림이 세 번째를 에스컬레이션합니다.
//! 에스컬레이션으로 만들어진 알림은 윈도우에 기록하지 않습니다.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;
use watchpost_audit::{AuditHandle, RecordKind};
use watchpost_behavior::CounterWindow;
use watchpost_core::config::{AlertingConfig, ThresholdConfig, ThresholdsConfig};
use watchpost_core::event::SecurityEvent;
use watchpost_core::metrics as m;
use watchpost_core::types::{CounterKind, Finding, Severity};

use crate::alert::{
    Acknowledgement, Alert, AlertData, AlertFilter, AlertMetrics, AlertRequest,
    ESCALATED_SUFFIX, Resolution, Transition, primary_finding,
};
use crate::error::AlertError;

/// 자동 해결 시 기록되는 행위자
pub const SYSTEM_ACTOR: &str = "system";

/// 자동 해결 사유
pub const STALE_ALERT_REASON: &str = "stale_alert";

/// 알림 관리자 설정
#[derive(Debug, Clone)]
pub struct AlertManagerConfig {
    /// low 알림 자동 해결까지의 시간
    pub low_auto_resolve: Duration,
    /// 보존할 최대 알림 수
    pub max_alerts: usize,
    /// 정제 시 문자열 최대 길이
    pub excerpt_max_chars: usize,
    /// 심각도별 에스컬레이션 임계값 (critical 제외)
    pub escalation: BTreeMap<Severity, ThresholdConfig>,
}

impl AlertManagerConfig {
    pub fn from_core(alerting: &AlertingConfig, thresholds: &ThresholdsConfig) -> Self {
        let escalation = Severity::ALL
            .into_iter()
            .filter_map(|severity| {
                CounterKind::for_alert_severity(severity).map(|kind| (severity, thresholds.get(kind)))
            })
            .collect();

        Self {
            low_auto_resolve: Duration::from_secs(alerting.low_auto_resolve_secs),
            max_alerts: alerting.max_alerts,
            excerpt_max_chars: alerting.excerpt_max_chars,
            escalation,
        }
    }
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        Self::from_core(&AlertingConfig::default(), &ThresholdsConfig::default())
    }
}

/// 알림 생성 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertOutcome {
    /// 생성된 알림
    pub alert: Alert,
    /// 인라인 에스컬레이션으로 함께 생성된 알림
    pub escalated: Option<Alert>,
}

impl AlertOutcome {
    /// 생성된 모든 알림의 ID
    pub fn alert_ids(&self) -> Vec<String> {
        std::iter::once(&self.alert)
            .chain(self.escalated.as_ref())
            .map(|a| a.id.clone())
            .collect()
    }
}

/// 스윕 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// 자동 해결된 low 알림 수
    pub auto_resolved: usize,
    /// 보존 한도 초과로 제거된 해결 알림 수
    pub evicted: usize,
}

/// 상태 전이 감사 레코드 본문
#[derive(Debug, Serialize)]
struct TransitionRecord<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    alert_type: &'a str,
    severity: Severity,
    identity: &'a str,
    by: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

impl<'a> TransitionRecord<'a> {
    fn new(alert: &'a Alert, by: &'a str, reason: Option<&'a str>) -> Self {
        Self {
            id: &alert.id,
            alert_type: &alert.alert_type,
            severity: alert.severity,
            identity: &alert.identity,
            by,
            reason,
        }
    }
}

/// 락을 놓은 뒤 발행할 감사 이벤트
enum Emit {
    Created(Alert),
    Escalated { alert: Alert, by: String },
    Acknowledged { alert: Alert, by: String },
    Resolved { alert: Alert, by: String, reason: String },
}

#[derive(Default)]
struct State {
    alerts: HashMap<String, Alert>,
    /// 생성 순서
    order: VecDeque<String>,
    windows: HashMap<(String, Severity), CounterWindow>,
    /// 윈도우 키별 가장 최근 알림 ID
    latest: HashMap<(String, Severity), String>,
    /// 원본 ID -> 에스컬레이션 알림 ID
    escalations: HashMap<String, String>,
    active: usize,
}

impl State {
    fn insert(&mut self, alert: Alert) {
        if !alert.is_resolved() {
            self.active += 1;
        }
        self.order.push_back(alert.id.clone());
        self.alerts.insert(alert.id.clone(), alert);
    }

    fn resolve(&mut self, id: &str, by: &str, reason: &str, now: SystemTime) -> Option<Alert> {
        let alert = self.alerts.get_mut(id)?;
        if alert.is_resolved() {
            return None;
        }
        alert.resolved = Some(Resolution {
            by: by.to_owned(),
            at: now,
            reason: reason.to_owned(),
        });
        self.active = self.active.saturating_sub(1);
        Some(alert.clone())
    }
}

/// 알림 관리자
pub struct AlertManager {
    config: AlertManagerConfig,
    state: Mutex<State>,
    audit: AuditHandle,
}

impl AlertManager {
    pub fn new(config: AlertManagerConfig, audit: AuditHandle) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
            audit,
        }
    }

    pub fn config(&self) -> &AlertManagerConfig {
        &self.config
    }

    /// 이벤트와 탐지 결과로 알림을 만듭니다.
    ///
    /// 타입과 심각도는 가장 높은 심각도의 탐지 결과에서 가져옵니다.
    /// 탐지 결과가 없으면 `None`.
    pub fn create_alert(
        &self,
        event: &SecurityEvent,
        findings: &[Finding],
        risk_score: u8,
    ) -> Option<AlertOutcome> {
        let primary = primary_finding(findings)?;
        let request = AlertRequest {
            alert_type: primary.category.alert_type(),
            severity: primary.severity,
            identity: event.identity().to_owned(),
            data: AlertData::from_event(event, findings, self.config.excerpt_max_chars),
            risk_score: risk_score.min(100),
            created_at: event.timestamp(),
        };
        Some(self.submit(request))
    }

    /// 임의 타입의 알림을 만들고 에스컬레이션을 즉시 평가합니다.
    pub fn submit(&self, request: AlertRequest) -> AlertOutcome {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            alert_type: request.alert_type,
            severity: request.severity,
            created_at: request.created_at,
            identity: request.identity,
            data: request.data,
            risk_score: request.risk_score.min(100),
            acknowledged: None,
            resolved: None,
            escalated_from: None,
        };

        let outcome = {
            let mut state = self.lock();
            let origin = self.record_for_escalation(&mut state, &alert);
            state.insert(alert.clone());
            let escalated = origin.map(|original| {
                let escalated = escalation_of(&original, alert.created_at);
                state
                    .escalations
                    .insert(original.id.clone(), escalated.id.clone());
                state.insert(escalated.clone());
                escalated
            });
            AlertOutcome { alert, escalated }
        };

        metrics::counter!(m::ALERTING_ALERTS_CREATED_TOTAL, m::LABEL_SEVERITY => outcome.alert.severity.as_str())
            .increment(1);
        info!(
            alert_id = %outcome.alert.id,
            alert_type = %outcome.alert.alert_type,
            severity = %outcome.alert.severity,
            identity = %outcome.alert.identity,
            risk_score = outcome.alert.risk_score,
            "alert created"
        );
        let mut emits = vec![Emit::Created(outcome.alert.clone())];
        if let Some(escalated) = &outcome.escalated {
            metrics::counter!(m::ALERTING_ESCALATIONS_TOTAL, m::LABEL_SEVERITY => escalated.severity.as_str())
                .increment(1);
            warn!(
                alert_id = %escalated.id,
                escalated_from = escalated.escalated_from.as_deref().unwrap_or_default(),
                triggered_by = %outcome.alert.id,
                alert_type = %escalated.alert_type,
                severity = %escalated.severity,
                "alert escalated"
            );
            emits.push(Emit::Escalated {
                alert: escalated.clone(),
                by: SYSTEM_ACTOR.to_owned(),
            });
        }
        self.publish(emits);
        self.update_active_gauge();
        outcome
    }

    /// 알림을 확인 처리합니다. 이미 확인된 알림이면 `Unchanged`.
    pub fn acknowledge(
        &self,
        id: &str,
        actor: &str,
        now: SystemTime,
    ) -> Result<Transition, AlertError> {
        let acknowledged = {
            let mut state = self.lock();
            let alert = state
                .alerts
                .get_mut(id)
                .ok_or_else(|| AlertError::NotFound(id.to_owned()))?;
            if alert.is_acknowledged() {
                return Ok(Transition::Unchanged);
            }
            alert.acknowledged = Some(Acknowledgement {
                by: actor.to_owned(),
                at: now,
            });
            alert.clone()
        };

        metrics::counter!(m::ALERTING_TRANSITIONS_TOTAL, m::LABEL_ACTION => "acknowledged")
            .increment(1);
        info!(alert_id = id, actor, "alert acknowledged");
        self.publish(vec![Emit::Acknowledged {
            alert: acknowledged,
            by: actor.to_owned(),
        }]);
        Ok(Transition::Applied)
    }

    /// 알림을 해결 처리합니다. 이미 해결된 알림이면 `Unchanged`.
    pub fn resolve(
        &self,
        id: &str,
        actor: &str,
        reason: &str,
        now: SystemTime,
    ) -> Result<Transition, AlertError> {
        let resolved = {
            let mut state = self.lock();
            if !state.alerts.contains_key(id) {
                return Err(AlertError::NotFound(id.to_owned()));
            }
            match state.resolve(id, actor, reason, now) {
                Some(alert) => alert,
                None => return Ok(Transition::Unchanged),
            }
        };

        metrics::counter!(m::ALERTING_TRANSITIONS_TOTAL, m::LABEL_ACTION => "resolved").increment(1);
        info!(alert_id = id, actor, reason, "alert resolved");
        self.publish(vec![Emit::Resolved {
            alert: resolved,
            by: actor.to_owned(),
            reason: reason.to_owned(),
        }]);
        self.update_active_gauge();
        Ok(Transition::Applied)
    }

    /// 운영자 에스컬레이션: 한 단계 높은 새 알림을 만듭니다.
    ///
    /// 해결된 알림과 이미 에스컬레이션된 알림은 거부합니다.
    pub fn escalate_alert(
        &self,
        id: &str,
        actor: &str,
        now: SystemTime,
    ) -> Result<Alert, AlertError> {
        let escalated = {
            let mut state = self.lock();
            let original = state
                .alerts
                .get(id)
                .ok_or_else(|| AlertError::NotFound(id.to_owned()))?;
            if original.is_resolved() {
                return Err(AlertError::AlreadyResolved(id.to_owned()));
            }
            if let Some(existing) = state.escalations.get(id) {
                return Err(AlertError::AlreadyEscalated {
                    id: id.to_owned(),
                    escalated_id: existing.clone(),
                });
            }
            let escalated = escalation_of(original, now);
            state.escalations.insert(id.to_owned(), escalated.id.clone());
            state.insert(escalated.clone());
            escalated
        };

        metrics::counter!(m::ALERTING_ESCALATIONS_TOTAL, m::LABEL_SEVERITY => escalated.severity.as_str())
            .increment(1);
        warn!(
            alert_id = %escalated.id,
            escalated_from = id,
            actor,
            severity = %escalated.severity,
            "alert escalated by operator"
        );
        self.publish(vec![Emit::Escalated {
            alert: escalated.clone(),
            by: actor.to_owned(),
        }]);
        self.update_active_gauge();
        Ok(escalated)
    }

    /// 오래된 low 알림을 자동 해결하고 보존 한도를 넘는 해결 알림을 제거합니다.
    pub fn sweep(&self, now: SystemTime) -> SweepStats {
        let (resolved, evicted) = {
            let mut state = self.lock();

            let stale: Vec<String> = state
                .order
                .iter()
                .filter(|id| {
                    state.alerts.get(*id).is_some_and(|alert| {
                        alert.severity == Severity::Low
                            && !alert.is_resolved()
                            && now
                                .duration_since(alert.created_at)
                                .is_ok_and(|age| age >= self.config.low_auto_resolve)
                    })
                })
                .cloned()
                .collect();
            let resolved: Vec<Alert> = stale
                .iter()
                .filter_map(|id| state.resolve(id, SYSTEM_ACTOR, STALE_ALERT_REASON, now))
                .collect();

            let evicted = self.enforce_retention(&mut state);
            let State {
                windows, latest, ..
            } = &mut *state;
            windows.retain(|_, window| !window.is_empty_at(now));
            latest.retain(|key, _| windows.contains_key(key));
            (resolved, evicted)
        };

        let stats = SweepStats {
            auto_resolved: resolved.len(),
            evicted,
        };
        if stats.auto_resolved > 0 {
            metrics::counter!(m::ALERTING_AUTO_RESOLVED_TOTAL).increment(stats.auto_resolved as u64);
        }
        self.publish(
            resolved
                .into_iter()
                .map(|alert| Emit::Resolved {
                    alert,
                    by: SYSTEM_ACTOR.to_owned(),
                    reason: STALE_ALERT_REASON.to_owned(),
                })
                .collect(),
        );
        self.update_active_gauge();
        debug!(
            auto_resolved = stats.auto_resolved,
            evicted = stats.evicted,
            "alert sweep completed"
        );
        stats
    }

    /// 필터에 맞는 알림 (생성 순서)
    pub fn list_alerts(&self, filter: &AlertFilter) -> Vec<Alert> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.alerts.get(id))
            .filter(|alert| filter.matches(alert))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.lock().alerts.get(id).cloned()
    }

    /// 알림의 에스컬레이션 알림 ID
    pub fn escalation_of(&self, id: &str) -> Option<String> {
        self.lock().escalations.get(id).cloned()
    }

    pub fn metrics(&self) -> AlertMetrics {
        let state = self.lock();
        let mut by_severity = BTreeMap::new();
        for alert in state.alerts.values() {
            *by_severity.entry(alert.severity).or_insert(0) += 1;
        }
        AlertMetrics {
            total_alerts: state.alerts.len(),
            by_severity,
            active_count: state.active,
        }
    }

    /// 새 알림을 윈도우에 기록하고, 에스컬레이션할 원본 알림을 반환합니다.
    ///
    /// 윈도우에 이미 `limit`개 이상 있었으면 직전 알림이 원본입니다.
    /// 직전 알림이 해결됐거나 이미 에스컬레이션됐으면 건너뜁니다.
    fn record_for_escalation(&self, state: &mut State, alert: &Alert) -> Option<Alert> {
        let threshold = self.config.escalation.get(&alert.severity).copied()?;
        let key = (alert.alert_type.clone(), alert.severity);

        let window = state
            .windows
            .entry(key.clone())
            .or_insert_with(|| CounterWindow::new(threshold.window()));
        let prior = window.count(alert.created_at);
        window.record(alert.created_at);
        let previous = state.latest.insert(key, alert.id.clone())?;

        if prior < threshold.limit as usize || state.escalations.contains_key(&previous) {
            return None;
        }
        state
            .alerts
            .get(&previous)
            .filter(|original| !original.is_resolved())
            .cloned()
    }

    /// 가장 오래된 해결 알림부터 제거하여 한도를 맞춥니다.
    fn enforce_retention(&self, state: &mut State) -> usize {
        let excess = state.alerts.len().saturating_sub(self.config.max_alerts);
        if excess == 0 {
            return 0;
        }

        let victims: Vec<String> = state
            .order
            .iter()
            .filter(|id| state.alerts.get(*id).is_some_and(Alert::is_resolved))
            .take(excess)
            .cloned()
            .collect();
        for id in &victims {
            state.alerts.remove(id);
            state.escalations.remove(id);
        }
        state.order.retain(|id| state.alerts.contains_key(id));

        if victims.len() < excess {
            warn!(
                retained = state.alerts.len(),
                max_alerts = self.config.max_alerts,
                "alert retention bound exceeded by unresolved alerts"
            );
        }
        victims.len()
    }

    fn publish(&self, emits: Vec<Emit>) {
        for emit in emits {
            match emit {
                Emit::Created(alert) => {
                    self.audit.record(RecordKind::Alert, "alert_created", &alert);
                }
                Emit::Escalated { alert, by } => {
                    self.audit.record(
                        RecordKind::Alert,
                        "alert_escalated",
                        &EscalationRecord { by: &by, alert: &alert },
                    );
                }
                Emit::Acknowledged { alert, by } => {
                    self.audit.record(
                        RecordKind::Alert,
                        "alert_acknowledged",
                        &TransitionRecord::new(&alert, &by, None),
                    );
                }
                Emit::Resolved { alert, by, reason } => {
                    self.audit.record(
                        RecordKind::Alert,
                        "alert_resolved",
                        &TransitionRecord::new(&alert, &by, Some(&reason)),
                    );
                }
            }
        }
    }

    fn update_active_gauge(&self) {
        let active = self.lock().active;
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::ALERTING_ACTIVE_ALERTS).set(active as f64);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 에스컬레이션 감사 레코드 본문
#[derive(Debug, Serialize)]
struct EscalationRecord<'a> {
    by: &'a str,
    #[serde(flatten)]
    alert: &'a Alert,
}

/// 한 단계 높은 에스컬레이션 알림을 만듭니다.
fn escalation_of(original: &Alert, created_at: SystemTime) -> Alert {
    Alert {
        id: Uuid::new_v4().to_string(),
        alert_type: format!("{}{ESCALATED_SUFFIX}", original.alert_type),
        severity: original.severity.next_level(),
        created_at,
        identity: original.identity.clone(),
        data: original.data.clone(),
        risk_score: original.risk_score,
        acknowledged: None,
        resolved: None,
        escalated_from: Some(original.id.clone()),
    }
}
