//! 알림 타입: 알림, 생성 요청, 조회 필터, 집계
//!
//! # 상태 전이
//! ```text
//! created --acknowledge--> acknowledged --resolve--> resolved
//!    |                                                  ^
//!    +--------------------- resolve --------------------+
//!
//! escalate: 원본은 그대로 두고 한 단계 높은 새 알림을 만들어 원본 ID를 참조
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use watchpost_core::event::{SecurityEvent, rfc3339};
use watchpost_core::types::{Finding, Severity};

use crate::sanitize::sanitize;

/// 에스컬레이션된 알림 타입에 붙는 접미어
pub const ESCALATED_SUFFIX: &str = "_escalated";

/// 알림에 첨부되는 탐지 결과 요약
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingSummary {
    pub category: String,
    pub severity: Severity,
    pub rule: String,
    pub description: String,
}

/// 정제된 알림 데이터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertData {
    /// 원본 이벤트 ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// 원본 이벤트 종류
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_kind: Option<String>,
    /// 한 줄 요약
    pub summary: String,
    /// 탐지 결과 목록
    #[serde(default)]
    pub findings: Vec<FindingSummary>,
    /// 페이로드 발췌
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// 이벤트 컨텍스트
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

impl AlertData {
    /// 요약만 있는 데이터 (런타임 생산자용)
    pub fn summary(summary: &str, max_chars: usize) -> Self {
        Self {
            summary: sanitize(summary, max_chars),
            ..Self::default()
        }
    }

    /// 이벤트와 탐지 결과에서 정제된 데이터를 만듭니다.
    pub fn from_event(event: &SecurityEvent, findings: &[Finding], max_chars: usize) -> Self {
        let summary = primary_finding(findings)
            .map(|f| format!("{}: {}", f.category, f.description))
            .unwrap_or_default();
        let excerpt = (!event.payload().is_empty())
            .then(|| sanitize(&event.payload().excerpt(), max_chars));

        Self {
            event_id: Some(event.id().to_owned()),
            event_kind: Some(event.kind().as_str().to_owned()),
            summary: sanitize(&summary, max_chars),
            findings: findings
                .iter()
                .map(|f| FindingSummary {
                    category: f.category.as_str().to_owned(),
                    severity: f.severity,
                    rule: sanitize(&f.matched_rule, max_chars),
                    description: sanitize(&f.description, max_chars),
                })
                .collect(),
            excerpt,
            context: event
                .context()
                .iter()
                .map(|(k, v)| (sanitize(k, max_chars), sanitize(v, max_chars)))
                .collect(),
        }
    }
}

/// 가장 높은 심각도의 탐지 결과 (동률이면 먼저 나온 것)
pub fn primary_finding(findings: &[Finding]) -> Option<&Finding> {
    findings
        .iter()
        .enumerate()
        .max_by_key(|(index, f)| (f.severity, std::cmp::Reverse(*index)))
        .map(|(_, f)| f)
}

/// 확인 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub by: String,
    #[serde(with = "rfc3339")]
    pub at: SystemTime,
}

/// 해결 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub by: String,
    #[serde(with = "rfc3339")]
    pub at: SystemTime,
    pub reason: String,
}

/// 알림
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: Severity,
    #[serde(with = "rfc3339")]
    pub created_at: SystemTime,
    pub identity: String,
    pub data: AlertData,
    /// 0..=100
    pub risk_score: u8,
    pub acknowledged: Option<Acknowledgement>,
    pub resolved: Option<Resolution>,
    /// 이 알림을 만든 원본 알림 ID (참조만)
    pub escalated_from: Option<String>,
}

impl Alert {
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    pub fn is_escalation(&self) -> bool {
        self.escalated_from.is_some()
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} identity={} score={} id={}",
            self.severity, self.alert_type, self.identity, self.risk_score, self.id
        )
    }
}

/// 알림 생성 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertRequest {
    pub alert_type: String,
    pub severity: Severity,
    pub identity: String,
    pub data: AlertData,
    pub risk_score: u8,
    pub created_at: SystemTime,
}

impl AlertRequest {
    /// 런타임 생산자가 임의 타입의 알림을 만들 때 사용합니다.
    pub fn new(
        alert_type: impl Into<String>,
        severity: Severity,
        identity: impl Into<String>,
        data: AlertData,
    ) -> Self {
        Self {
            alert_type: alert_type.into(),
            severity,
            identity: identity.into(),
            data,
            risk_score: 0,
            created_at: SystemTime::now(),
        }
    }

    pub fn with_risk_score(mut self, risk_score: u8) -> Self {
        self.risk_score = risk_score.min(100);
        self
    }

    pub fn with_created_at(mut self, created_at: SystemTime) -> Self {
        self.created_at = created_at;
        self
    }
}

/// 알림 조회 필터. 지정하지 않은 조건은 모두 통과합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertFilter {
    pub resolved: Option<bool>,
    pub severity: Option<Severity>,
    pub identity: Option<String>,
}

impl AlertFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolved(mut self, resolved: bool) -> Self {
        self.resolved = Some(resolved);
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.resolved.is_none_or(|r| alert.is_resolved() == r)
            && self.severity.is_none_or(|s| alert.severity == s)
            && self
                .identity
                .as_deref()
                .is_none_or(|id| alert.identity == id)
    }
}

/// 알림 집계
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertMetrics {
    pub total_alerts: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub active_count: usize,
}

/// 확인/해결 호출 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 상태가 바뀜
    Applied,
    /// 이미 해당 상태여서 아무것도 하지 않음
    Unchanged,
}
