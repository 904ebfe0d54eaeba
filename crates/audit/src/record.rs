//! 감사 레코드: 이벤트/알림/스토리지 접근의 영속 표현
//!
//! [`AuditRecord`]는 플러시에 성공할 때까지 싱크가 소유하며, 성공 후 버려집니다.
//! 재시도 시 같은 레코드가 다시 기록될 수 있으므로 소비자는 `id`로 중복을 걸러야 합니다.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;

/// 레코드 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecordKind {
    /// 평가된 보안 이벤트
    Event,
    /// 알림 생성/에스컬레이션/상태 전이
    Alert,
    /// 감사 대상 스토리지 접근
    StorageAccess,
    /// 싱크 자체의 진단 정보 (버퍼 초과 등). 버퍼가 가득 차면 가장 먼저 버려집니다.
    Diagnostic,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Alert => "alert",
            Self::StorageAccess => "storage-access",
            Self::Diagnostic => "diagnostic",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 감사 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// 레코드 ID (UUID v4)
    pub id: String,
    /// 레코드 종류
    pub kind: RecordKind,
    /// 동작 이름 (`"alert_created"`, `"event_assessed"`, ...)
    pub action: String,
    /// 직렬화된 본문
    pub payload: serde_json::Value,
    /// 큐에 들어간 시각
    pub enqueued_at: DateTime<Utc>,
    /// 실패한 쓰기 시도 횟수
    pub attempts: u32,
}

impl AuditRecord {
    /// 직렬화 가능한 값으로 레코드를 생성합니다.
    pub fn new(
        kind: RecordKind,
        action: impl Into<String>,
        payload: &impl Serialize,
    ) -> Result<Self, AuditError> {
        Ok(Self::from_value(kind, action, serde_json::to_value(payload)?))
    }

    /// 이미 만들어진 JSON 값으로 레코드를 생성합니다.
    pub fn from_value(kind: RecordKind, action: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            action: action.into(),
            payload,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }

    /// 진단 레코드를 생성합니다.
    pub fn diagnostic(action: impl Into<String>, payload: serde_json::Value) -> Self {
        Self::from_value(RecordKind::Diagnostic, action, payload)
    }

    pub fn is_diagnostic(&self) -> bool {
        self.kind == RecordKind::Diagnostic
    }

    /// JSON Lines 한 줄 (개행 미포함)
    pub fn to_json_line(&self) -> Result<String, AuditError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Serialize)]
    struct Sample {
        alert_id: &'static str,
        severity: &'static str,
    }

    #[test]
    fn new_record_serializes_payload() {
        let record = AuditRecord::new(
            RecordKind::Alert,
            "alert_created",
            &Sample {
                alert_id: "a-1",
                severity: "high",
            },
        )
        .unwrap();
        assert_eq!(record.payload, json!({"alert_id": "a-1", "severity": "high"}));
        assert_eq!(record.attempts, 0);
        assert!(!record.is_diagnostic());
    }

    #[test]
    fn records_have_unique_ids() {
        let a = AuditRecord::diagnostic("x", json!({}));
        let b = AuditRecord::diagnostic("x", json!({}));
        assert_ne!(a.id, b.id);
        assert!(a.is_diagnostic());
    }

    #[test]
    fn json_line_uses_rfc3339_and_kebab_kind() {
        let record = AuditRecord::from_value(RecordKind::StorageAccess, "get", json!({"key": "k"}));
        let line = record.to_json_line().unwrap();
        assert!(!line.contains('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["kind"], "storage-access");
        let enqueued = value["enqueued_at"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(enqueued).is_ok());

        let back: AuditRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
    }
}
