//! 이벤트: 엔진에 제출되는 평가 단위
//!
//! [`SecurityEvent`]는 호출자(폼 핸들러, API 미들웨어, 스토리지 래퍼)가 생성하여
//! 엔진에 한 번 제출하는 불변 값입니다. 생성 후에는 읽기 접근자만 제공합니다.
//!
//! JSON 표현은 데몬의 수집 리스너와 CLI의 `replay` 명령이 그대로 사용합니다:
//!
//! ```json
//! {"kind":"auth-attempt","identity":"user-42","payload":"login",
//!  "timestamp":"2026-01-01T00:00:00.000Z","context":{"outcome":"failure"}}
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// 사용자 입력 제출 (폼 필드 등)
    InputSubmission,
    /// 인증 시도
    AuthAttempt,
    /// 네트워크/API 요청
    NetworkRequest,
    /// 스토리지 접근
    StorageAccess,
    /// 런타임 에러
    RuntimeError,
}

impl EventKind {
    /// kebab-case 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputSubmission => "input-submission",
            Self::AuthAttempt => "auth-attempt",
            Self::NetworkRequest => "network-request",
            Self::StorageAccess => "storage-access",
            Self::RuntimeError => "runtime-error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 이벤트 페이로드: 자유 형식 문자열 또는 구조화된 맵
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Structured(serde_json::Map<String, serde_json::Value>),
}

impl Default for Payload {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// 페이로드 안의 문자열 조각과 그 경로
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment<'a> {
    /// 필드 경로 (`"profile.bio"`, `"tags[1]"`); 문자열 페이로드는 빈 문자열
    pub path: String,
    /// 문자열 값
    pub text: &'a str,
}

/// [`Payload::text_fragments`]의 결과
#[derive(Debug, Clone, Default)]
pub struct Fragments<'a> {
    /// 수집된 조각 (문서 순서)
    pub fragments: Vec<TextFragment<'a>>,
    /// 깊이 제한으로 일부 하위 트리를 건너뛰었는지 여부
    pub truncated: bool,
}

impl Payload {
    /// 모든 문자열 리프를 경로와 함께 수집합니다.
    ///
    /// `max_depth`보다 깊은 하위 트리는 건너뛰고 `truncated`를 표시합니다.
    /// 숫자와 불리언은 검사 대상이 아니므로 제외됩니다.
    pub fn text_fragments(&self, max_depth: usize) -> Fragments<'_> {
        let mut out = Fragments::default();
        match self {
            Self::Text(text) => out.fragments.push(TextFragment {
                path: String::new(),
                text,
            }),
            Self::Structured(map) => {
                for (key, value) in map {
                    collect_value(value, key.clone(), 1, max_depth, &mut out);
                }
            }
        }
        out
    }

    /// 사람이 읽을 수 있는 한 줄 표현
    pub fn excerpt(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Structured(map) => {
                serde_json::to_string(map).unwrap_or_else(|_| String::from("{}"))
            }
        }
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.is_empty(),
            Self::Structured(map) => map.is_empty(),
        }
    }
}

fn collect_value<'a>(
    value: &'a serde_json::Value,
    path: String,
    depth: usize,
    max_depth: usize,
    out: &mut Fragments<'a>,
) {
    use serde_json::Value;

    if depth > max_depth {
        out.truncated = true;
        return;
    }
    match value {
        Value::String(text) => out.fragments.push(TextFragment { path, text }),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_value(item, format!("{path}[{index}]"), depth + 1, max_depth, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_value(item, format!("{path}.{key}"), depth + 1, max_depth, out);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 보안 이벤트
///
/// 생성 후 불변이며, 엔진은 `&SecurityEvent`로만 다룹니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    #[serde(default = "new_event_id")]
    id: String,
    kind: EventKind,
    identity: String,
    #[serde(default)]
    payload: Payload,
    #[serde(default = "SystemTime::now", with = "rfc3339")]
    timestamp: SystemTime,
    #[serde(default)]
    context: BTreeMap<String, String>,
}

impl SecurityEvent {
    /// 현재 시각과 새 UUID로 이벤트를 생성합니다.
    pub fn new(kind: EventKind, identity: impl Into<String>, payload: impl Into<Payload>) -> Self {
        Self {
            id: new_event_id(),
            kind,
            identity: identity.into(),
            payload: payload.into(),
            timestamp: SystemTime::now(),
            context: BTreeMap::new(),
        }
    }

    /// 컨텍스트 태그를 추가합니다.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// 발생 시각을 지정합니다.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// 컨텍스트 값을 조회합니다.
    pub fn context_value(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }
}

impl fmt::Display for SecurityEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} identity={} id={}", self.kind, self.identity, self.id)
    }
}

/// `SystemTime` <-> RFC 3339 문자열 serde 헬퍼
///
/// `#[serde(with = "watchpost_core::event::rfc3339")]`로 사용합니다.
pub mod rfc3339 {
    use std::time::SystemTime;

    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    /// 밀리초 정밀도의 UTC RFC 3339 문자열로 변환합니다.
    pub fn format(time: SystemTime) -> String {
        let dt: DateTime<Utc> = time.into();
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// RFC 3339 문자열을 파싱합니다.
    pub fn parse(raw: &str) -> Result<SystemTime, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc).into())
    }
}

/// `Option<SystemTime>` <-> RFC 3339 serde 헬퍼
pub mod rfc3339_option {
    use std::time::SystemTime;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        time: &Option<SystemTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(t) => serializer.serialize_some(&super::rfc3339::format(*t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<SystemTime>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| super::rfc3339::parse(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn new_event_has_unique_id() {
        let a = SecurityEvent::new(EventKind::InputSubmission, "user-1", "hello");
        let b = SecurityEvent::new(EventKind::InputSubmission, "user-1", "hello");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id().len(), 36);
    }

    #[test]
    fn with_context_and_timestamp() {
        let ts = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let event = SecurityEvent::new(EventKind::AuthAttempt, "user-42", "login")
            .with_context("outcome", "failure")
            .with_timestamp(ts);
        assert_eq!(event.context_value("outcome"), Some("failure"));
        assert_eq!(event.timestamp(), ts);
        assert_eq!(event.kind(), EventKind::AuthAttempt);
    }

    #[test]
    fn text_payload_yields_single_fragment() {
        let payload = Payload::from("<b>hi</b>");
        let fragments = payload.text_fragments(8);
        assert_eq!(fragments.fragments.len(), 1);
        assert_eq!(fragments.fragments[0].path, "");
        assert!(!fragments.truncated);
    }

    #[test]
    fn structured_payload_collects_string_leaves_with_paths() {
        let value = serde_json::json!({
            "name": "alice",
            "age": 30,
            "profile": { "bio": "hi", "tags": ["a", "b"] }
        });
        let serde_json::Value::Object(map) = value else {
            panic!("expected object");
        };
        let payload = Payload::Structured(map);
        let fragments = payload.text_fragments(8);
        let paths: Vec<&str> = fragments
            .fragments
            .iter()
            .map(|f| f.path.as_str())
            .collect();
        assert!(paths.contains(&"name"));
        assert!(paths.contains(&"profile.bio"));
        assert!(paths.contains(&"profile.tags[1]"));
        assert_eq!(fragments.fragments.len(), 4);
    }

    #[test]
    fn deep_payload_is_truncated() {
        let mut value = serde_json::json!("leaf");
        for _ in 0..10 {
            value = serde_json::json!({ "n": value });
        }
        let serde_json::Value::Object(map) = value else {
            panic!("expected object");
        };
        let payload = Payload::Structured(map);
        let fragments = payload.text_fragments(4);
        assert!(fragments.truncated);
        assert!(fragments.fragments.is_empty());
    }

    #[test]
    fn event_json_roundtrip_uses_rfc3339() {
        let ts = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        let event = SecurityEvent::new(EventKind::NetworkRequest, "10.0.0.1", "GET /")
            .with_timestamp(ts);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"timestamp\":\"2023-11-14T22:13:20.123Z\""));
        assert!(json.contains("\"kind\":\"network-request\""));
        let parsed: SecurityEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let event: SecurityEvent =
            serde_json::from_str(r#"{"kind":"auth-attempt","identity":"user-42"}"#).unwrap();
        assert_eq!(event.identity(), "user-42");
        assert!(event.payload().is_empty());
        assert!(!event.id().is_empty());
    }

    #[test]
    fn structured_payload_deserializes_from_object() {
        let event: SecurityEvent = serde_json::from_str(
            r#"{"kind":"input-submission","identity":"u","payload":{"comment":"x"}}"#,
        )
        .unwrap();
        assert!(matches!(event.payload(), Payload::Structured(_)));
    }

    #[test]
    fn invalid_timestamp_is_rejected() {
        let result: Result<SecurityEvent, _> = serde_json::from_str(
            r#"{"kind":"auth-attempt","identity":"u","timestamp":"yesterday"}"#,
        );
        assert!(result.is_err());
    }
}
