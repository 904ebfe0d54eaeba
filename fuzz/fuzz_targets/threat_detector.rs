#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use watchpost_core::event::{EventKind, Payload, SecurityEvent};
use watchpost_detection::{DetectorConfig, ThreatDetector, score};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    kind: FuzzKind,
    payload: FuzzPayload,
    /// 컨텍스트 태그 (최대 8개로 제한)
    context: Vec<(String, String)>,
    user_agent: Option<String>,
}

#[derive(Arbitrary, Debug)]
enum FuzzKind {
    Input,
    Auth,
    Network,
    Storage,
    Runtime,
}

#[derive(Arbitrary, Debug)]
enum FuzzPayload {
    Text(String),
    /// 필드 경로와 값 (경로 깊이만큼 중첩)
    Nested { path: Vec<String>, value: String },
}

impl FuzzKind {
    fn to_event_kind(&self) -> EventKind {
        match self {
            FuzzKind::Input => EventKind::InputSubmission,
            FuzzKind::Auth => EventKind::AuthAttempt,
            FuzzKind::Network => EventKind::NetworkRequest,
            FuzzKind::Storage => EventKind::StorageAccess,
            FuzzKind::Runtime => EventKind::RuntimeError,
        }
    }
}

fn build_payload(payload: FuzzPayload) -> Payload {
    match payload {
        FuzzPayload::Text(text) => Payload::Text(text),
        FuzzPayload::Nested { path, value } => {
            let mut current = serde_json::Value::String(value);
            for key in path.into_iter().take(64).rev() {
                let mut map = serde_json::Map::new();
                map.insert(key, current);
                current = serde_json::Value::Object(map);
            }
            match current {
                serde_json::Value::Object(map) => Payload::Structured(map),
                other => Payload::Text(other.to_string()),
            }
        }
    }
}

fuzz_target!(|input: FuzzInput| {
    let Ok(detector) = ThreatDetector::new(DetectorConfig::default()) else {
        return;
    };

    let mut event = SecurityEvent::new(
        input.kind.to_event_kind(),
        "fuzz",
        build_payload(input.payload),
    );
    for (key, value) in input.context.into_iter().take(8) {
        event = event.with_context(key, value);
    }
    if let Some(agent) = input.user_agent {
        event = event.with_context("user_agent", agent);
    }

    // 어떤 입력에도 패닉 없이 결과를 내야 하며 점수는 0..=100
    let findings = detector.detect(&event);
    let risk = score(&findings);
    assert!(risk.score <= 100);
    assert_eq!(risk.severity.is_some(), !findings.is_empty());
});
