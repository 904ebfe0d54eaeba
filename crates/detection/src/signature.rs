//! 시그니처 탐지기: 페이로드와 컨텍스트 문자열에 규칙 테이블 적용

use std::borrow::Cow;

use tracing::debug;
use watchpost_core::error::DetectionError;
use watchpost_core::event::SecurityEvent;
use watchpost_core::metrics as m;
use watchpost_core::pipeline::Detector;
use watchpost_core::types::Finding;

use crate::config::DetectorConfig;
use crate::rules::{self, BUILTIN_RULES, CompiledRule, SignatureRule};

/// 시그니처 기반 탐지기
///
/// 페이로드의 모든 문자열 리프와 컨텍스트 값을 원문 그대로, 그리고
/// 퍼센트 디코딩한 형태로 한 번 더 검사합니다.
pub struct SignatureDetector {
    rules: Vec<CompiledRule>,
    config: DetectorConfig,
}

impl SignatureDetector {
    /// 내장 규칙으로 탐지기를 생성합니다.
    pub fn new(config: DetectorConfig) -> Result<Self, DetectionError> {
        Self::with_rules(config, BUILTIN_RULES)
    }

    /// 주어진 규칙으로 탐지기를 생성합니다.
    pub fn with_rules(
        config: DetectorConfig,
        rules: &[SignatureRule],
    ) -> Result<Self, DetectionError> {
        let rules = rules::compile(rules)?;
        debug!(rules = rules.len(), "signature rules compiled");
        Ok(Self { rules, config })
    }

    /// 로드된 규칙 정의
    pub fn rules(&self) -> impl Iterator<Item = &SignatureRule> {
        self.rules.iter().map(|compiled| &compiled.rule)
    }

    /// 검사 대상 문자열을 경로와 함께 수집합니다.
    ///
    /// 총 `max_scan_bytes`를 넘는 부분은 잘라내고, 잘렸는지 여부를 함께 반환합니다.
    fn scan_targets<'a>(&self, event: &'a SecurityEvent) -> (Vec<(String, &'a str)>, bool) {
        let collected = event
            .payload()
            .text_fragments(self.config.max_payload_depth);
        let mut truncated = collected.truncated;

        let payload = collected
            .fragments
            .into_iter()
            .map(|fragment| (fragment.path, fragment.text));
        let context = event
            .context()
            .iter()
            .map(|(key, value)| (format!("context.{key}"), value.as_str()));

        let mut budget = self.config.max_scan_bytes;
        let mut targets = Vec::new();
        for (path, text) in payload.chain(context) {
            if budget == 0 {
                truncated = true;
                break;
            }
            let slice = truncate_at_char_boundary(text, budget);
            if slice.len() < text.len() {
                truncated = true;
            }
            budget -= slice.len();
            targets.push((path, slice));
        }
        (targets, truncated)
    }
}

impl Detector for SignatureDetector {
    fn name(&self) -> &str {
        "signature"
    }

    fn detect(&self, event: &SecurityEvent) -> Vec<Finding> {
        let (targets, truncated) = self.scan_targets(event);
        if truncated {
            metrics::counter!(m::DETECTION_PAYLOADS_TRUNCATED_TOTAL).increment(1);
            debug!(event_id = event.id(), "payload exceeded scan limits, scanned partially");
        }

        let decoded: Vec<Option<String>> = targets
            .iter()
            .map(|(_, text)| match percent_decode(text) {
                Cow::Owned(decoded) => Some(decoded),
                Cow::Borrowed(_) => None,
            })
            .collect();

        let mut findings = Vec::new();
        for compiled in &self.rules {
            let hit = targets.iter().zip(&decoded).find_map(|((path, raw), decoded)| {
                let matched = compiled.is_match(raw)
                    || decoded.as_deref().is_some_and(|d| compiled.is_match(d));
                matched.then_some(path)
            });
            let Some(path) = hit else { continue };

            let description = if path.is_empty() {
                compiled.rule.description.to_owned()
            } else {
                format!("{} in '{path}'", compiled.rule.description)
            };
            findings.push(Finding::new(
                compiled.rule.category,
                compiled.rule.severity,
                description,
                compiled.rule.id,
            ));
        }
        findings
    }
}

/// `max_bytes` 이하의 가장 긴 UTF-8 경계 접두사
fn truncate_at_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// `%XX`와 `+`를 디코딩합니다. 이중 인코딩을 위해 최대 두 번 적용합니다.
///
/// 디코딩할 것이 없으면 `Cow::Borrowed`를 반환합니다.
/// 잘못된 이스케이프는 그대로 두고, 디코딩 결과가 UTF-8이 아니면 손실 변환합니다.
pub fn percent_decode(text: &str) -> Cow<'_, str> {
    let mut current = Cow::Borrowed(text);
    for _ in 0..2 {
        match decode_once(&current) {
            Some(decoded) => current = Cow::Owned(decoded),
            None => break,
        }
    }
    current
}

fn decode_once(text: &str) -> Option<String> {
    if !text.bytes().any(|b| b == b'%' || b == b'+') {
        return None;
    }

    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut changed = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        changed = true;
                        i += 3;
                    }
                    _ => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                changed = true;
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }

    changed.then(|| String::from_utf8_lossy(&out).into_owned())
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
