//! 위협 탐지기: 탐지기 묶음을 순서대로 실행

use tracing::debug;
use watchpost_core::error::DetectionError;
use watchpost_core::event::SecurityEvent;
use watchpost_core::metrics as m;
use watchpost_core::pipeline::Detector;
use watchpost_core::types::Finding;

use crate::agent::AgentDetector;
use crate::config::DetectorConfig;
use crate::rules::SignatureRule;
use crate::signature::SignatureDetector;

/// 시그니처, User-Agent, 사용자 정의 탐지기를 합성한 탐지기
///
/// 결과 순서는 탐지기 등록 순서, 그 안에서는 규칙 순서를 따릅니다.
pub struct ThreatDetector {
    signature: SignatureDetector,
    agent: AgentDetector,
    custom: Vec<Box<dyn Detector>>,
}

impl ThreatDetector {
    /// 내장 탐지기로 생성합니다. 규칙 컴파일 실패는 에러입니다.
    pub fn new(config: DetectorConfig) -> Result<Self, DetectionError> {
        let agent = AgentDetector::new(&config);
        let signature = SignatureDetector::new(config)?;
        Ok(Self {
            signature,
            agent,
            custom: Vec::new(),
        })
    }

    /// 사용자 정의 탐지기를 추가합니다.
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        debug!(detector = detector.name(), "custom detector registered");
        self.custom.push(detector);
        self
    }

    /// 내장 시그니처 규칙 목록
    pub fn rules(&self) -> impl Iterator<Item = &SignatureRule> {
        self.signature.rules()
    }

    /// 등록된 탐지기 이름
    pub fn detector_names(&self) -> Vec<&str> {
        [self.signature.name(), self.agent.name()]
            .into_iter()
            .chain(self.custom.iter().map(|d| d.name()))
            .collect()
    }

    /// 이벤트를 검사합니다.
    pub fn detect(&self, event: &SecurityEvent) -> Vec<Finding> {
        let mut findings = self.signature.detect(event);
        findings.extend(self.agent.detect(event));
        for detector in &self.custom {
            findings.extend(detector.detect(event));
        }

        metrics::counter!(m::DETECTION_EVENTS_SCANNED_TOTAL).increment(1);
        for finding in &findings {
            metrics::counter!(
                m::DETECTION_FINDINGS_TOTAL,
                m::LABEL_CATEGORY => finding.category.as_str()
            )
            .increment(1);
        }
        if !findings.is_empty() {
            debug!(
                event_id = event.id(),
                identity = event.identity(),
                findings = findings.len(),
                "threats detected"
            );
        }
        findings
    }
}

impl Detector for ThreatDetector {
    fn name(&self) -> &str {
        "threat"
    }

    fn detect(&self, event: &SecurityEvent) -> Vec<Finding> {
        ThreatDetector::detect(self, event)
    }
}
