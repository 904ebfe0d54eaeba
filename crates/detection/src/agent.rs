//! User-Agent 휴리스틱 탐지기

use watchpost_core::event::SecurityEvent;
use watchpost_core::pipeline::Detector;
use watchpost_core::types::{Finding, FindingCategory, Severity};

use crate::config::DetectorConfig;

/// 공격/스캐닝 도구 식별자 (소문자)
const SCANNER_TOOLS: &[&str] = &[
    "sqlmap", "nikto", "nmap", "masscan", "acunetix", "nessus", "wpscan", "dirbuster",
    "gobuster", "nuclei", "zgrab", "havij", "w3af",
];

/// 스크립트 HTTP 클라이언트 식별자 (소문자)
const SCRIPTED_CLIENTS: &[&str] = &[
    "curl/",
    "wget/",
    "python-requests",
    "python-urllib",
    "go-http-client",
    "libwww-perl",
    "java/",
    "okhttp",
    "httpclient",
];

/// 컨텍스트의 User-Agent 값을 검사하는 탐지기
///
/// User-Agent 필드가 아예 없으면 검사하지 않습니다.
pub struct AgentDetector {
    fields: Vec<String>,
}

impl AgentDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            fields: config.user_agent_fields.clone(),
        }
    }

    fn classify(agent: &str) -> Option<Finding> {
        let trimmed = agent.trim();
        if trimmed.is_empty() {
            return Some(Finding::new(
                FindingCategory::SuspiciousAgent,
                Severity::Low,
                "empty user agent",
                "agent-empty",
            ));
        }

        let lower = trimmed.to_ascii_lowercase();
        if let Some(tool) = SCANNER_TOOLS.iter().find(|tool| lower.contains(**tool)) {
            return Some(Finding::new(
                FindingCategory::SuspiciousAgent,
                Severity::Medium,
                format!("security scanner user agent ({tool})"),
                "agent-scanner-tool",
            ));
        }
        if let Some(client) = SCRIPTED_CLIENTS.iter().find(|c| lower.contains(**c)) {
            return Some(Finding::new(
                FindingCategory::SuspiciousAgent,
                Severity::Low,
                format!(
                    "scripted client user agent ({})",
                    client.trim_end_matches('/')
                ),
                "agent-scripted-client",
            ));
        }
        None
    }
}

impl Detector for AgentDetector {
    fn name(&self) -> &str {
        "agent"
    }

    fn detect(&self, event: &SecurityEvent) -> Vec<Finding> {
        // 여러 키가 있으면 설정 순서상 첫 번째 값만 봅니다.
        self.fields
            .iter()
            .find_map(|field| event.context_value(field))
            .and_then(Self::classify)
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use watchpost_core::event::EventKind;

    use super::*;

    fn detect(agent: Option<&str>) -> Vec<Finding> {
        let mut event = SecurityEvent::new(EventKind::NetworkRequest, "10.0.0.1", "GET /");
        if let Some(agent) = agent {
            event = event.with_context("userAgent", agent);
        }
        AgentDetector::new(&DetectorConfig::default()).detect(&event)
    }

    #[test]
    fn scanner_tool_is_medium() {
        let findings = detect(Some("sqlmap/1.7.2#stable (https://sqlmap.org)"));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].matched_rule, "agent-scanner-tool");
    }

    #[test]
    fn scripted_client_is_low() {
        let findings = detect(Some("curl/8.4.0"));
        assert_eq!(findings[0].severity, Severity::Low);
        assert!(findings[0].description.contains("curl"));
    }

    #[test]
    fn empty_agent_is_low() {
        let findings = detect(Some("   "));
        assert_eq!(findings[0].matched_rule, "agent-empty");
    }

    #[test]
    fn browser_and_missing_agent_are_clean() {
        assert!(
            detect(Some(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0"
            ))
            .is_empty()
        );
        assert!(detect(None).is_empty());
    }

    #[test]
    fn snake_case_field_is_recognized() {
        let event = SecurityEvent::new(EventKind::NetworkRequest, "10.0.0.1", "")
            .with_context("user_agent", "Nikto/2.5.0");
        let findings = AgentDetector::new(&DetectorConfig::default()).detect(&event);
        assert_eq!(findings.len(), 1);
    }
}
