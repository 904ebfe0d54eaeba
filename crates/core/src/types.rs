//! 도메인 타입: 시스템 전역에서 사용되는 공통 타입
//!
//! 심각도, 탐지 결과([`Finding`]), 행위 카운터 종류([`CounterKind`])를 정의합니다.
//! 탐지기, 행위 추적기, 알림 관리자가 이 타입들을 공유합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 심각도
///
/// `Ord` 구현으로 비교 가능합니다: Low < Medium < High < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 낮음
    Low,
    /// 중간
    Medium,
    /// 높음
    High,
    /// 심각
    Critical,
}

impl Severity {
    /// 모든 심각도 (오름차순)
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// 문자열에서 파싱합니다 (대소문자 무시).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// 소문자 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// 한 단계 위의 심각도를 반환합니다. Critical은 Critical로 유지됩니다.
    pub fn next_level(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 탐지 결과 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingCategory {
    Xss,
    SqlInjection,
    PathTraversal,
    CommandInjection,
    BruteForce,
    RateLimit,
    SuspiciousAgent,
    SuspiciousBehavior,
}

impl FindingCategory {
    /// kebab-case 이름 (`"sql-injection"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Xss => "xss",
            Self::SqlInjection => "sql-injection",
            Self::PathTraversal => "path-traversal",
            Self::CommandInjection => "command-injection",
            Self::BruteForce => "brute-force",
            Self::RateLimit => "rate-limit",
            Self::SuspiciousAgent => "suspicious-agent",
            Self::SuspiciousBehavior => "suspicious-behavior",
        }
    }

    /// 알림 타입 이름 (`"sql_injection"`)
    pub fn alert_type(&self) -> String {
        self.as_str().replace('-', "_")
    }
}

impl fmt::Display for FindingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 탐지 결과
///
/// 단독으로 저장되지 않으며, 알림에 첨부되거나 버려집니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// 위협 카테고리
    pub category: FindingCategory,
    /// 기본 심각도
    pub severity: Severity,
    /// 설명
    pub description: String,
    /// 매칭된 규칙 ID
    pub matched_rule: String,
}

impl Finding {
    /// 새 탐지 결과를 생성합니다.
    pub fn new(
        category: FindingCategory,
        severity: Severity,
        description: impl Into<String>,
        matched_rule: impl Into<String>,
    ) -> Self {
        Self {
            category,
            severity,
            description: description.into(),
            matched_rule: matched_rule.into(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}): {}",
            self.severity, self.category, self.matched_rule, self.description
        )
    }
}

/// 행위 카운터 종류
///
/// 식별자별 슬라이딩 윈도우 카운터의 키입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CounterKind {
    LoginFailure,
    HighSeverityAlert,
    MediumSeverityAlert,
    LowSeverityAlert,
    ApiRequest,
    AuthRequest,
    InputRejection,
}

impl CounterKind {
    /// 모든 카운터 종류
    pub const ALL: [CounterKind; 7] = [
        Self::LoginFailure,
        Self::HighSeverityAlert,
        Self::MediumSeverityAlert,
        Self::LowSeverityAlert,
        Self::ApiRequest,
        Self::AuthRequest,
        Self::InputRejection,
    ];

    /// kebab-case 이름 (`"login-failure"`)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginFailure => "login-failure",
            Self::HighSeverityAlert => "high-severity-alert",
            Self::MediumSeverityAlert => "medium-severity-alert",
            Self::LowSeverityAlert => "low-severity-alert",
            Self::ApiRequest => "api-request",
            Self::AuthRequest => "auth-request",
            Self::InputRejection => "input-rejection",
        }
    }

    /// 알림 심각도에 대응하는 에스컬레이션 카운터
    ///
    /// Critical은 더 올라갈 단계가 없으므로 `None`입니다.
    pub fn for_alert_severity(severity: Severity) -> Option<Self> {
        match severity {
            Severity::Low => Some(Self::LowSeverityAlert),
            Severity::Medium => Some(Self::MediumSeverityAlert),
            Severity::High => Some(Self::HighSeverityAlert),
            Severity::Critical => None,
        }
    }

    /// 임계값 초과 시 합성할 탐지 결과의 카테고리와 심각도
    ///
    /// 알림 카운터는 탐지 결과를 만들지 않습니다.
    pub fn synthesized(&self) -> Option<(FindingCategory, Severity)> {
        match self {
            Self::LoginFailure | Self::AuthRequest => {
                Some((FindingCategory::BruteForce, Severity::High))
            }
            Self::ApiRequest => Some((FindingCategory::RateLimit, Severity::Medium)),
            Self::InputRejection => Some((FindingCategory::SuspiciousBehavior, Severity::Medium)),
            Self::HighSeverityAlert | Self::MediumSeverityAlert | Self::LowSeverityAlert => None,
        }
    }

    /// 임계값 초과 시 식별자를 차단하는지 여부 (brute-force 계열)
    pub fn blocks_identity(&self) -> bool {
        matches!(
            self.synthesized(),
            Some((FindingCategory::BruteForce, _))
        )
    }
}

impl fmt::Display for CounterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
