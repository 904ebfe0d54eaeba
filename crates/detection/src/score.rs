//! 위험 점수 계산
//!
//! 최고 심각도 탐지 결과의 기본 점수에, 보강 탐지 결과마다 5점(최대 20점)을 더합니다.
//!
//! | 심각도 | 기본 점수 |
//! |--------|-----------|
//! | low | 10 |
//! | medium | 30 |
//! | high | 60 |
//! | critical | 90 |

use serde::Serialize;
use watchpost_core::types::{Finding, Severity};

/// 보강 탐지 결과 하나당 가산점
const CORROBORATION_STEP: u8 = 5;

/// 보강 가산점 상한
const CORROBORATION_CAP: u8 = 20;

/// 점수 계산 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RiskAssessment {
    /// 0..=100
    pub score: u8,
    /// 최고 심각도 (탐지 결과가 없으면 `None`)
    pub severity: Option<Severity>,
}

impl RiskAssessment {
    /// 탐지 결과가 없는 평가
    pub const NONE: Self = Self {
        score: 0,
        severity: None,
    };
}

/// 심각도별 기본 점수
pub fn base_score(severity: Severity) -> u8 {
    match severity {
        Severity::Low => 10,
        Severity::Medium => 30,
        Severity::High => 60,
        Severity::Critical => 90,
    }
}

/// 탐지 결과 집합의 위험 점수를 계산합니다.
pub fn score(findings: &[Finding]) -> RiskAssessment {
    let Some(highest) = findings.iter().map(|f| f.severity).max() else {
        return RiskAssessment::NONE;
    };

    let extra = findings.len() - 1;
    let bonus = u8::try_from(extra)
        .unwrap_or(u8::MAX)
        .saturating_mul(CORROBORATION_STEP)
        .min(CORROBORATION_CAP);

    RiskAssessment {
        score: base_score(highest).saturating_add(bonus).min(100),
        severity: Some(highest),
    }
}
