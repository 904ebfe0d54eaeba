//! 내장 시그니처 규칙 테이블
//!
//! 규칙은 대소문자를 구분하지 않는 정규식이며, 탐지기 생성 시 한 번만 컴파일합니다.
//! 규칙 하나는 이벤트당 최대 한 개의 [`Finding`](watchpost_core::types::Finding)을 만듭니다.

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use watchpost_core::error::DetectionError;
use watchpost_core::types::{FindingCategory, Severity};

/// 컴파일된 정규식의 최대 크기
const REGEX_SIZE_LIMIT: usize = 1 << 20;

/// 시그니처 규칙 정의
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureRule {
    /// 규칙 ID (`"xss-script-tag"`)
    pub id: &'static str,
    /// 위협 카테고리
    pub category: FindingCategory,
    /// 기본 심각도
    pub severity: Severity,
    /// 설명
    pub description: &'static str,
    /// 정규식 패턴
    pub pattern: &'static str,
}

/// 내장 규칙
pub const BUILTIN_RULES: &[SignatureRule] = &[
    // XSS
    SignatureRule {
        id: "xss-script-tag",
        category: FindingCategory::Xss,
        severity: Severity::High,
        description: "script tag in input",
        pattern: r"<\s*/?\s*script\b",
    },
    SignatureRule {
        id: "xss-event-handler",
        category: FindingCategory::Xss,
        severity: Severity::High,
        description: "inline event handler attribute",
        pattern: r"<[^>]*\bon[a-z]+\s*=",
    },
    SignatureRule {
        id: "xss-javascript-uri",
        category: FindingCategory::Xss,
        severity: Severity::High,
        description: "javascript: URI",
        pattern: r"\bjavascript\s*:",
    },
    SignatureRule {
        id: "xss-embedded-frame",
        category: FindingCategory::Xss,
        severity: Severity::Medium,
        description: "embedded frame or object tag",
        pattern: r"<\s*(?:iframe|object|embed)\b",
    },
    // SQL injection
    SignatureRule {
        id: "sqli-tautology",
        category: FindingCategory::SqlInjection,
        severity: Severity::High,
        description: "boolean tautology after a quote",
        pattern: r#"['"]\s*(?:or|and)\s+(?:'[^']*'|"[^"]*"|\d+)\s*(?:=|like)\s*(?:'|"|\d)|\bor\s+1\s*=\s*1\b"#,
    },
    SignatureRule {
        id: "sqli-union-select",
        category: FindingCategory::SqlInjection,
        severity: Severity::High,
        description: "UNION SELECT clause",
        pattern: r"\bunion\s+(?:all\s+)?select\b",
    },
    SignatureRule {
        id: "sqli-stacked-destructive",
        category: FindingCategory::SqlInjection,
        severity: Severity::Critical,
        description: "stacked destructive statement",
        pattern: r";\s*(?:drop\s+(?:table|database)|delete\s+from|truncate\s+table|alter\s+table|insert\s+into|update\s+\w+\s+set)\b",
    },
    SignatureRule {
        id: "sqli-comment-terminator",
        category: FindingCategory::SqlInjection,
        severity: Severity::Medium,
        description: "quote closed by a trailing SQL comment",
        // 주석 뒤에는 공백이나 `-`만 남아야 합니다 (`admin'--`, `1') -- -`)
        pattern: r#"['"]\s*\)*\s*;?\s*(?:--|#|/\*)[\s-]*$"#,
    },
    SignatureRule {
        id: "sqli-time-based",
        category: FindingCategory::SqlInjection,
        severity: Severity::High,
        description: "time-based blind injection function",
        pattern: r"\b(?:sleep|pg_sleep|benchmark)\s*\(|\bwaitfor\s+delay\b",
    },
    // Path traversal
    SignatureRule {
        id: "path-dot-dot",
        category: FindingCategory::PathTraversal,
        severity: Severity::High,
        description: "parent directory traversal sequence",
        pattern: r"(?:\.\.|%2e%2e|%252e%252e)(?:/|\\|%2f|%5c|%252f)",
    },
    SignatureRule {
        id: "path-sensitive-file",
        category: FindingCategory::PathTraversal,
        severity: Severity::Medium,
        description: "reference to a sensitive system file",
        pattern: r"/etc/(?:passwd|shadow|hosts)\b|/proc/self/|\b(?:win|boot)\.ini\b",
    },
    // Command injection
    SignatureRule {
        id: "cmd-chained-command",
        category: FindingCategory::CommandInjection,
        severity: Severity::High,
        description: "shell command chained with a metacharacter",
        // 명령어 뒤에 옵션/경로 인자, 원격 대상, 또는 입력 끝이나 다른 메타문자가 와야 합니다.
        // 인자 없는 형태는 정찰 명령(`id`, `whoami` 등)만 허용합니다.
        pattern: concat!(
            r"(?:;|&&|\|\|?)\s*(?:",
            r"(?:id|whoami|uname|pwd|ls)\s*(?:$|[;&|`#])",
            r"|(?:cat|ls|uname|bash|sh|rm|chmod|python[23]?|perl|wget|curl|nc|ncat|ping)\s+(?:-|/|~|\./|\$)",
            r"|chmod\s+[0-7]{3,4}\b",
            r"|(?:wget|curl|nc|ncat|ping)\s+(?:[a-z]+://|\d{1,3}(?:\.\d{1,3}){3}\b)",
            r")"
        ),
    },
    SignatureRule {
        id: "cmd-substitution",
        category: FindingCategory::CommandInjection,
        severity: Severity::High,
        description: "shell command substitution",
        pattern: r"\$\(\s*[a-z]|`\s*(?:cat|ls|id|whoami|uname|wget|curl|nc|bash|sh|rm)\b[^`]*`",
    },
];

/// 컴파일된 규칙
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: SignatureRule,
    regex: Regex,
}

impl CompiledRule {
    /// 텍스트가 규칙에 매칭되는지 여부
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// 규칙 목록을 컴파일합니다.
///
/// 중복 ID나 컴파일 실패는 시작 시점 에러입니다.
pub fn compile(rules: &[SignatureRule]) -> Result<Vec<CompiledRule>, DetectionError> {
    let mut seen = HashSet::new();
    rules
        .iter()
        .map(|rule| {
            if !seen.insert(rule.id) {
                return Err(DetectionError::DuplicateRule(rule.id.to_owned()));
            }
            let regex = RegexBuilder::new(rule.pattern)
                .case_insensitive(true)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()
                .map_err(|e| DetectionError::RuleCompile {
                    rule_id: rule.id.to_owned(),
                    reason: e.to_string(),
                })?;
            Ok(CompiledRule { rule: *rule, regex })
        })
        .collect()
}
