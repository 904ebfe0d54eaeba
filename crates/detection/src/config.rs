//! 탐지기 설정
//!
//! [`DetectorConfig`]는 core의 [`DetectionConfig`]에서 탐지기에 필요한 값만 가져옵니다.

use watchpost_core::config::DetectionConfig;

/// 탐지기 설정
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// 이벤트당 검사할 최대 바이트 수
    pub max_scan_bytes: usize,
    /// 구조화된 페이로드의 최대 탐색 깊이
    pub max_payload_depth: usize,
    /// User-Agent로 취급할 컨텍스트 키
    pub user_agent_fields: Vec<String>,
}

impl DetectorConfig {
    /// core 설정에서 탐지기 설정을 생성합니다.
    pub fn from_core(core: &DetectionConfig) -> Self {
        Self {
            max_scan_bytes: core.max_scan_bytes,
            max_payload_depth: core.max_payload_depth,
            user_agent_fields: core.user_agent_fields.clone(),
        }
    }

    /// 컨텍스트 키가 User-Agent 필드인지 여부
    pub fn is_user_agent_field(&self, key: &str) -> bool {
        self.user_agent_fields.iter().any(|field| field == key)
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::from_core(&DetectionConfig::default())
    }
}
