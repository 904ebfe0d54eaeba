//! 설정 관리: watchpost.toml 파싱 및 런타임 설정
//!
//! [`WatchpostConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//! 모든 임계값, 윈도우 길이, 배치 크기는 여기서 주입됩니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`WATCHPOST_AUDIT_BATCH_SIZE=100` 형식)
//! 3. 설정 파일 (`watchpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), watchpost_core::error::WatchpostError> {
//! use watchpost_core::config::WatchpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드 + 검증
//! let config = WatchpostConfig::load("watchpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = WatchpostConfig::parse("[audit]\nbatch_size = 100")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, WatchpostError};
use crate::types::{CounterKind, Severity};

/// 윈도우 길이 상한 (7일)
const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;
/// 버퍼 크기 상한
const MAX_BUFFERED_LIMIT: usize = 1_000_000;
/// 샤드 수 상한
const MAX_SHARD_COUNT: usize = 1024;

/// Watchpost 통합 설정
///
/// `watchpost.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WatchpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 위협 탐지 설정
    #[serde(default)]
    pub detection: DetectionConfig,
    /// 행위 추적 설정
    #[serde(default)]
    pub behavior: BehaviorConfig,
    /// 알림 관리 설정
    #[serde(default)]
    pub alerting: AlertingConfig,
    /// 감사 로그 설정
    #[serde(default)]
    pub audit: AuditConfig,
    /// 이벤트 수집 리스너 설정
    #[serde(default)]
    pub ingest: IngestConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl WatchpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, WatchpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, WatchpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WatchpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                WatchpostError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, WatchpostError> {
        toml::from_str(toml_str).map_err(|e| {
            WatchpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `WATCHPOST_{SECTION}_{FIELD}`
    /// 임계값은 `WATCHPOST_BEHAVIOR_{KIND}_LIMIT`, `WATCHPOST_BEHAVIOR_{KIND}_WINDOW_SECS`
    /// (예: `WATCHPOST_BEHAVIOR_LOGIN_FAILURE_LIMIT=10`)
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "WATCHPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "WATCHPOST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "WATCHPOST_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "WATCHPOST_GENERAL_PID_FILE");

        // Detection
        override_usize(
            &mut self.detection.max_scan_bytes,
            "WATCHPOST_DETECTION_MAX_SCAN_BYTES",
        );
        override_usize(
            &mut self.detection.max_payload_depth,
            "WATCHPOST_DETECTION_MAX_PAYLOAD_DEPTH",
        );
        override_csv(
            &mut self.detection.user_agent_fields,
            "WATCHPOST_DETECTION_USER_AGENT_FIELDS",
        );
        override_string(
            &mut self.detection.min_alert_severity,
            "WATCHPOST_DETECTION_MIN_ALERT_SEVERITY",
        );

        // Behavior
        override_u64(
            &mut self.behavior.block_duration_secs,
            "WATCHPOST_BEHAVIOR_BLOCK_DURATION_SECS",
        );
        override_usize(
            &mut self.behavior.shard_count,
            "WATCHPOST_BEHAVIOR_SHARD_COUNT",
        );
        override_u64(
            &mut self.behavior.purge_interval_secs,
            "WATCHPOST_BEHAVIOR_PURGE_INTERVAL_SECS",
        );
        for kind in CounterKind::ALL {
            let prefix = format!(
                "WATCHPOST_BEHAVIOR_{}",
                kind.as_str().replace('-', "_").to_ascii_uppercase()
            );
            let threshold = self.behavior.thresholds.get_mut(kind);
            override_u32(&mut threshold.limit, &format!("{prefix}_LIMIT"));
            override_u64(&mut threshold.window_secs, &format!("{prefix}_WINDOW_SECS"));
        }

        // Alerting
        override_u64(
            &mut self.alerting.sweep_interval_secs,
            "WATCHPOST_ALERTING_SWEEP_INTERVAL_SECS",
        );
        override_u64(
            &mut self.alerting.low_auto_resolve_secs,
            "WATCHPOST_ALERTING_LOW_AUTO_RESOLVE_SECS",
        );
        override_usize(
            &mut self.alerting.max_alerts,
            "WATCHPOST_ALERTING_MAX_ALERTS",
        );
        override_usize(
            &mut self.alerting.excerpt_max_chars,
            "WATCHPOST_ALERTING_EXCERPT_MAX_CHARS",
        );

        // Audit
        override_string(&mut self.audit.store, "WATCHPOST_AUDIT_STORE");
        override_string(&mut self.audit.path, "WATCHPOST_AUDIT_PATH");
        override_usize(&mut self.audit.batch_size, "WATCHPOST_AUDIT_BATCH_SIZE");
        override_usize(&mut self.audit.max_buffered, "WATCHPOST_AUDIT_MAX_BUFFERED");
        override_u64(
            &mut self.audit.flush_interval_secs,
            "WATCHPOST_AUDIT_FLUSH_INTERVAL_SECS",
        );
        override_u64(
            &mut self.audit.flush_timeout_secs,
            "WATCHPOST_AUDIT_FLUSH_TIMEOUT_SECS",
        );

        // Ingest
        override_bool(&mut self.ingest.enabled, "WATCHPOST_INGEST_ENABLED");
        override_string(&mut self.ingest.bind, "WATCHPOST_INGEST_BIND");
        override_usize(
            &mut self.ingest.max_connections,
            "WATCHPOST_INGEST_MAX_CONNECTIONS",
        );
        override_usize(
            &mut self.ingest.max_line_bytes,
            "WATCHPOST_INGEST_MAX_LINE_BYTES",
        );
        override_u64(
            &mut self.ingest.idle_timeout_secs,
            "WATCHPOST_INGEST_IDLE_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "WATCHPOST_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "WATCHPOST_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "WATCHPOST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 잘못된 값은 이벤트를 받기 전에 시작을 중단시킵니다.
    pub fn validate(&self) -> Result<(), WatchpostError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // detection
        if self.detection.max_scan_bytes == 0 {
            return Err(invalid("detection.max_scan_bytes", "must be greater than 0"));
        }
        if self.detection.max_payload_depth == 0 {
            return Err(invalid(
                "detection.max_payload_depth",
                "must be greater than 0",
            ));
        }
        if Severity::from_str_loose(&self.detection.min_alert_severity).is_none() {
            return Err(invalid(
                "detection.min_alert_severity",
                "must be one of: low, medium, high, critical",
            ));
        }

        // behavior
        if self.behavior.block_duration_secs == 0 {
            return Err(invalid(
                "behavior.block_duration_secs",
                "must be greater than 0",
            ));
        }
        if self.behavior.shard_count == 0 || self.behavior.shard_count > MAX_SHARD_COUNT {
            return Err(invalid(
                "behavior.shard_count",
                format!("must be between 1 and {MAX_SHARD_COUNT}"),
            ));
        }
        if self.behavior.purge_interval_secs == 0 {
            return Err(invalid(
                "behavior.purge_interval_secs",
                "must be greater than 0",
            ));
        }
        for kind in CounterKind::ALL {
            let threshold = self.behavior.thresholds.get(kind);
            let field = format!("behavior.thresholds.{}", kind.as_str().replace('-', "_"));
            if threshold.limit == 0 {
                return Err(invalid(format!("{field}.limit"), "must be greater than 0"));
            }
            if threshold.window_secs == 0 || threshold.window_secs > MAX_WINDOW_SECS {
                return Err(invalid(
                    format!("{field}.window_secs"),
                    format!("must be between 1 and {MAX_WINDOW_SECS}"),
                ));
            }
        }

        // alerting
        if self.alerting.sweep_interval_secs == 0 {
            return Err(invalid(
                "alerting.sweep_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.alerting.low_auto_resolve_secs == 0 {
            return Err(invalid(
                "alerting.low_auto_resolve_secs",
                "must be greater than 0",
            ));
        }
        if self.alerting.max_alerts == 0 {
            return Err(invalid("alerting.max_alerts", "must be greater than 0"));
        }
        if self.alerting.excerpt_max_chars == 0 {
            return Err(invalid(
                "alerting.excerpt_max_chars",
                "must be greater than 0",
            ));
        }

        // audit
        let valid_stores = ["jsonl", "memory"];
        if !valid_stores.contains(&self.audit.store.as_str()) {
            return Err(invalid(
                "audit.store",
                format!("must be one of: {}", valid_stores.join(", ")),
            ));
        }
        if self.audit.store == "jsonl" && self.audit.path.is_empty() {
            return Err(invalid(
                "audit.path",
                "path must not be empty when store is 'jsonl'",
            ));
        }
        if self.audit.max_buffered == 0 || self.audit.max_buffered > MAX_BUFFERED_LIMIT {
            return Err(invalid(
                "audit.max_buffered",
                format!("must be between 1 and {MAX_BUFFERED_LIMIT}"),
            ));
        }
        if self.audit.batch_size == 0 || self.audit.batch_size > self.audit.max_buffered {
            return Err(invalid(
                "audit.batch_size",
                "must be between 1 and audit.max_buffered",
            ));
        }
        if self.audit.flush_interval_secs == 0 {
            return Err(invalid(
                "audit.flush_interval_secs",
                "must be greater than 0",
            ));
        }
        if self.audit.flush_timeout_secs == 0 {
            return Err(invalid(
                "audit.flush_timeout_secs",
                "must be greater than 0",
            ));
        }

        // ingest
        if self.ingest.enabled {
            if self.ingest.bind.is_empty() {
                return Err(invalid(
                    "ingest.bind",
                    "bind must not be empty when ingest is enabled",
                ));
            }
            if self.ingest.max_connections == 0 {
                return Err(invalid(
                    "ingest.max_connections",
                    "must be greater than 0",
                ));
            }
            if self.ingest.max_line_bytes == 0 {
                return Err(invalid("ingest.max_line_bytes", "must be greater than 0"));
            }
        }

        // metrics
        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> WatchpostError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로 (빈 문자열이면 사용하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/watchpost".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 위협 탐지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// 이벤트당 검사할 최대 바이트 수 (초과분은 건너뜀)
    pub max_scan_bytes: usize,
    /// 구조화된 페이로드의 최대 탐색 깊이
    pub max_payload_depth: usize,
    /// User-Agent로 취급할 컨텍스트 키
    pub user_agent_fields: Vec<String>,
    /// 알림을 생성하는 최소 심각도
    pub min_alert_severity: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_scan_bytes: 64 * 1024,
            max_payload_depth: 32,
            user_agent_fields: vec!["user_agent".to_owned(), "userAgent".to_owned()],
            min_alert_severity: "low".to_owned(),
        }
    }
}

impl DetectionConfig {
    /// 알림 최소 심각도 (검증 통과 후에는 항상 파싱에 성공)
    pub fn min_alert_severity(&self) -> Severity {
        Severity::from_str_loose(&self.min_alert_severity).unwrap_or(Severity::Low)
    }
}

/// 카운터 임계값: `window_secs` 안에서 `limit`회를 초과하면 발동
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// 허용 횟수
    pub limit: u32,
    /// 윈도우 길이 (초)
    pub window_secs: u64,
}

impl ThresholdConfig {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    /// 윈도우 길이
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// 카운터 종류별 임계값 테이블
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub login_failure: ThresholdConfig,
    pub high_severity_alert: ThresholdConfig,
    pub medium_severity_alert: ThresholdConfig,
    pub low_severity_alert: ThresholdConfig,
    pub api_request: ThresholdConfig,
    pub auth_request: ThresholdConfig,
    pub input_rejection: ThresholdConfig,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            login_failure: ThresholdConfig::new(5, 15 * 60),
            high_severity_alert: ThresholdConfig::new(1, 5 * 60),
            medium_severity_alert: ThresholdConfig::new(3, 15 * 60),
            low_severity_alert: ThresholdConfig::new(50, 24 * 60 * 60),
            api_request: ThresholdConfig::new(100, 15 * 60),
            auth_request: ThresholdConfig::new(5, 15 * 60),
            input_rejection: ThresholdConfig::new(10, 15 * 60),
        }
    }
}

impl ThresholdsConfig {
    /// 카운터 종류의 임계값
    pub fn get(&self, kind: CounterKind) -> ThresholdConfig {
        match kind {
            CounterKind::LoginFailure => self.login_failure,
            CounterKind::HighSeverityAlert => self.high_severity_alert,
            CounterKind::MediumSeverityAlert => self.medium_severity_alert,
            CounterKind::LowSeverityAlert => self.low_severity_alert,
            CounterKind::ApiRequest => self.api_request,
            CounterKind::AuthRequest => self.auth_request,
            CounterKind::InputRejection => self.input_rejection,
        }
    }

    fn get_mut(&mut self, kind: CounterKind) -> &mut ThresholdConfig {
        match kind {
            CounterKind::LoginFailure => &mut self.login_failure,
            CounterKind::HighSeverityAlert => &mut self.high_severity_alert,
            CounterKind::MediumSeverityAlert => &mut self.medium_severity_alert,
            CounterKind::LowSeverityAlert => &mut self.low_severity_alert,
            CounterKind::ApiRequest => &mut self.api_request,
            CounterKind::AuthRequest => &mut self.auth_request,
            CounterKind::InputRejection => &mut self.input_rejection,
        }
    }
}

/// 행위 추적 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// brute-force 탐지 시 차단 기간 (초)
    pub block_duration_secs: u64,
    /// 식별자 샤드 수
    pub shard_count: usize,
    /// 유휴 윈도우 정리 주기 (초)
    pub purge_interval_secs: u64,
    /// 카운터 임계값
    pub thresholds: ThresholdsConfig,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            block_duration_secs: 30 * 60,
            shard_count: 16,
            purge_interval_secs: 300,
            thresholds: ThresholdsConfig::default(),
        }
    }
}

impl BehaviorConfig {
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs)
    }
}

/// 알림 관리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// 자동 해결/보존 스윕 주기 (초)
    pub sweep_interval_secs: u64,
    /// low 알림 자동 해결까지의 시간 (초)
    pub low_auto_resolve_secs: u64,
    /// 보존할 최대 알림 수
    pub max_alerts: usize,
    /// 알림 데이터 발췌 최대 길이 (문자)
    pub excerpt_max_chars: usize,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
            low_auto_resolve_secs: 24 * 60 * 60,
            max_alerts: 10_000,
            excerpt_max_chars: 256,
        }
    }
}

/// 감사 로그 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// 저장소 종류 (jsonl, memory)
    pub store: String,
    /// JSONL 저장소 파일 경로
    pub path: String,
    /// 배치 크기
    pub batch_size: usize,
    /// 메모리 버퍼 최대 레코드 수
    pub max_buffered: usize,
    /// 플러시 주기 (초)
    pub flush_interval_secs: u64,
    /// 배치 쓰기 타임아웃 (초)
    pub flush_timeout_secs: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            store: "jsonl".to_owned(),
            path: "/var/lib/watchpost/audit.jsonl".to_owned(),
            batch_size: 50,
            max_buffered: 1_000,
            flush_interval_secs: 30,
            flush_timeout_secs: 10,
        }
    }
}

/// 이벤트 수집 리스너 설정 (newline-delimited JSON over TCP)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub bind: String,
    /// 최대 동시 연결 수
    pub max_connections: usize,
    /// 한 줄 최대 크기 (바이트)
    pub max_line_bytes: usize,
    /// 유휴 연결 타임아웃 (초)
    pub idle_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "127.0.0.1:7140".to_owned(),
            max_connections: 64,
            max_line_bytes: 1024 * 1024,
            idle_timeout_secs: 300,
        }
    }
}

/// Prometheus 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
