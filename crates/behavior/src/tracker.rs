//! 행위 추적기: 식별자별 카운터, 임계값, 차단
//!
//! [`BehaviorTracker`]는 `(identity, CounterKind)`마다 [`CounterWindow`]를 두고,
//! 기록할 때마다 설정된 임계값과 비교합니다.
//!
//! # 동시성
//! 상태는 식별자 해시로 샤드를 나누고 샤드마다 뮤텍스를 둡니다.
//! 한 식별자의 윈도우와 차단 정보는 같은 샤드에 있으므로
//! "차단 확인 → 증가 → 임계값 판정 → 차단"이 하나의 임계 구역 안에서 끝납니다.
//! 임계 구역 안에서는 await도 I/O도 없습니다.

use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};
use watchpost_core::config::{BehaviorConfig, ThresholdsConfig};
use watchpost_core::metrics as m;
use watchpost_core::types::{CounterKind, Finding};

use crate::window::CounterWindow;

/// `record` 결과
#[derive(Debug, Clone, PartialEq)]
pub enum CounterState {
    /// 카운터가 증가함
    Counted {
        /// 윈도우 안의 현재 개수
        count: usize,
        /// 적용된 임계값
        limit: u32,
        /// 임계값 초과 여부
        exceeded: bool,
        /// 초과 시 합성된 탐지 결과
        finding: Option<Finding>,
        /// 이 기록으로 식별자가 차단되었다면 차단 만료 시각
        blocked_until: Option<SystemTime>,
    },
    /// 식별자가 차단 중이어서 증가 없이 단락됨
    Blocked {
        /// 차단 만료 시각
        until: SystemTime,
    },
}

impl CounterState {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }

    pub fn is_exceeded(&self) -> bool {
        match self {
            Self::Counted { exceeded, .. } => *exceeded,
            Self::Blocked { .. } => true,
        }
    }

    /// 현재 개수 (차단 상태면 `None`)
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::Counted { count, .. } => Some(*count),
            Self::Blocked { .. } => None,
        }
    }

    /// 합성된 탐지 결과를 꺼냅니다.
    pub fn into_finding(self) -> Option<Finding> {
        match self {
            Self::Counted { finding, .. } => finding,
            Self::Blocked { .. } => None,
        }
    }
}

#[derive(Debug, Default)]
struct Shard {
    windows: HashMap<(String, CounterKind), CounterWindow>,
    blocks: HashMap<String, SystemTime>,
}

/// [`BehaviorTracker::purge_idle`] 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// 제거된 빈 윈도우 수
    pub windows_removed: usize,
    /// 제거된 만료 차단 수
    pub blocks_expired: usize,
    /// 남은 윈도우 수
    pub windows_remaining: usize,
}

/// 식별자별 슬라이딩 윈도우 추적기
pub struct BehaviorTracker {
    thresholds: ThresholdsConfig,
    block_duration: Duration,
    shards: Vec<Mutex<Shard>>,
    hasher: RandomState,
}

impl BehaviorTracker {
    /// 설정으로 추적기를 생성합니다.
    pub fn new(config: &BehaviorConfig) -> Self {
        let shard_count = config.shard_count.max(1);
        Self {
            thresholds: config.thresholds.clone(),
            block_duration: config.block_duration(),
            shards: (0..shard_count).map(|_| Mutex::new(Shard::default())).collect(),
            hasher: RandomState::new(),
        }
    }

    /// 이벤트 하나를 기록하고 현재 상태를 반환합니다.
    ///
    /// 1. 식별자가 차단 중이면 증가 없이 `Blocked`
    /// 2. 윈도우에 `now` 추가, 오래된 항목 정리
    /// 3. 임계값 초과 시 탐지 결과 합성, brute-force 계열이면 `now + block_duration`까지 차단
    pub fn record(&self, identity: &str, kind: CounterKind, now: SystemTime) -> CounterState {
        let threshold = self.thresholds.get(kind);
        let mut shard = self.shard(identity);

        if let Some(until) = shard.blocks.get(identity).copied() {
            if now < until {
                metrics::counter!(m::BEHAVIOR_BLOCKED_RECORDS_TOTAL).increment(1);
                debug!(identity, counter = %kind, "identity blocked, record short-circuited");
                return CounterState::Blocked { until };
            }
            shard.blocks.remove(identity);
        }

        let count = shard
            .windows
            .entry((identity.to_owned(), kind))
            .or_insert_with(|| CounterWindow::new(threshold.window()))
            .record(now);

        let exceeded = count > threshold.limit as usize;
        if !exceeded {
            return CounterState::Counted {
                count,
                limit: threshold.limit,
                exceeded,
                finding: None,
                blocked_until: None,
            };
        }

        metrics::counter!(m::BEHAVIOR_THRESHOLD_EXCEEDED_TOTAL, m::LABEL_COUNTER => kind.as_str())
            .increment(1);

        let finding = kind.synthesized().map(|(category, severity)| {
            Finding::new(
                category,
                severity,
                format!(
                    "{count} {kind} events within {}s (limit {})",
                    threshold.window_secs, threshold.limit
                ),
                format!("behavior-{}", kind.as_str()),
            )
        });

        let blocked_until = if kind.blocks_identity() {
            let until = now + self.block_duration;
            shard.blocks.insert(identity.to_owned(), until);
            metrics::counter!(m::BEHAVIOR_IDENTITIES_BLOCKED_TOTAL).increment(1);
            warn!(
                identity,
                counter = %kind,
                count,
                limit = threshold.limit,
                block_secs = self.block_duration.as_secs(),
                "threshold exceeded, identity blocked"
            );
            Some(until)
        } else {
            debug!(identity, counter = %kind, count, limit = threshold.limit, "threshold exceeded");
            None
        };

        CounterState::Counted {
            count,
            limit: threshold.limit,
            exceeded,
            finding,
            blocked_until,
        }
    }

    /// 증가 없이 현재 개수를 조회합니다.
    pub fn count(&self, identity: &str, kind: CounterKind, now: SystemTime) -> usize {
        let mut shard = self.shard(identity);
        shard
            .windows
            .get_mut(&(identity.to_owned(), kind))
            .map_or(0, |window| window.count(now))
    }

    /// 차단 중이면 만료 시각을 반환합니다.
    pub fn blocked_until(&self, identity: &str, now: SystemTime) -> Option<SystemTime> {
        let shard = self.shard(identity);
        shard
            .blocks
            .get(identity)
            .copied()
            .filter(|until| now < *until)
    }

    /// 운영자 차단 해제. 차단 중이었으면 `true`.
    pub fn unblock(&self, identity: &str) -> bool {
        let removed = self.shard(identity).blocks.remove(identity).is_some();
        if removed {
            warn!(identity, "identity unblocked by operator");
        }
        removed
    }

    /// 빈 윈도우와 만료된 차단을 정리합니다.
    pub fn purge_idle(&self, now: SystemTime) -> PurgeStats {
        let mut stats = PurgeStats::default();
        for shard in &self.shards {
            let mut shard = lock(shard);
            let before = shard.windows.len();
            shard.windows.retain(|_, window| !window.is_empty_at(now));
            stats.windows_removed += before - shard.windows.len();
            stats.windows_remaining += shard.windows.len();

            let before = shard.blocks.len();
            shard.blocks.retain(|_, until| now < *until);
            stats.blocks_expired += before - shard.blocks.len();
        }

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::BEHAVIOR_TRACKED_WINDOWS).set(stats.windows_remaining as f64);
        debug!(
            windows_removed = stats.windows_removed,
            blocks_expired = stats.blocks_expired,
            windows_remaining = stats.windows_remaining,
            "behavior tracker purged"
        );
        stats
    }

    /// 임계값 테이블
    pub fn thresholds(&self) -> &ThresholdsConfig {
        &self.thresholds
    }

    fn shard(&self, identity: &str) -> MutexGuard<'_, Shard> {
        let index = (self.hasher.hash_one(identity) as usize) % self.shards.len();
        lock(&self.shards[index])
    }
}

/// 패닉으로 오염된 뮤텍스도 복구하여 사용합니다 (카운터 상태는 항상 일관적).
fn lock(shard: &Mutex<Shard>) -> MutexGuard<'_, Shard> {
    shard.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::UNIX_EPOCH;

    use watchpost_core::types::{FindingCategory, Severity};

    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn tracker() -> BehaviorTracker {
        BehaviorTracker::new(&BehaviorConfig::default())
    }

    #[test]
    fn below_threshold_is_not_exceeded() {
        let tracker = tracker();
        for i in 0..5 {
            let state = tracker.record("user-1", CounterKind::LoginFailure, at(i));
            assert!(!state.is_exceeded());
            assert_eq!(state.count(), Some(i as usize + 1));
        }
    }

    #[test]
    fn login_failure_exceeded_synthesizes_brute_force_and_blocks() {
        let tracker = tracker();
        for i in 0..5 {
            tracker.record("user-1", CounterKind::LoginFailure, at(i));
        }
        let state = tracker.record("user-1", CounterKind::LoginFailure, at(5));
        let CounterState::Counted {
            count,
            exceeded,
            finding,
            blocked_until,
            ..
        } = state
        else {
            panic!("expected counted state");
        };
        assert_eq!(count, 6);
        assert!(exceeded);
        let finding = finding.expect("brute-force finding");
        assert_eq!(finding.category, FindingCategory::BruteForce);
        assert_eq!(finding.severity, Severity::High);
        assert_eq!(finding.matched_rule, "behavior-login-failure");
        assert_eq!(blocked_until, Some(at(5) + Duration::from_secs(1800)));
    }

    #[test]
    fn blocked_identity_short_circuits_without_increment() {
        let tracker = tracker();
        for i in 0..6 {
            tracker.record("user-1", CounterKind::AuthRequest, at(i));
        }
        let state = tracker.record("user-1", CounterKind::AuthRequest, at(10));
        assert_eq!(
            state,
            CounterState::Blocked {
                until: at(5) + Duration::from_secs(1800)
            }
        );
        assert_eq!(tracker.count("user-1", CounterKind::AuthRequest, at(10)), 6);
    }

    #[test]
    fn block_applies_to_every_counter_kind() {
        let tracker = tracker();
        for i in 0..6 {
            tracker.record("user-1", CounterKind::LoginFailure, at(i));
        }
        let state = tracker.record("user-1", CounterKind::ApiRequest, at(7));
        assert!(state.is_blocked());
        assert_eq!(tracker.count("user-1", CounterKind::ApiRequest, at(7)), 0);
    }

    #[test]
    fn block_expires_after_duration() {
        let tracker = tracker();
        for i in 0..6 {
            tracker.record("user-1", CounterKind::LoginFailure, at(i));
        }
        let expiry = at(5) + Duration::from_secs(1800);
        assert_eq!(tracker.blocked_until("user-1", at(100)), Some(expiry));
        assert_eq!(tracker.blocked_until("user-1", expiry), None);

        let state = tracker.record("user-1", CounterKind::LoginFailure, at(1805));
        assert!(!state.is_blocked());
    }

    #[test]
    fn rate_limit_does_not_block() {
        let tracker = tracker();
        for i in 0..100 {
            tracker.record("10.0.0.1", CounterKind::ApiRequest, at(i));
        }
        let state = tracker.record("10.0.0.1", CounterKind::ApiRequest, at(100));
        assert!(state.is_exceeded());
        let finding = state.into_finding().expect("rate-limit finding");
        assert_eq!(finding.category, FindingCategory::RateLimit);
        assert_eq!(finding.severity, Severity::Medium);
        assert_eq!(tracker.blocked_until("10.0.0.1", at(100)), None);
    }

    #[test]
    fn alert_counters_synthesize_nothing() {
        let tracker = tracker();
        tracker.record("type-a", CounterKind::HighSeverityAlert, at(0));
        let state = tracker.record("type-a", CounterKind::HighSeverityAlert, at(1));
        assert!(state.is_exceeded());
        assert_eq!(state.into_finding(), None);
    }

    #[test]
    fn identities_are_independent() {
        let tracker = tracker();
        for i in 0..6 {
            tracker.record("user-1", CounterKind::LoginFailure, at(i));
        }
        let state = tracker.record("user-2", CounterKind::LoginFailure, at(6));
        assert_eq!(state.count(), Some(1));
    }

    #[test]
    fn unblock_clears_block() {
        let tracker = tracker();
        for i in 0..6 {
            tracker.record("user-1", CounterKind::LoginFailure, at(i));
        }
        assert!(tracker.unblock("user-1"));
        assert!(!tracker.unblock("user-1"));
        assert!(!tracker.record("user-1", CounterKind::LoginFailure, at(7)).is_blocked());
    }

    #[test]
    fn purge_idle_removes_empty_windows_and_expired_blocks() {
        let tracker = tracker();
        tracker.record("user-1", CounterKind::ApiRequest, at(0));
        for i in 0..6 {
            tracker.record("user-2", CounterKind::LoginFailure, at(i));
        }

        let stats = tracker.purge_idle(at(100));
        assert_eq!(stats.windows_removed, 0);
        assert_eq!(stats.blocks_expired, 0);

        let stats = tracker.purge_idle(at(4000));
        assert_eq!(stats.windows_removed, 2);
        assert_eq!(stats.blocks_expired, 1);
        assert_eq!(stats.windows_remaining, 0);
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let tracker = Arc::new(BehaviorTracker::new(&BehaviorConfig {
            thresholds: ThresholdsConfig {
                api_request: watchpost_core::ThresholdConfig::new(10_000, 900),
                ..ThresholdsConfig::default()
            },
            ..BehaviorConfig::default()
        }));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        tracker.record("shared", CounterKind::ApiRequest, at(i % 50));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(tracker.count("shared", CounterKind::ApiRequest, at(50)), 800);
    }

    // === Edge Case Tests ===

    #[test]
    fn single_shard_still_works() {
        let tracker = BehaviorTracker::new(&BehaviorConfig {
            shard_count: 0,
            ..BehaviorConfig::default()
        });
        assert_eq!(
            tracker.record("a", CounterKind::AuthRequest, at(0)).count(),
            Some(1)
        );
    }

    #[test]
    fn empty_identity_is_tracked_like_any_other() {
        let tracker = tracker();
        assert_eq!(
            tracker.record("", CounterKind::ApiRequest, at(0)).count(),
            Some(1)
        );
    }
}
