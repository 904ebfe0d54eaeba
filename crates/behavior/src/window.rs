//! 슬라이딩 윈도우 카운터
//!
//! [`CounterWindow`]는 최근 `duration` 안의 타임스탬프를 시간순으로 보관합니다.
//! 별도 타이머 없이, 접근할 때마다 `now - duration`보다 오래된 항목을 먼저 버린 뒤 셉니다.

use std::collections::VecDeque;
use std::time::{Duration, SystemTime};

/// 시간순 타임스탬프 윈도우
#[derive(Debug, Clone)]
pub struct CounterWindow {
    duration: Duration,
    timestamps: VecDeque<SystemTime>,
}

impl CounterWindow {
    /// 새 윈도우를 생성합니다.
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            timestamps: VecDeque::new(),
        }
    }

    /// 윈도우 길이
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// `now`를 기록하고 정리 후의 개수를 반환합니다.
    ///
    /// 동시 호출자가 약간 늦은 타임스탬프를 넘겨도 순서가 유지되도록
    /// 정렬 위치에 삽입합니다.
    pub fn record(&mut self, now: SystemTime) -> usize {
        self.prune(now);
        match self.timestamps.back() {
            Some(last) if *last > now => {
                let idx = self.timestamps.partition_point(|t| *t <= now);
                self.timestamps.insert(idx, now);
            }
            _ => self.timestamps.push_back(now),
        }
        self.timestamps.len()
    }

    /// 윈도우 안의 개수
    pub fn count(&mut self, now: SystemTime) -> usize {
        self.prune(now);
        self.timestamps.len()
    }

    /// 개수가 `threshold`를 초과하는지 여부
    pub fn is_exceeded(&mut self, threshold: u32, now: SystemTime) -> bool {
        self.count(now) > threshold as usize
    }

    /// 가장 최근 타임스탬프
    pub fn latest(&self) -> Option<SystemTime> {
        self.timestamps.back().copied()
    }

    /// 정리 후 비어 있는지 여부
    pub fn is_empty_at(&mut self, now: SystemTime) -> bool {
        self.count(now) == 0
    }

    /// `now - duration`보다 오래된 항목을 버립니다.
    fn prune(&mut self, now: SystemTime) {
        let Some(cutoff) = now.checked_sub(self.duration) else {
            return;
        };
        while let Some(front) = self.timestamps.front() {
            if *front < cutoff {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use proptest::prelude::*;

    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    #[test]
    fn counts_entries_within_window() {
        let mut window = CounterWindow::new(Duration::from_secs(60));
        assert_eq!(window.record(at(0)), 1);
        assert_eq!(window.record(at(10)), 2);
        assert_eq!(window.record(at(59)), 3);
        assert_eq!(window.count(at(59)), 3);
    }

    #[test]
    fn prunes_entries_older_than_window() {
        let mut window = CounterWindow::new(Duration::from_secs(60));
        window.record(at(0));
        window.record(at(30));
        assert_eq!(window.count(at(61)), 1);
        assert_eq!(window.count(at(91)), 0);
        assert!(window.is_empty_at(at(91)));
    }

    #[test]
    fn entry_exactly_at_cutoff_is_kept() {
        let mut window = CounterWindow::new(Duration::from_secs(60));
        window.record(at(0));
        assert_eq!(window.count(at(60)), 1);
        assert_eq!(window.count(at(61)), 0);
    }

    #[test]
    fn is_exceeded_is_strictly_greater() {
        let mut window = CounterWindow::new(Duration::from_secs(60));
        for i in 0..5 {
            window.record(at(i));
        }
        assert!(!window.is_exceeded(5, at(5)));
        window.record(at(6));
        assert!(window.is_exceeded(5, at(6)));
    }

    #[test]
    fn out_of_order_record_keeps_order() {
        let mut window = CounterWindow::new(Duration::from_secs(60));
        window.record(at(10));
        window.record(at(5));
        window.record(at(20));
        assert_eq!(window.latest(), Some(at(20)));
        // at(5)는 at(66)에서 가장 먼저 빠져야 한다
        assert_eq!(window.count(at(66)), 2);
    }

    #[test]
    fn sliding_window_over_twice_the_duration() {
        // 2 × 윈도우 기간에 걸쳐 균등 간격으로 N개를 기록하면
        // 마지막 시점의 카운트는 마지막 윈도우 안의 개수만 반영한다.
        let window_secs = 900;
        let n = 40u64;
        let step = 2 * window_secs / n;
        let mut window = CounterWindow::new(Duration::from_secs(window_secs));
        let mut last = at(0);
        for i in 0..n {
            last = at(i * step);
            window.record(last);
        }
        let count = window.count(last);
        // 마지막 시점에서 [last - 900, last] 안의 항목: 900 / 45 + 1 = 21
        assert_eq!(count, (window_secs / step + 1) as usize);
        assert!(count < n as usize);
        assert!(window.is_exceeded(20, last));
        assert!(!window.is_exceeded(21, last));
    }

    proptest! {
        #[test]
        fn count_never_exceeds_records_in_trailing_window(
            offsets in proptest::collection::vec(0u64..7200, 1..200),
            window_secs in 1u64..3600,
        ) {
            let mut sorted = offsets.clone();
            sorted.sort_unstable();
            let mut window = CounterWindow::new(Duration::from_secs(window_secs));
            for offset in &sorted {
                window.record(at(*offset));
            }
            let last = *sorted.last().unwrap();
            let expected = sorted
                .iter()
                .filter(|o| **o + window_secs >= last)
                .count();
            prop_assert_eq!(window.count(at(last)), expected);
        }
    }
}
