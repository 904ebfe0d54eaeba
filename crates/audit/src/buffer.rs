//! 감사 레코드 버퍼: 최근 `capacity`개만 보관하는 인메모리 큐
//!
//! # 오버플로우 정책
//! 버퍼가 가득 찬 상태에서 레코드가 들어오면:
//! 1. 버퍼 안에 진단 레코드가 있으면 가장 오래된 진단 레코드를 버림
//! 2. 없으면 가장 오래된 레코드를 버림
//!
//! 버린 개수는 [`AuditBuffer::take_overflow_report`]로 모아서 가져가며,
//! 싱크가 플러시 주기마다 하나의 `buffer_overflow` 진단 레코드로 기록합니다.

use std::collections::VecDeque;

use crate::record::AuditRecord;

/// 인메모리 감사 레코드 버퍼
pub struct AuditBuffer {
    records: VecDeque<AuditRecord>,
    capacity: usize,
    /// 마지막 보고 이후 버려진 수
    dropped_since_report: u64,
    /// 누적 버려진 수
    dropped_total: u64,
    /// 누적 유입 수
    total_enqueued: u64,
}

impl AuditBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(10_000)),
            capacity,
            dropped_since_report: 0,
            dropped_total: 0,
            total_enqueued: 0,
        }
    }

    /// 레코드를 뒤에 추가합니다. 다른 레코드를 버렸으면 `true`.
    pub fn push(&mut self, record: AuditRecord) -> bool {
        self.total_enqueued += 1;

        if self.capacity == 0 {
            self.record_drop(1);
            return true;
        }

        let mut dropped = false;
        while self.records.len() >= self.capacity {
            self.evict_one();
            dropped = true;
        }
        self.records.push_back(record);
        dropped
    }

    /// 최대 `batch_size`개를 앞에서 꺼냅니다.
    pub fn drain_batch(&mut self, batch_size: usize) -> Vec<AuditRecord> {
        let count = batch_size.min(self.records.len());
        self.records.drain(..count).collect()
    }

    /// 쓰기에 실패한 배치를 순서를 유지한 채 앞에 되돌립니다.
    ///
    /// 각 레코드의 `attempts`를 올립니다. 용량을 넘으면 가장 오래된 것부터 버립니다.
    pub fn requeue_front(&mut self, batch: Vec<AuditRecord>) {
        for mut record in batch.into_iter().rev() {
            record.attempts = record.attempts.saturating_add(1);
            self.records.push_front(record);
        }

        let overflow = self.records.len().saturating_sub(self.capacity);
        if overflow > 0 {
            self.records.drain(..overflow);
            self.record_drop(overflow as u64);
            tracing::warn!(
                dropped = overflow,
                capacity = self.capacity,
                "audit buffer full on requeue, dropped oldest records"
            );
        }
    }

    /// 마지막 보고 이후 버려진 수를 가져가고 0으로 초기화합니다.
    pub fn take_overflow_report(&mut self) -> Option<u64> {
        let dropped = std::mem::take(&mut self.dropped_since_report);
        (dropped > 0).then_some(dropped)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 누적 버려진 수
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// 누적 유입 수
    pub fn total_enqueued(&self) -> u64 {
        self.total_enqueued
    }

    /// 버퍼에 있는 레코드의 복사본 (앞에서부터)
    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records.iter().cloned().collect()
    }

    /// 버퍼 사용률 (0.0~1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        f64::from(u32::try_from(self.records.len()).unwrap_or(u32::MAX))
            / f64::from(u32::try_from(self.capacity).unwrap_or(u32::MAX))
    }

    /// `batch_size` 이상 쌓였는지 여부
    pub fn should_flush(&self, batch_size: usize) -> bool {
        self.records.len() >= batch_size
    }

    fn evict_one(&mut self) {
        let evicted = match self.records.iter().position(AuditRecord::is_diagnostic) {
            Some(index) => self.records.remove(index),
            None => self.records.pop_front(),
        };
        if let Some(evicted) = evicted {
            self.record_drop(1);
            tracing::warn!(
                dropped_total = self.dropped_total,
                capacity = self.capacity,
                kind = %evicted.kind,
                action = %evicted.action,
                "audit buffer full, dropped record"
            );
        }
    }

    fn record_drop(&mut self, count: u64) {
        self.dropped_since_report += count;
        self.dropped_total += count;
        metrics::counter!(watchpost_core::metrics::AUDIT_RECORDS_DROPPED_TOTAL).increment(count);
    }
}
