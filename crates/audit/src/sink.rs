//! 감사 싱크: 비차단 enqueue와 백그라운드 배치 플러시
//!
//! [`AuditHandle`]은 호출자 쪽 핸들로, 버퍼에 레코드를 넣기만 하고 즉시 반환합니다.
//! [`AuditSink`]는 [`Pipeline`]을 구현하며, 시작하면 플러시 루프를 띄웁니다.
//!
//! # 플러시 루프
//! ```text
//! select! {
//!     cancel      => 종료 (남은 레코드 최종 드레인)
//!     interval    => 버퍼가 빌 때까지 배치 단위로 기록
//!     notify      => batch_size 이상 쌓인 동안 기록
//! }
//! ```
//! 쓰기는 `flush_timeout`으로 제한되며, 실패하거나 시간을 넘기면 배치를 버퍼 앞에 되돌리고
//! 다음 주기에 재시도합니다 (at-least-once).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use watchpost_core::config::AuditConfig;
use watchpost_core::error::{PipelineError, WatchpostError};
use watchpost_core::metrics as m;
use watchpost_core::pipeline::{HealthStatus, Pipeline};

use crate::buffer::AuditBuffer;
use crate::error::AuditError;
use crate::record::{AuditRecord, RecordKind};
use crate::store::AuditStore;

/// 연속 실패가 이 횟수에 도달하면 Degraded로 보고합니다.
const DEGRADED_AFTER_FAILURES: u64 = 3;

/// 싱크 설정
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// 배치 크기, 즉시 플러시 트리거 기준
    pub batch_size: usize,
    /// 버퍼 최대 레코드 수
    pub max_buffered: usize,
    /// 주기 플러시 간격
    pub flush_interval: Duration,
    /// 배치 쓰기 제한 시간
    pub flush_timeout: Duration,
}

impl SinkConfig {
    /// core 설정에서 싱크 설정을 생성합니다.
    pub fn from_core(core: &AuditConfig) -> Self {
        Self {
            batch_size: core.batch_size.max(1),
            max_buffered: core.max_buffered,
            flush_interval: Duration::from_secs(core.flush_interval_secs),
            flush_timeout: Duration::from_secs(core.flush_timeout_secs),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::from_core(&AuditConfig::default())
    }
}

/// 버퍼 통계
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BufferStats {
    pub buffered: usize,
    pub capacity: usize,
    pub enqueued_total: u64,
    pub dropped_total: u64,
    pub utilization: f64,
}

/// 감사 레코드를 넣는 호출자 쪽 핸들
///
/// 복제 비용이 낮으며 모든 복제본이 같은 버퍼를 공유합니다.
#[derive(Clone)]
pub struct AuditHandle {
    buffer: Arc<Mutex<AuditBuffer>>,
    notify: Arc<Notify>,
    batch_size: usize,
}

impl AuditHandle {
    pub fn new(config: &SinkConfig) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(AuditBuffer::new(config.max_buffered))),
            notify: Arc::new(Notify::new()),
            batch_size: config.batch_size.max(1),
        }
    }

    /// 레코드를 버퍼에 넣습니다. 절대 블로킹하지 않습니다.
    ///
    /// 버퍼가 `batch_size`에 도달하면 플러시 루프를 깨웁니다.
    pub fn enqueue(&self, record: AuditRecord) {
        let (len, flush) = {
            let mut buffer = self.lock();
            buffer.push(record);
            (buffer.len(), buffer.should_flush(self.batch_size))
        };

        metrics::counter!(m::AUDIT_RECORDS_ENQUEUED_TOTAL).increment(1);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(m::AUDIT_BUFFER_SIZE).set(len as f64);

        if flush {
            self.notify.notify_one();
        }
    }

    /// 값을 직렬화하여 레코드로 넣습니다.
    ///
    /// 직렬화에 실패하면 경고만 남기고 건너뜁니다.
    pub fn record(&self, kind: RecordKind, action: &str, payload: &impl Serialize) {
        match AuditRecord::new(kind, action, payload) {
            Ok(record) => self.enqueue(record),
            Err(e) => warn!(kind = %kind, action, error = %e, "audit record skipped"),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// 아직 기록되지 않은 레코드의 복사본
    pub fn pending(&self) -> Vec<AuditRecord> {
        self.lock().snapshot()
    }

    pub fn stats(&self) -> BufferStats {
        let buffer = self.lock();
        BufferStats {
            buffered: buffer.len(),
            capacity: buffer.capacity(),
            enqueued_total: buffer.total_enqueued(),
            dropped_total: buffer.dropped_total(),
            utilization: buffer.utilization(),
        }
    }

    /// 버퍼가 `batch_size`에 도달했는지 여부
    fn should_flush(&self) -> bool {
        self.lock().should_flush(self.batch_size)
    }

    /// 다음 배치를 꺼냅니다.
    ///
    /// 보고할 버퍼 초과가 있으면 배치 한 자리를 `buffer_overflow` 진단 레코드에 씁니다.
    fn take_batch(&self, batch_size: usize) -> Vec<AuditRecord> {
        let mut buffer = self.lock();
        let report = buffer.take_overflow_report();
        let reserve = usize::from(report.is_some());
        let mut batch = buffer.drain_batch(batch_size.saturating_sub(reserve));
        if let Some(dropped) = report {
            batch.push(AuditRecord::diagnostic(
                "buffer_overflow",
                json!({ "dropped": dropped, "capacity": buffer.capacity() }),
            ));
        }
        batch
    }

    fn requeue(&self, batch: Vec<AuditRecord>) {
        self.lock().requeue_front(batch);
    }

    fn lock(&self) -> MutexGuard<'_, AuditBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 싱크 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    Initialized,
    Running,
    Stopped,
}

/// 감사 싱크
pub struct AuditSink<S: AuditStore> {
    config: SinkConfig,
    handle: AuditHandle,
    store: Arc<S>,
    state: SinkState,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    consecutive_failures: Arc<AtomicU64>,
}

impl<S: AuditStore> AuditSink<S> {
    pub fn new(config: SinkConfig, store: S) -> Self {
        let handle = AuditHandle::new(&config);
        Self {
            config,
            handle,
            store: Arc::new(store),
            state: SinkState::Initialized,
            cancel: CancellationToken::new(),
            task: None,
            consecutive_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 호출자 쪽 핸들
    pub fn handle(&self) -> AuditHandle {
        self.handle.clone()
    }

    /// 저장소
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// 배치 하나를 즉시 기록합니다. 기록한 레코드 수를 반환합니다.
    pub async fn flush_once(&self) -> Result<usize, AuditError> {
        self.flusher().flush_once().await
    }

    /// 버퍼가 빌 때까지 기록합니다. 첫 실패에서 멈춥니다.
    pub async fn flush_all(&self) -> Result<usize, AuditError> {
        self.flusher().drain().await
    }

    fn flusher(&self) -> Flusher<S> {
        Flusher {
            handle: self.handle.clone(),
            store: Arc::clone(&self.store),
            batch_size: self.config.batch_size.max(1),
            timeout: self.config.flush_timeout,
            consecutive_failures: Arc::clone(&self.consecutive_failures),
        }
    }
}

impl<S: AuditStore> Pipeline for AuditSink<S> {
    async fn start(&mut self) -> Result<(), WatchpostError> {
        if self.state == SinkState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        self.cancel = CancellationToken::new();
        let flusher = self.flusher();
        let cancel = self.cancel.clone();
        let period = self.config.flush_interval;
        self.task = Some(tokio::spawn(flush_loop(flusher, period, cancel)));

        self.state = SinkState::Running;
        info!(
            store = self.store.name(),
            batch_size = self.config.batch_size,
            max_buffered = self.config.max_buffered,
            flush_interval_secs = period.as_secs(),
            "audit sink started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), WatchpostError> {
        if self.state != SinkState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping audit sink");
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| PipelineError::TaskJoin {
                name: "audit-flush".to_owned(),
                reason: e.to_string(),
            })?;
        }

        self.state = SinkState::Stopped;
        info!(remaining = self.handle.len(), "audit sink stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            SinkState::Running => {
                let failures = self.consecutive_failures.load(Ordering::Relaxed);
                let utilization = self.handle.stats().utilization;
                if failures >= DEGRADED_AFTER_FAILURES {
                    HealthStatus::Degraded(format!("{failures} consecutive flush failures"))
                } else if utilization > 0.9 {
                    HealthStatus::Degraded(format!(
                        "audit buffer utilization high: {:.1}%",
                        utilization * 100.0
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            SinkState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            SinkState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 플러시 루프와 수동 플러시가 공유하는 쓰기 로직
struct Flusher<S> {
    handle: AuditHandle,
    store: Arc<S>,
    batch_size: usize,
    timeout: Duration,
    consecutive_failures: Arc<AtomicU64>,
}

impl<S: AuditStore> Flusher<S> {
    async fn flush_once(&self) -> Result<usize, AuditError> {
        let batch = self.handle.take_batch(self.batch_size);
        if batch.is_empty() {
            return Ok(0);
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, self.store.write_batch(&batch)).await
        {
            Ok(result) => result,
            Err(_) => Err(AuditError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };
        metrics::histogram!(m::AUDIT_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                let written = batch.len();
                self.consecutive_failures.store(0, Ordering::Relaxed);
                metrics::counter!(m::AUDIT_RECORDS_FLUSHED_TOTAL).increment(written as u64);
                debug!(store = self.store.name(), records = written, "audit batch written");
                Ok(written)
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                metrics::counter!(m::AUDIT_FLUSH_FAILURES_TOTAL).increment(1);
                warn!(
                    store = self.store.name(),
                    records = batch.len(),
                    consecutive_failures = failures,
                    error = %e,
                    "audit batch write failed, requeued"
                );
                self.handle.requeue(batch);
                Err(e)
            }
        }
    }

    /// 버퍼가 빌 때까지 기록합니다.
    ///
    /// 시작 시점 버퍼 크기 기준으로 반복 횟수를 제한하여 동시 유입이 있어도 끝납니다.
    async fn drain(&self) -> Result<usize, AuditError> {
        let max_rounds = self.handle.len() / self.batch_size + 2;
        let mut total = 0;
        for _ in 0..max_rounds {
            match self.flush_once().await? {
                0 => break,
                written => total += written,
            }
        }
        Ok(total)
    }

    /// `batch_size` 이상 쌓여 있는 동안 기록합니다.
    async fn drain_full_batches(&self) -> Result<usize, AuditError> {
        let mut total = 0;
        while self.handle.should_flush() {
            total += self.flush_once().await?;
        }
        Ok(total)
    }
}

async fn flush_loop<S: AuditStore>(flusher: Flusher<S>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("audit flush loop received shutdown signal");
                break;
            }
            _ = interval.tick() => {
                // 실패는 다음 주기에 재시도
                let _ = flusher.drain().await;
            }
            _ = flusher.handle.notify.notified() => {
                let _ = flusher.drain_full_batches().await;
            }
        }
    }

    // graceful shutdown: 남은 레코드 최종 드레인
    let remaining = flusher.handle.len();
    if remaining == 0 {
        return;
    }
    match flusher.drain().await {
        Ok(written) => info!(written, "audit buffer drained on shutdown"),
        Err(e) => error!(
            error = %e,
            remaining = flusher.handle.len(),
            "final audit flush failed, records lost on exit"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAuditStore;

    fn config(batch_size: usize, max_buffered: usize) -> SinkConfig {
        SinkConfig {
            batch_size,
            max_buffered,
            flush_interval: Duration::from_secs(30),
            flush_timeout: Duration::from_secs(10),
        }
    }

    fn record(action: &str) -> AuditRecord {
        AuditRecord::from_value(RecordKind::Event, action, json!({}))
    }

    #[test]
    fn sink_config_from_core() {
        let config = SinkConfig::from_core(&AuditConfig::default());
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.max_buffered, 1000);
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert_eq!(config.flush_timeout, Duration::from_secs(10));
    }

    #[test]
    fn handle_clones_share_buffer() {
        let handle = AuditHandle::new(&config(10, 100));
        let clone = handle.clone();
        clone.enqueue(record("a"));
        assert_eq!(handle.len(), 1);
        assert_eq!(handle.stats().enqueued_total, 1);
    }

    #[test]
    fn record_serializes_payload() {
        let handle = AuditHandle::new(&config(10, 100));
        handle.record(RecordKind::Alert, "alert_created", &json!({"id": "a-1"}));
        let pending = handle.pending();
        assert_eq!(pending[0].action, "alert_created");
        assert_eq!(pending[0].payload["id"], "a-1");
    }

    #[test]
    fn take_batch_reserves_slot_for_overflow_report() {
        let handle = AuditHandle::new(&config(3, 2));
        for i in 0..4 {
            handle.enqueue(record(&format!("r{i}")));
        }
        let batch = handle.take_batch(3);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch[2].action, "buffer_overflow");
        assert_eq!(batch[2].payload["dropped"], 2);
        assert!(handle.take_batch(3).is_empty());
    }

    #[tokio::test]
    async fn flush_once_writes_one_batch() {
        let store = MemoryAuditStore::new();
        let sink = AuditSink::new(config(2, 100), store.clone());
        let handle = sink.handle();
        for i in 0..3 {
            handle.enqueue(record(&format!("r{i}")));
        }
        assert_eq!(sink.flush_once().await.unwrap(), 2);
        assert_eq!(store.len(), 2);
        assert_eq!(sink.flush_all().await.unwrap(), 1);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn full_batch_is_flushed_before_interval() {
        let store = MemoryAuditStore::new();
        let mut sink = AuditSink::new(config(3, 100), store.clone());
        let handle = sink.handle();
        sink.start().await.unwrap();

        handle.enqueue(record("r0"));
        handle.enqueue(record("r1"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(store.is_empty(), "below batch size waits for the interval");

        handle.enqueue(record("r2"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.len(), 3);
        assert!(handle.is_empty());

        sink.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_and_health() {
        let mut sink = AuditSink::new(config(10, 100), MemoryAuditStore::new());
        assert!(sink.health_check().await.is_unhealthy());
        assert!(sink.stop().await.is_err());

        sink.start().await.unwrap();
        assert!(sink.start().await.is_err());
        assert!(sink.health_check().await.is_healthy());

        sink.stop().await.unwrap();
        assert!(sink.health_check().await.is_unhealthy());
    }
}
