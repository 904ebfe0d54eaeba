//! 주기 작업: ticker + cancellation token
//!
//! 엔진이 소유하는 백그라운드 스윕(자동 해결, 유휴 카운터 정리)은
//! [`ScheduledTask`]로 실행합니다. 작업마다 독립적으로 취소할 수 있고,
//! 놓친 tick은 몰아서 실행하지 않고 건너뜁니다.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::PipelineError;

/// 주기적으로 실행되는 백그라운드 작업 핸들
pub struct ScheduledTask {
    name: &'static str,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// `period`마다 `tick`을 실행하는 작업을 시작합니다.
    ///
    /// 첫 실행은 시작 후 한 주기가 지난 시점입니다.
    /// `cancel`이 취소되면 진행 중인 tick을 마친 뒤 종료합니다.
    pub fn spawn<F>(
        name: &'static str,
        period: Duration,
        cancel: CancellationToken,
        mut tick: F,
    ) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // 첫 tick은 즉시 완료되므로 소비합니다.
            interval.tick().await;

            info!(task = name, period_secs = period.as_secs(), "scheduled task started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(task = name, "scheduled task received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        tick();
                    }
                }
            }
        });

        Self {
            name,
            cancel,
            handle,
        }
    }

    /// 작업 이름
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 작업이 종료되었는지 여부
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 작업을 취소하고 종료를 기다립니다.
    pub async fn stop(self) -> Result<(), PipelineError> {
        self.cancel.cancel();
        self.handle.await.map_err(|e| PipelineError::TaskJoin {
            name: self.name.to_owned(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn runs_every_period_until_stopped() {
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        let task = ScheduledTask::spawn(
            "test-sweep",
            Duration::from_secs(60),
            CancellationToken::new(),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_secs(185)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        task.stop().await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_token_cancels_task() {
        let parent = CancellationToken::new();
        let task = ScheduledTask::spawn(
            "child",
            Duration::from_secs(1),
            parent.child_token(),
            || {},
        );
        assert_eq!(task.name(), "child");

        parent.cancel();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(task.is_finished());
        task.stop().await.unwrap();
    }
}
