//! 엔진 서비스: 엔진, 감사 싱크, 주기 작업의 생명주기
//!
//! # 시작 순서
//! 1. 감사 싱크 (플러시 루프)
//! 2. 알림 스윕 (`alerting.sweep_interval_secs`)
//! 3. 행위 윈도우 정리 (`behavior.purge_interval_secs`)
//!
//! # 종료 순서
//! 주기 작업을 먼저 멈춘 뒤 감사 싱크를 멈춥니다. 싱크는 종료 시 남은 레코드를
//! 최종 플러시하므로, 마지막 스윕이 남긴 레코드도 기록됩니다.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use watchpost_audit::{AuditSink, AuditStore, ConfiguredStore, SinkConfig};
use watchpost_core::config::WatchpostConfig;
use watchpost_core::error::{PipelineError, WatchpostError};
use watchpost_core::pipeline::{HealthStatus, Pipeline};
use watchpost_core::schedule::ScheduledTask;

use crate::engine::SecurityEngine;

/// 서비스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Initialized,
    Running,
    Stopped,
}

/// 엔진과 백그라운드 작업을 묶은 서비스
pub struct EngineService<S: AuditStore = ConfiguredStore> {
    engine: Arc<SecurityEngine>,
    sink: AuditSink<S>,
    sweep_interval: Duration,
    purge_interval: Duration,
    cancel: CancellationToken,
    tasks: Vec<ScheduledTask>,
    state: ServiceState,
}

impl EngineService<ConfiguredStore> {
    /// 설정에서 감사 저장소까지 모두 구성합니다.
    pub fn from_config(config: &WatchpostConfig) -> Result<Self, WatchpostError> {
        let store = ConfiguredStore::from_config(&config.audit)?;
        Self::with_store(config, store)
    }
}

impl<S: AuditStore> EngineService<S> {
    /// 주어진 감사 저장소로 서비스를 구성합니다.
    pub fn with_store(config: &WatchpostConfig, store: S) -> Result<Self, WatchpostError> {
        let sink = AuditSink::new(SinkConfig::from_core(&config.audit), store);
        let engine = SecurityEngine::new(config, sink.handle())?;

        Ok(Self {
            engine: Arc::new(engine),
            sink,
            sweep_interval: Duration::from_secs(config.alerting.sweep_interval_secs),
            purge_interval: Duration::from_secs(config.behavior.purge_interval_secs),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
            state: ServiceState::Initialized,
        })
    }

    /// 공유 엔진
    pub fn engine(&self) -> Arc<SecurityEngine> {
        Arc::clone(&self.engine)
    }

    pub fn sink(&self) -> &AuditSink<S> {
        &self.sink
    }

    pub fn is_running(&self) -> bool {
        self.state == ServiceState::Running
    }

    fn spawn_tasks(&mut self) {
        let engine = Arc::clone(&self.engine);
        self.tasks.push(ScheduledTask::spawn(
            "alert-sweep",
            self.sweep_interval,
            self.cancel.child_token(),
            move || {
                engine.alerts().sweep(SystemTime::now());
            },
        ));

        let engine = Arc::clone(&self.engine);
        self.tasks.push(ScheduledTask::spawn(
            "behavior-purge",
            self.purge_interval,
            self.cancel.child_token(),
            move || {
                engine.tracker().purge_idle(SystemTime::now());
            },
        ));
    }
}

impl<S: AuditStore> Pipeline for EngineService<S> {
    async fn start(&mut self) -> Result<(), WatchpostError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        self.sink.start().await?;
        self.cancel = CancellationToken::new();
        self.spawn_tasks();

        self.state = ServiceState::Running;
        info!(
            sweep_interval_secs = self.sweep_interval.as_secs(),
            purge_interval_secs = self.purge_interval.as_secs(),
            "engine service started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), WatchpostError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping engine service");
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let name = task.name();
            if let Err(e) = task.stop().await {
                warn!(task = name, error = %e, "scheduled task did not stop cleanly");
            }
        }

        self.sink.stop().await?;
        self.state = ServiceState::Stopped;
        info!("engine service stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running => {
                if let Some(task) = self.tasks.iter().find(|t| t.is_finished()) {
                    return HealthStatus::Degraded(format!(
                        "scheduled task '{}' exited",
                        task.name()
                    ));
                }
                self.sink.health_check().await
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}
