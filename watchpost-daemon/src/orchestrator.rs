//! Daemon orchestration -- assembly, lifecycle, and shutdown.
//!
//! The [`Orchestrator`] loads configuration, builds the engine service and
//! the optional ingest listener, and drives their lifecycles.
//!
//! # Startup Order
//!
//! 1. PID file
//! 2. Engine service (audit sink, alert sweep, behavior purge)
//! 3. Ingest listener (only after the engine can take events)
//!
//! # Shutdown Order
//!
//! 1. Ingest listener (stop accepting events)
//! 2. Engine service (stop scheduled tasks, final audit flush)
//! 3. PID file removal

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use watchpost_core::config::WatchpostConfig;
use watchpost_core::metrics as m;
use watchpost_core::pipeline::Pipeline;
use watchpost_core::schedule::ScheduledTask;
use watchpost_engine::{EngineService, SecurityEngine};

use crate::health::{ComponentHealth, DaemonHealth, aggregate_status};
use crate::ingest::IngestListener;
use crate::metrics_server;

/// How often the uptime gauge is refreshed.
const UPTIME_INTERVAL: Duration = Duration::from_secs(15);

/// The main daemon orchestrator.
pub struct Orchestrator {
    config: WatchpostConfig,
    service: EngineService,
    ingest: Option<IngestListener>,
    cancel: CancellationToken,
    uptime_task: Option<ScheduledTask>,
    start_time: Instant,
    pid_written: bool,
}

impl Orchestrator {
    /// Load `watchpost.toml` (with environment overrides) and build.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = WatchpostConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    pub fn build_from_config(config: WatchpostConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
        }

        let service = EngineService::from_config(&config)
            .map_err(|e| anyhow::anyhow!("failed to build engine service: {}", e))?;

        let ingest = config.ingest.enabled.then(|| {
            tracing::info!(bind = %config.ingest.bind, "ingest listener enabled");
            IngestListener::new(config.ingest.clone(), service.engine())
        });

        tracing::info!(
            audit_store = %config.audit.store,
            ingest = ingest.is_some(),
            metrics = config.metrics.enabled,
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            service,
            ingest,
            cancel: CancellationToken::new(),
            uptime_task: None,
            start_time: Instant::now(),
            pid_written: false,
        })
    }

    /// Start all components in order.
    ///
    /// On failure, components already started are stopped again and the
    /// PID file is removed.
    pub async fn start(&mut self) -> Result<()> {
        if !self.config.general.pid_file.is_empty() {
            write_pid_file(Path::new(&self.config.general.pid_file))?;
            self.pid_written = true;
        }

        if let Err(e) = self.service.start().await {
            self.remove_pid();
            return Err(anyhow::anyhow!("failed to start engine service: {}", e));
        }

        if let Some(ingest) = self.ingest.as_mut() {
            if let Err(e) = ingest.start().await {
                tracing::warn!("ingest startup failed, rolling back engine service");
                if let Err(stop_err) = self.service.stop().await {
                    tracing::error!(
                        startup_error = %e,
                        rollback_error = %stop_err,
                        "rollback also failed during startup failure cleanup"
                    );
                }
                self.remove_pid();
                return Err(anyhow::anyhow!("failed to start ingest listener: {}", e));
            }
        }

        if self.config.metrics.enabled {
            let start_time = self.start_time;
            self.uptime_task = Some(ScheduledTask::spawn(
                "daemon-uptime",
                UPTIME_INTERVAL,
                self.cancel.child_token(),
                move || {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                },
            ));
        }

        tracing::info!("watchpost-daemon started");
        Ok(())
    }

    /// Start, wait for SIGTERM/SIGINT, then shut down gracefully.
    pub async fn run(&mut self) -> Result<()> {
        self.start().await?;

        let signal = match wait_for_shutdown_signal().await {
            Ok(signal) => signal,
            Err(e) => {
                self.shutdown().await?;
                return Err(e);
            }
        };
        tracing::info!(signal = signal, "shutdown signal received");

        self.shutdown().await
    }

    /// Stop all components (ingest first, then the engine) and remove the PID file.
    ///
    /// Every component is asked to stop even if an earlier one failed; the
    /// first error is returned.
    pub async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all components");
        self.cancel.cancel();
        if let Some(task) = self.uptime_task.take() {
            if let Err(e) = task.stop().await {
                tracing::warn!(error = %e, "uptime task did not stop cleanly");
            }
        }

        let mut first_error = None;
        if let Some(ingest) = self.ingest.as_mut() {
            if let Err(e) = ingest.stop().await {
                tracing::error!(error = %e, "failed to stop ingest listener");
                first_error.get_or_insert(anyhow::anyhow!("ingest: {}", e));
            }
        }
        if let Err(e) = self.service.stop().await {
            tracing::error!(error = %e, "failed to stop engine service");
            first_error.get_or_insert(anyhow::anyhow!("engine: {}", e));
        }
        self.remove_pid();

        match first_error {
            Some(e) => Err(e),
            None => {
                tracing::info!("watchpost-daemon shut down");
                Ok(())
            }
        }
    }

    /// Current aggregated health.
    pub async fn health(&self) -> DaemonHealth {
        let mut components = vec![ComponentHealth::new(
            "engine",
            true,
            self.service.health_check().await,
        )];
        if let Some(ingest) = &self.ingest {
            components.push(ComponentHealth::new("ingest", true, ingest.health_check().await));
        }

        DaemonHealth {
            status: aggregate_status(&components),
            uptime_secs: self.start_time.elapsed().as_secs(),
            components,
        }
    }

    /// Shared engine (for in-process producers).
    pub fn engine(&self) -> Arc<SecurityEngine> {
        self.service.engine()
    }

    /// Bound ingest address, once the listener has started.
    pub fn ingest_addr(&self) -> Option<SocketAddr> {
        self.ingest.as_ref().and_then(IngestListener::local_addr)
    }

    pub fn config(&self) -> &WatchpostConfig {
        &self.config
    }

    fn remove_pid(&mut self) {
        if self.pid_written {
            remove_pid_file(Path::new(&self.config.general.pid_file));
            self.pid_written = false;
        }
    }
}

/// Wait for SIGTERM or SIGINT and return the signal's name.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current PID to `path`, refusing to overwrite an existing file.
///
/// The file is created atomically (`create_new`) with mode 0600 inside a
/// 0700 parent directory.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    let pid = std::process::id();
    writeln!(file, "{}", pid)?;
    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file; failures are logged, not returned.
pub fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "PID file removed"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        ),
    }
}
