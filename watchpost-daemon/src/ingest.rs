//! Newline-delimited JSON event ingest over TCP.
//!
//! Each line a client sends is one `SecurityEvent`; each line the daemon
//! writes back is either the verdict for that event or `{"error": "..."}`.
//!
//! ```text
//! > {"kind":"auth-attempt","identity":"user-42","payload":"login","context":{"outcome":"failure"}}
//! < {"event_id":"...","risk_score":0,"severity":null,"findings":[],"alert_ids":[],"blocked_until":null}
//! ```
//!
//! Limits: `max_connections` concurrent clients (extra connections are
//! closed immediately), `max_line_bytes` per line (an oversized line gets an
//! error reply and the connection is closed), `idle_timeout_secs` between lines.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use watchpost_core::config::IngestConfig;
use watchpost_core::error::{PipelineError, WatchpostError};
use watchpost_core::event::SecurityEvent;
use watchpost_core::metrics as m;
use watchpost_core::pipeline::{HealthStatus, Pipeline};
use watchpost_engine::SecurityEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenerState {
    Initialized,
    Running,
    Stopped,
}

/// TCP listener feeding events into the shared engine.
pub struct IngestListener {
    config: IngestConfig,
    engine: Arc<SecurityEngine>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    state: ListenerState,
}

impl IngestListener {
    pub fn new(config: IngestConfig, engine: Arc<SecurityEngine>) -> Self {
        Self {
            config,
            engine,
            cancel: CancellationToken::new(),
            task: None,
            local_addr: None,
            state: ListenerState::Initialized,
        }
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Pipeline for IngestListener {
    async fn start(&mut self) -> Result<(), WatchpostError> {
        if self.state == ListenerState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let listener = TcpListener::bind(&self.config.bind).await.map_err(|e| {
            PipelineError::InitFailed(format!("failed to bind {}: {}", self.config.bind, e))
        })?;
        let addr = listener.local_addr()?;

        self.cancel = CancellationToken::new();
        self.task = Some(tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.engine),
            self.config.clone(),
            self.cancel.clone(),
        )));
        self.local_addr = Some(addr);
        self.state = ListenerState::Running;

        info!(
            listen_addr = %addr,
            max_connections = self.config.max_connections,
            "event ingest listener started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), WatchpostError> {
        if self.state != ListenerState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.await.map_err(|e| PipelineError::TaskJoin {
                name: "ingest-accept".to_owned(),
                reason: e.to_string(),
            })?;
        }
        self.state = ListenerState::Stopped;
        info!("event ingest listener stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ListenerState::Running => match &self.task {
                Some(task) if task.is_finished() => {
                    HealthStatus::Unhealthy("accept loop exited".to_owned())
                }
                _ => HealthStatus::Healthy,
            },
            ListenerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ListenerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// Assess one request line and produce the reply line (without newline).
pub fn process_line(engine: &SecurityEngine, line: &str) -> String {
    let event: SecurityEvent = match serde_json::from_str(line) {
        Ok(event) => event,
        Err(e) => {
            metrics::counter!(m::INGEST_REJECTED_LINES_TOTAL).increment(1);
            return error_reply(&format!("invalid event: {e}"));
        }
    };

    let verdict = engine.assess(&event).verdict();
    serde_json::to_string(&verdict)
        .unwrap_or_else(|e| error_reply(&format!("failed to encode verdict: {e}")))
}

fn error_reply(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

async fn accept_loop(
    listener: TcpListener,
    engine: Arc<SecurityEngine>,
    config: IngestConfig,
    cancel: CancellationToken,
) {
    let permits = Arc::new(Semaphore::new(config.max_connections));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("ingest accept loop received shutdown signal");
                break;
            }
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "ingest accept failed");
                        continue;
                    }
                };

                let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                    warn!(peer = %peer, "max ingest connections reached, rejecting");
                    continue;
                };
                metrics::counter!(m::INGEST_CONNECTIONS_TOTAL).increment(1);

                let engine = Arc::clone(&engine);
                let config = config.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, &engine, &config, &cancel).await {
                        debug!(peer = %peer, error = %e, "ingest connection closed with error");
                    }
                    drop(permit);
                });
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    engine: &SecurityEngine,
    config: &IngestConfig,
    cancel: &CancellationToken,
) -> std::io::Result<()> {
    let peer = stream.peer_addr()?;
    let (read_half, mut writer) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let idle = Duration::from_secs(config.idle_timeout_secs);
    let limit = config.max_line_bytes as u64 + 1;
    let mut line = Vec::new();

    loop {
        line.clear();
        let mut limited = (&mut reader).take(limit);
        let read = tokio::select! {
            _ = cancel.cancelled() => break,
            read = timeout(idle, limited.read_until(b'\n', &mut line)) => read,
        };

        let n = match read {
            Ok(result) => result?,
            Err(_) => {
                debug!(peer = %peer, "ingest connection idle timeout");
                break;
            }
        };
        if n == 0 {
            break;
        }

        if line.len() > config.max_line_bytes && !line.ends_with(b"\n") {
            metrics::counter!(m::INGEST_REJECTED_LINES_TOTAL).increment(1);
            warn!(
                peer = %peer,
                max_line_bytes = config.max_line_bytes,
                "ingest line too long, closing connection"
            );
            let reply = error_reply(&format!("line exceeds {} bytes", config.max_line_bytes));
            writer.write_all(format!("{reply}\n").as_bytes()).await?;
            break;
        }

        let reply = match std::str::from_utf8(&line) {
            Ok(text) if text.trim().is_empty() => continue,
            Ok(text) => process_line(engine, text.trim()),
            Err(e) => {
                metrics::counter!(m::INGEST_REJECTED_LINES_TOTAL).increment(1);
                debug!(peer = %peer, error = %e, "ingest line is not valid UTF-8");
                error_reply(&format!("invalid event: line is not valid UTF-8 ({e})"))
            }
        };
        writer.write_all(reply.as_bytes()).await?;
        writer.write_all(b"\n").await?;
    }

    writer.shutdown().await
}
