//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every service from a validated configuration, in dependency order
//! - Start background tasks (audit worker, garbage collector)
//! - Stop them only after the HTTP server has drained in-flight requests
//!
//! # Design Decisions
//! - Fail fast: any construction error is fatal
//! - Services are owned values passed to the router, never globals

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::audit::{
    AlertHub, AuditDispatcher, AuditSink, AuditWorker, FanoutSink, FileSink, MemorySink,
    TracingSink,
};
use crate::config::GuardConfig;
use crate::error::AuditError;
use crate::http::GuardServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::security::{AdmissionPolicies, AnomalyInspector, Clock, GarbageCollector};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to compile content rules: {0}")]
    Rules(#[from] regex::Error),
    #[error("failed to open audit log: {0}")]
    Audit(#[from] AuditError),
}

/// Everything the request path and the admin surface share.
pub struct GuardServices {
    pub clock: Arc<dyn Clock>,
    pub audit: AuditDispatcher,
    pub audit_log: Arc<MemorySink>,
    pub alerts: Arc<AlertHub>,
    pub policies: Arc<AdmissionPolicies>,
    pub inspector: Arc<AnomalyInspector>,
    pub gc: Arc<GarbageCollector>,
}

impl GuardServices {
    /// Build services and the (not yet running) audit worker.
    pub async fn build(
        config: &GuardConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, AuditWorker), StartupError> {
        let (audit, rx) = AuditDispatcher::channel(config.audit.queue_capacity);
        let audit_log = Arc::new(MemorySink::new(config.audit.memory_capacity));
        let alerts = Arc::new(AlertHub::default());

        let mut sink = FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(audit_log.clone());
        if let Some(path) = &config.audit.file_path {
            sink = sink.with(Arc::new(FileSink::open(Path::new(path)).await?));
            tracing::info!(path = %path, "Audit file sink enabled");
        }
        let sink: Arc<dyn AuditSink> = Arc::new(sink);
        let worker = AuditWorker::new(rx, sink, alerts.clone());

        let policies = Arc::new(AdmissionPolicies::from_config(
            config,
            clock.clone(),
            audit.clone(),
        ));
        let inspector = Arc::new(AnomalyInspector::new(
            &config.inspector,
            clock.clone(),
            audit.clone(),
        )?);

        let mut gc = GarbageCollector::new(
            clock.clone(),
            Duration::from_secs(config.gc.interval_secs),
            Duration::from_secs(config.gc.retention_secs),
        );
        for (_, gate) in policies.iter() {
            gc.register(gate.clone());
        }
        gc.register(inspector.clone());

        if config.inspector.dev_mode {
            tracing::warn!("Development mode: loopback traffic bypasses inspection");
        }

        Ok((
            Self {
                clock,
                audit,
                audit_log,
                alerts,
                policies,
                inspector,
                gc: Arc::new(gc),
            },
            worker,
        ))
    }

    /// Start the audit worker and the garbage collector.
    pub fn spawn_background(&self, worker: AuditWorker, shutdown: &Shutdown) -> BackgroundTasks {
        let audit = tokio::spawn(worker.run(shutdown.subscribe()));
        let gc = self.gc.clone().spawn(shutdown.subscribe());
        BackgroundTasks { audit, gc }
    }
}

pub struct BackgroundTasks {
    audit: JoinHandle<()>,
    gc: JoinHandle<()>,
}

impl BackgroundTasks {
    /// Wait for both tasks after shutdown was triggered.
    pub async fn join(self) {
        if let Err(e) = self.gc.await {
            tracing::error!(error = %e, "Garbage collector task failed");
        }
        if let Err(e) = self.audit.await {
            tracing::error!(error = %e, "Audit worker task failed");
        }
    }
}

/// Serve until `stop` resolves, then shut the background tasks down.
///
/// Requests still draining after `stop` keep emitting audit events, so the
/// worker is signalled only once the server has returned.
pub async fn serve_until<F>(
    server: GuardServer,
    listener: TcpListener,
    stop: F,
    shutdown: &Shutdown,
    background: BackgroundTasks,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let result = server.run(listener, stop).await;

    // Stop background tasks even if the server failed.
    shutdown.trigger();
    background.join().await;
    result
}
