//! Asynchronous audit dispatch.
//!
//! # Responsibilities
//! - Hand events off the request path without awaiting I/O
//! - Bound memory: a full queue drops the event and counts it
//! - Deliver to the sink and broadcast high-severity events on a worker task
//!
//! # Design Decisions
//! - `try_send` only; admission latency never depends on the sink
//! - The worker drains what is queued when shutdown is signalled

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use crate::audit::alerts::{AlertPayload, AlertPublisher, SECURITY_EVENTS};
use crate::audit::event::AuditEvent;
use crate::audit::sink::AuditSink;
use crate::observability::metrics;

/// Cheap, cloneable handle used by gates and the inspector.
#[derive(Debug, Clone)]
pub struct AuditDispatcher {
    tx: mpsc::Sender<AuditEvent>,
    dropped: Arc<AtomicU64>,
}

impl AuditDispatcher {
    /// Create a dispatcher and the receiving end of its queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Enqueue an event. Never blocks.
    pub fn emit(&self, event: AuditEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_audit_dropped();
                tracing::warn!(
                    category = %event.category,
                    "Audit queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(category = %event.category, "Audit worker gone, dropping event");
            }
        }
    }

    /// Events lost to a full queue since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Drains the audit queue into a sink.
pub struct AuditWorker {
    rx: mpsc::Receiver<AuditEvent>,
    sink: Arc<dyn AuditSink>,
    alerts: Arc<dyn AlertPublisher>,
}

impl AuditWorker {
    pub fn new(
        rx: mpsc::Receiver<AuditEvent>,
        sink: Arc<dyn AuditSink>,
        alerts: Arc<dyn AlertPublisher>,
    ) -> Self {
        Self { rx, sink, alerts }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let AuditWorker {
            mut rx,
            sink,
            alerts,
        } = self;
        tracing::debug!("Audit worker starting");
        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => deliver(sink.as_ref(), alerts.as_ref(), event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    rx.close();
                    while let Some(event) = rx.recv().await {
                        deliver(sink.as_ref(), alerts.as_ref(), event).await;
                    }
                    tracing::info!("Audit worker received shutdown signal, queue drained");
                    break;
                }
            }
        }
    }
}

async fn deliver(sink: &dyn AuditSink, alerts: &dyn AlertPublisher, event: AuditEvent) {
    if let Err(e) = sink.append(&event).await {
        metrics::record_audit_sink_error();
        tracing::warn!(error = %e, category = %event.category, "Failed to write audit event");
    }
    if event.is_high_severity() {
        if let Err(e) = alerts.publish(SECURITY_EVENTS, &AlertPayload::from(&event)) {
            tracing::warn!(error = %e, "Failed to publish security alert");
        }
    }
}
