//! Audit trail.
//!
//! # Data Flow
//! ```text
//! Gate / inspector decision:
//!     → event.rs (build AuditEvent)
//!     → dispatcher.rs (try_send onto bounded queue)
//!     → AuditWorker task
//!         → sink.rs (tracing, memory ring, JSON-lines file)
//!         → alerts.rs (broadcast when level is error)
//! ```

pub mod alerts;
pub mod dispatcher;
pub mod event;
pub mod sink;

pub use alerts::{Alert, AlertHub, AlertPayload, AlertPublisher, SECURITY_EVENTS};
pub use dispatcher::{AuditDispatcher, AuditWorker};
pub use event::{category, AuditEvent, AuditLevel};
pub use sink::{AuditSink, FanoutSink, FileSink, LogFilter, MemorySink, TracingSink};
