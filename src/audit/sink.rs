//! Audit sinks.
//!
//! The durable store is an external collaborator; the guard only needs
//! `append`. Concrete sinks here cover the local cases: structured tracing
//! output, a bounded in-memory buffer for the admin views, and a JSON-lines
//! file.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::audit::event::{AuditEvent, AuditLevel};
use crate::error::AuditError;

/// Append-only store of audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes events as structured logs under the `admission_guard::audit` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

#[async_trait]
impl AuditSink for TracingSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let identity = event.identity.as_deref().unwrap_or("-");
        let ip = event.ip.as_deref().unwrap_or("-");
        let path = event.path.as_deref().unwrap_or("-");
        match event.level {
            AuditLevel::Info => tracing::info!(
                target: "admission_guard::audit",
                category = %event.category, identity, ip, path,
                details = %event.details,
                "{}", event.message
            ),
            AuditLevel::Warning => tracing::warn!(
                target: "admission_guard::audit",
                category = %event.category, identity, ip, path,
                details = %event.details,
                "{}", event.message
            ),
            AuditLevel::Error => tracing::error!(
                target: "admission_guard::audit",
                category = %event.category, identity, ip, path,
                details = %event.details,
                "{}", event.message
            ),
        }
        Ok(())
    }
}

/// Filter for reading back recent events.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub level: Option<AuditLevel>,
    pub ip: Option<String>,
    pub identity: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl LogFilter {
    fn matches(&self, event: &AuditEvent) -> bool {
        self.level.map_or(true, |level| event.level == level)
            && self.ip.as_ref().map_or(true, |ip| event.ip.as_ref() == Some(ip))
            && self
                .identity
                .as_ref()
                .map_or(true, |identity| event.identity.as_ref() == Some(identity))
            && self.since.map_or(true, |since| event.timestamp >= since)
    }
}

/// Bounded ring of the most recent events, newest last.
#[derive(Debug)]
pub struct MemorySink {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Matching events, newest first.
    pub fn query(&self, filter: &LogFilter) -> Vec<AuditEvent> {
        let events = self.lock();
        events
            .iter()
            .rev()
            .filter(|event| filter.matches(event))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// The `limit` newest events.
    pub fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        self.query(&LogFilter {
            limit: Some(limit),
            ..LogFilter::default()
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut events = self.lock();
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(())
    }
}

/// One JSON document per line, appended to a file.
#[derive(Debug)]
pub struct FileSink {
    file: tokio::sync::Mutex<File>,
}

impl FileSink {
    pub async fn open(path: &Path) -> Result<Self, AuditError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        Ok(Self {
            file: tokio::sync::Mutex::new(file),
        })
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Delivers each event to every inner sink.
///
/// A failing sink does not stop delivery to the others; the first error is
/// reported after all sinks were tried.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

#[async_trait]
impl AuditSink for FanoutSink {
    async fn append(&self, event: &AuditEvent) -> Result<(), AuditError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.append(event).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
