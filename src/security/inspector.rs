//! Anomaly inspector.
//!
//! # Responsibilities
//! - Run the ordered request checks and short-circuit on the first reject
//! - Keep the in-memory IP blocklist and per-address attack counters
//! - Track raw per-address volume over a short window
//! - Audit every non-trivial verdict and passage through sensitive paths
//!
//! # Evaluation Order
//! ```text
//! dev bypass → IP blocklist → user agent → declared size → content rules → velocity
//! ```
//!
//! Addresses are keyed in canonical form, so an IPv4-mapped IPv6 peer shares
//! state with its plain IPv4 address.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

use crate::audit::{category, AuditDispatcher, AuditEvent};
use crate::config::InspectorConfig;
use crate::error::Rejection;
use crate::http::request::RequestSnapshot;
use crate::observability::metrics;
use crate::security::clock::{ceil_secs, Clock};
use crate::security::escalation::Escalation;
use crate::security::rules::{RuleKind, RuleSet, Severity, UserAgentFilter};

/// Outcome of [`AnomalyInspector::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub reason: Option<String>,
    pub severity: Severity,
    pub rejection: Option<Rejection>,
}

impl Verdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            severity: Severity::Low,
            rejection: None,
        }
    }

    fn reject(rejection: Rejection, severity: Severity) -> Self {
        Self {
            allowed: false,
            reason: Some(rejection.to_string()),
            severity,
            rejection: Some(rejection),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedIp {
    pub ip: String,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityStats {
    pub blocked_ips: Vec<BlockedIp>,
    pub recent_attacks: usize,
    pub suspicious_patterns: usize,
    pub blocked_user_agents: usize,
}

#[derive(Debug, Clone)]
struct BlockEntry {
    reason: String,
    blocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct AttackRecord {
    count: u32,
    last_seen: Instant,
}

#[derive(Debug, Clone, Copy)]
struct VelocityRecord {
    count: u32,
    window_started: Instant,
}

pub struct AnomalyInspector {
    config: InspectorConfig,
    rules: RuleSet,
    user_agents: UserAgentFilter,
    escalation: Escalation,
    velocity_window: Duration,
    attack_horizon: Duration,
    blocklist: DashMap<IpAddr, BlockEntry>,
    attacks: DashMap<IpAddr, AttackRecord>,
    velocity: DashMap<IpAddr, VelocityRecord>,
    clock: Arc<dyn Clock>,
    audit: AuditDispatcher,
}

impl AnomalyInspector {
    pub fn new(
        config: &InspectorConfig,
        clock: Arc<dyn Clock>,
        audit: AuditDispatcher,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            rules: RuleSet::builtin()?,
            user_agents: UserAgentFilter::builtin(config.trusted_user_agent.clone())?,
            escalation: Escalation::new(config.attack_threshold),
            velocity_window: Duration::from_secs(config.velocity_window_secs),
            attack_horizon: Duration::from_secs(config.attack_horizon_secs),
            config: config.clone(),
            blocklist: DashMap::new(),
            attacks: DashMap::new(),
            velocity: DashMap::new(),
            clock,
            audit,
        })
    }

    pub fn max_request_size(&self) -> u64 {
        self.config.max_request_size
    }

    /// Development mode lets loopback traffic through without any checks.
    pub fn bypasses(&self, request: &RequestSnapshot) -> bool {
        self.config.dev_mode && request.is_loopback()
    }

    pub fn check(&self, request: &RequestSnapshot) -> Verdict {
        let ip = request.ip.to_canonical();

        if self.bypasses(request) {
            metrics::record_inspection("bypass");
            return Verdict::allow();
        }

        if self.config.ip_blocking_enabled && self.blocklist.contains_key(&ip) {
            metrics::record_inspection("blocked_ip");
            self.audit.emit(
                AuditEvent::error(category::BLOCKED_IP, "Blocked IP attempted access")
                    .with_request(request),
            );
            return Verdict::reject(Rejection::AddressBlocked, Severity::High);
        }

        if self.user_agents.is_blocked(request.user_agent.as_deref()) {
            metrics::record_inspection("user_agent");
            self.audit.emit(
                AuditEvent::warning(category::SUSPICIOUS_UA, "Suspicious user agent detected")
                    .with_request(request),
            );
            return Verdict::reject(
                Rejection::validation("Suspicious user agent"),
                Severity::Medium,
            );
        }

        if let Some(length) = request.content_length {
            if length > self.config.max_request_size {
                return self.reject_oversized(request, length);
            }
        }

        let content = request.inspectable_content();
        let violations = self.rules.matches(&content);
        if !violations.is_empty() {
            metrics::record_inspection("content");
            let kinds: Vec<RuleKind> = violations.iter().map(|v| v.kind).collect();
            tracing::warn!(ip = %ip, path = %request.path, rule = kinds[0].as_str(), "Content rule matched");
            self.audit.emit(
                AuditEvent::warning(category::SUSPICIOUS_CONTENT, "Suspicious content detected")
                    .with_request(request)
                    .with_detail("violations", &kinds),
            );
            self.track_attack(ip, request);
            return Verdict::reject(Rejection::Content, Severity::High);
        }

        if let Some(rejection) = self.track_velocity(ip) {
            metrics::record_inspection("velocity");
            self.audit.emit(
                AuditEvent::warning(category::RAPID_REQUESTS, "Rapid requests detected")
                    .with_request(request)
                    .with_detail("threshold", self.config.velocity_threshold),
            );
            return Verdict::reject(rejection, Severity::Medium);
        }

        metrics::record_inspection("allow");
        if self
            .config
            .sensitive_paths
            .iter()
            .any(|sensitive| request.path.contains(sensitive.as_str()))
        {
            self.audit.emit(
                AuditEvent::info(category::ACCESS_GRANTED, "Access to sensitive endpoint")
                    .with_request(request),
            );
        }
        Verdict::allow()
    }

    /// Size rejection, also used by the middleware before the body is read.
    pub fn reject_oversized(&self, request: &RequestSnapshot, length: u64) -> Verdict {
        metrics::record_inspection("size");
        self.audit.emit(
            AuditEvent::warning(category::LARGE_REQUEST, "Request too large")
                .with_request(request)
                .with_detail("size", length)
                .with_detail("limit", self.config.max_request_size),
        );
        Verdict::reject(Rejection::validation("Request too large"), Severity::Medium)
    }

    /// Audit a failure inside the inspection layer itself.
    pub fn record_middleware_error(&self, request: &RequestSnapshot, error: &str) {
        tracing::error!(ip = %request.ip, path = %request.path, error, "Inspection middleware error");
        self.audit.emit(
            AuditEvent::error(category::MIDDLEWARE_ERROR, "Security middleware error")
                .with_request(request)
                .with_detail("error", error),
        );
    }

    fn track_attack(&self, ip: IpAddr, request: &RequestSnapshot) {
        let now = self.clock.now();
        let (crossed, count) = {
            let mut record = self.attacks.entry(ip).or_insert(AttackRecord {
                count: 0,
                last_seen: now,
            });
            if now.saturating_duration_since(record.last_seen) > self.attack_horizon {
                record.count = 0;
            }
            record.last_seen = now;
            let crossed = self.escalation.record(&mut record.count);
            (crossed, record.count)
        };

        if crossed && self.insert_block(ip, "Automatic block: repeated attack attempts") {
            metrics::record_auto_block("inspector");
            tracing::warn!(ip = %ip, attempts = count, "Address auto-blocked");
            self.audit.emit(
                AuditEvent::error(category::AUTO_BLOCK, "IP auto-blocked after repeated attacks")
                    .with_request(request)
                    .with_detail("attempts", count),
            );
        }
    }

    fn track_velocity(&self, ip: IpAddr) -> Option<Rejection> {
        let now = self.clock.now();
        let mut record = self.velocity.entry(ip).or_insert(VelocityRecord {
            count: 0,
            window_started: now,
        });
        let window_end = record.window_started + self.velocity_window;
        if now >= window_end {
            record.count = 0;
            record.window_started = now;
        }
        record.count = record.count.saturating_add(1);

        (record.count > self.config.velocity_threshold).then(|| Rejection::Velocity {
            message: "Too many rapid requests".to_string(),
            retry_after_secs: ceil_secs(
                (record.window_started + self.velocity_window).saturating_duration_since(now),
            )
            .max(1),
            limit: self.config.velocity_threshold,
            window_ms: self.velocity_window.as_millis() as u64,
        })
    }

    fn insert_block(&self, ip: IpAddr, reason: &str) -> bool {
        let mut inserted = false;
        self.blocklist.entry(ip).or_insert_with(|| {
            inserted = true;
            BlockEntry {
                reason: reason.to_string(),
                blocked_at: Utc::now(),
            }
        });
        inserted
    }

    /// Add an address to the blocklist by hand.
    pub fn block_ip(&self, ip: IpAddr, reason: &str) {
        let ip = ip.to_canonical();
        self.blocklist.insert(
            ip,
            BlockEntry {
                reason: reason.to_string(),
                blocked_at: Utc::now(),
            },
        );
        tracing::info!(ip = %ip, reason, "IP address blocked");
        self.audit.emit(
            AuditEvent::warning(category::IP_BLOCKED, "IP address manually blocked")
                .with_ip(ip)
                .with_detail("reason", reason),
        );
    }

    /// Remove an address from the blocklist and forget its attacks.
    pub fn unblock_ip(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        let removed = self.blocklist.remove(&ip).is_some();
        self.attacks.remove(&ip);
        if removed {
            tracing::info!(ip = %ip, "IP address unblocked");
            self.audit.emit(
                AuditEvent::info(category::IP_UNBLOCKED, "IP address unblocked").with_ip(ip),
            );
        }
        removed
    }

    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        self.blocklist.contains_key(&ip.to_canonical())
    }

    pub fn security_stats(&self) -> SecurityStats {
        let mut blocked_ips: Vec<BlockedIp> = self
            .blocklist
            .iter()
            .map(|entry| BlockedIp {
                ip: entry.key().to_string(),
                reason: entry.reason.clone(),
                blocked_at: entry.blocked_at,
            })
            .collect();
        blocked_ips.sort_by(|a, b| a.ip.cmp(&b.ip));

        SecurityStats {
            blocked_ips,
            recent_attacks: self.attacks.len(),
            suspicious_patterns: self.rules.len(),
            blocked_user_agents: self.user_agents.len(),
        }
    }

    /// Age out attack counters past the horizon and finished velocity windows.
    pub fn sweep(&self, now: Instant, retention: Duration) -> usize {
        let before = self.attacks.len() + self.velocity.len();
        let horizon = self.attack_horizon;
        let window = self.velocity_window;
        self.attacks
            .retain(|_, record| now.saturating_duration_since(record.last_seen) <= horizon);
        self.velocity
            .retain(|_, record| now < record.window_started + window + retention);
        before.saturating_sub(self.attacks.len() + self.velocity.len())
    }
}
