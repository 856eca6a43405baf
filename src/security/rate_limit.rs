//! Fixed-window admission gate with suspicion escalation.
//!
//! One gate per named policy. Each identity gets a lazily created
//! [`CounterRecord`]; the DashMap entry guard is the per-key critical
//! section, so concurrent requests for the same identity never lose updates.
//! No I/O happens while the guard is held: audit events are collected and
//! emitted after it drops.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use crate::audit::{category, AuditDispatcher, AuditEvent};
use crate::config::PolicyConfig;
use crate::error::Rejection;
use crate::http::request::RequestSnapshot;
use crate::observability::metrics;
use crate::security::clock::{ceil_secs, Clock};
use crate::security::escalation::Escalation;
use crate::security::identity::Identity;

/// Per-identity state held by a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterRecord {
    pub count: u32,
    pub window_reset_at: Instant,
    pub blocked: bool,
    pub suspicion_score: u32,
}

impl CounterRecord {
    fn new(window_reset_at: Instant) -> Self {
        Self {
            count: 0,
            window_reset_at,
            blocked: false,
            suspicion_score: 0,
        }
    }
}

/// Budget left after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Instant,
    pub reset_in: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Allowance),
    Reject(Rejection),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Aggregate counts for operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GateStats {
    pub total_entries: usize,
    pub blocked_clients: usize,
    pub suspicious_clients: usize,
    pub active_requests: u64,
}

pub struct AdmissionGate {
    name: String,
    window: Duration,
    max_requests: u32,
    message: String,
    escalation: Escalation,
    records: DashMap<String, CounterRecord>,
    clock: Arc<dyn Clock>,
    audit: AuditDispatcher,
}

impl AdmissionGate {
    pub fn new(
        name: impl Into<String>,
        policy: &PolicyConfig,
        escalation: Escalation,
        clock: Arc<dyn Clock>,
        audit: AuditDispatcher,
    ) -> Self {
        Self {
            name: name.into(),
            window: Duration::from_millis(policy.window_ms),
            max_requests: policy.max_requests,
            message: policy.message.clone(),
            escalation,
            records: DashMap::new(),
            clock,
            audit,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Decide for a bare identity.
    pub fn decide(&self, identity: &Identity) -> Decision {
        self.evaluate(identity, None)
    }

    /// Decide for a request; audit events carry its path and user agent.
    pub fn admit(&self, request: &RequestSnapshot) -> Decision {
        self.evaluate(&request.identity, Some(request))
    }

    fn evaluate(&self, identity: &Identity, request: Option<&RequestSnapshot>) -> Decision {
        let now = self.clock.now();
        let mut events = Vec::new();

        let decision = {
            let mut record = self
                .records
                .entry(identity.key())
                .or_insert_with(|| CounterRecord::new(now + self.window));

            if record.blocked {
                let remaining = record.window_reset_at.saturating_duration_since(now);
                let retry_after_secs = if remaining.is_zero() {
                    ceil_secs(self.window)
                } else {
                    ceil_secs(remaining)
                };
                events.push(
                    AuditEvent::warning(category::BLOCKED_CLIENT, "Request from blocked client")
                        .with_detail("policy", &self.name)
                        .with_detail("suspicionScore", record.suspicion_score),
                );
                Decision::Reject(Rejection::IdentityBlocked { retry_after_secs })
            } else {
                if now > record.window_reset_at {
                    record.count = 0;
                    record.window_reset_at = now + self.window;
                    self.escalation.decay(&mut record.suspicion_score);
                }

                let reset_in = record.window_reset_at.saturating_duration_since(now);

                if record.count >= self.max_requests {
                    let crossed = self.escalation.record(&mut record.suspicion_score);
                    events.push(
                        AuditEvent::warning(category::RATE_LIMIT, "Rate limit exceeded")
                            .with_detail("policy", &self.name)
                            .with_detail("count", record.count)
                            .with_detail("limit", self.max_requests)
                            .with_detail("suspicionScore", record.suspicion_score),
                    );
                    if crossed {
                        record.blocked = true;
                        metrics::record_auto_block("gate");
                        events.push(
                            AuditEvent::error(
                                category::AUTO_BLOCK,
                                "Client auto-blocked after repeated violations",
                            )
                            .with_detail("policy", &self.name)
                            .with_detail("suspicionScore", record.suspicion_score),
                        );
                    }
                    Decision::Reject(Rejection::Velocity {
                        message: self.message.clone(),
                        retry_after_secs: ceil_secs(reset_in).max(1),
                        limit: self.max_requests,
                        window_ms: self.window.as_millis() as u64,
                    })
                } else {
                    record.count += 1;
                    Decision::Allow(Allowance {
                        limit: self.max_requests,
                        remaining: self.max_requests - record.count,
                        reset_at: record.window_reset_at,
                        reset_in,
                    })
                }
            }
        };

        let outcome = match &decision {
            Decision::Allow(_) => "allow",
            Decision::Reject(rejection) => rejection.kind(),
        };
        metrics::record_admission(&self.name, outcome);

        if let Decision::Reject(rejection) = &decision {
            tracing::debug!(
                policy = %self.name,
                identity = %identity,
                retry_after_secs = rejection.retry_after_secs(),
                "Admission rejected"
            );
        }

        for event in events {
            let event = match request {
                Some(request) => event.with_request(request),
                None => event.with_identity(identity),
            };
            self.audit.emit(event);
        }

        decision
    }

    /// Clear the block and suspicion of every key containing `identifier`.
    pub fn unblock(&self, identifier: &str) -> bool {
        let mut cleared = Vec::new();
        for mut entry in self.records.iter_mut() {
            if entry.key().contains(identifier) {
                entry.blocked = false;
                entry.suspicion_score = 0;
                cleared.push(entry.key().clone());
            }
        }

        for key in &cleared {
            tracing::info!(policy = %self.name, identity = %key, "Rate limit block cleared");
            let mut event = AuditEvent::info(category::RATE_LIMIT_CLEARED, "Rate limit block cleared")
                .with_detail("policy", &self.name);
            event.identity = Some(key.clone());
            self.audit.emit(event);
        }

        !cleared.is_empty()
    }

    pub fn stats(&self) -> GateStats {
        let mut stats = GateStats::default();
        for entry in self.records.iter() {
            stats.total_entries += 1;
            if entry.blocked {
                stats.blocked_clients += 1;
            }
            if entry.suspicion_score > 0 {
                stats.suspicious_clients += 1;
            }
            stats.active_requests += u64::from(entry.count);
        }
        stats
    }

    pub fn record(&self, key: &str) -> Option<CounterRecord> {
        self.records.get(key).map(|record| record.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Evict unblocked records whose window ended more than `retention` ago.
    pub fn sweep(&self, now: Instant, retention: Duration) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| record.blocked || now <= record.window_reset_at + retention);
        let evicted = before.saturating_sub(self.records.len());
        metrics::record_tracked_identities(&self.name, self.records.len());
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLevel;
    use crate::security::clock::ManualClock;
    use tokio::sync::mpsc;

    fn gate(max_requests: u32) -> (AdmissionGate, ManualClock, mpsc::Receiver<AuditEvent>) {
        let clock = ManualClock::default();
        let (audit, rx) = AuditDispatcher::channel(256);
        let gate = AdmissionGate::new(
            "api",
            &PolicyConfig::new(60_000, max_requests, "Too many API requests"),
            Escalation::new(5),
            Arc::new(clock.clone()),
            audit,
        );
        (gate, clock, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<AuditEvent>) -> Vec<AuditEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn ip(addr: &str) -> Identity {
        Identity::Ip(addr.parse().unwrap())
    }

    #[test]
    fn test_remaining_counts_down_then_rejects() {
        let (gate, clock, _rx) = gate(3);
        let id = ip("1.2.3.4");

        let remaining: Vec<u32> = (0..3)
            .map(|_| match gate.decide(&id) {
                Decision::Allow(allowance) => allowance.remaining,
                Decision::Reject(r) => panic!("unexpected rejection: {r:?}"),
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        clock.advance(Duration::from_secs(1));
        match gate.decide(&id) {
            Decision::Reject(Rejection::Velocity {
                retry_after_secs,
                limit,
                window_ms,
                ..
            }) => {
                assert_eq!(retry_after_secs, 59);
                assert_eq!(limit, 3);
                assert_eq!(window_ms, 60_000);
            }
            other => panic!("expected velocity rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_window_rollover_readmits_and_decays() {
        let (gate, clock, _rx) = gate(1);
        let id = ip("1.2.3.4");

        assert!(gate.decide(&id).is_allowed());
        assert!(!gate.decide(&id).is_allowed());
        assert!(!gate.decide(&id).is_allowed());
        assert_eq!(gate.record("ip:1.2.3.4").unwrap().suspicion_score, 2);

        clock.advance(Duration::from_millis(60_001));
        assert!(gate.decide(&id).is_allowed());

        let record = gate.record("ip:1.2.3.4").unwrap();
        assert_eq!(record.count, 1);
        assert_eq!(record.suspicion_score, 1);
    }

    #[test]
    fn test_escalates_to_sticky_block() {
        let (gate, clock, mut rx) = gate(1);
        let id = ip("9.9.9.9");

        assert!(gate.decide(&id).is_allowed());
        for _ in 0..5 {
            assert!(matches!(
                gate.decide(&id),
                Decision::Reject(Rejection::Velocity { .. })
            ));
        }
        assert!(gate.record("ip:9.9.9.9").unwrap().blocked);

        let events = drain(&mut rx);
        let auto_blocks: Vec<_> = events
            .iter()
            .filter(|e| e.category == category::AUTO_BLOCK)
            .collect();
        assert_eq!(auto_blocks.len(), 1);
        assert_eq!(auto_blocks[0].level, AuditLevel::Error);
        assert_eq!(auto_blocks[0].identity.as_deref(), Some("ip:9.9.9.9"));

        // Rollovers do not release a blocked identity.
        clock.advance(Duration::from_secs(600));
        match gate.decide(&id) {
            Decision::Reject(Rejection::IdentityBlocked { retry_after_secs }) => {
                assert!(retry_after_secs > 0)
            }
            other => panic!("expected block, got {other:?}"),
        }

        // Blocked requests are audited but do not move suspicion.
        assert_eq!(gate.record("ip:9.9.9.9").unwrap().suspicion_score, 5);
        assert!(drain(&mut rx)
            .iter()
            .any(|e| e.category == category::BLOCKED_CLIENT));
    }

    #[test]
    fn test_unblock_by_substring() {
        let (gate, _clock, _rx) = gate(1);
        let id = ip("9.9.9.9");
        for _ in 0..6 {
            gate.decide(&id);
        }
        assert!(gate.record("ip:9.9.9.9").unwrap().blocked);

        assert!(!gate.unblock("ip:8.8.8.8"));
        assert!(gate.unblock("9.9.9.9"));

        let record = gate.record("ip:9.9.9.9").unwrap();
        assert!(!record.blocked);
        assert_eq!(record.suspicion_score, 0);
    }

    #[test]
    fn test_identities_are_independent() {
        let (gate, _clock, _rx) = gate(1);
        assert!(gate.decide(&ip("1.1.1.1")).is_allowed());
        assert!(gate.decide(&ip("2.2.2.2")).is_allowed());
        assert!(gate.decide(&Identity::User("1.1.1.1".into())).is_allowed());
        assert!(!gate.decide(&ip("1.1.1.1")).is_allowed());
    }

    #[test]
    fn test_stats() {
        let (gate, _clock, _rx) = gate(2);
        gate.decide(&ip("1.1.1.1"));
        gate.decide(&ip("1.1.1.1"));
        gate.decide(&ip("1.1.1.1"));
        gate.decide(&ip("2.2.2.2"));

        assert_eq!(
            gate.stats(),
            GateStats {
                total_entries: 2,
                blocked_clients: 0,
                suspicious_clients: 1,
                active_requests: 3,
            }
        );
    }

    #[test]
    fn test_sweep_keeps_blocked_and_live_records() {
        let (gate, clock, _rx) = gate(1);
        for _ in 0..6 {
            gate.decide(&ip("9.9.9.9"));
        }
        gate.decide(&ip("1.1.1.1"));

        assert_eq!(gate.sweep(clock.now(), Duration::ZERO), 0);

        clock.advance(Duration::from_millis(60_001));
        gate.decide(&ip("3.3.3.3"));
        assert_eq!(gate.sweep(clock.now(), Duration::ZERO), 1);
        assert!(gate.record("ip:1.1.1.1").is_none());
        assert!(gate.record("ip:9.9.9.9").is_some());
        assert!(gate.record("ip:3.3.3.3").is_some());
    }

    #[test]
    fn test_concurrent_decisions_never_overadmit() {
        let (gate, _clock, _rx) = gate(50);
        let gate = Arc::new(gate);
        let id = ip("4.4.4.4");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                let id = id.clone();
                std::thread::spawn(move || (0..25).filter(|_| gate.decide(&id).is_allowed()).count())
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        assert_eq!(admitted, 50);
    }
}
