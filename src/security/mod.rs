//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → middleware.rs inspection (inspector.rs: bypass, blocklist, UA, size, rules.rs, velocity)
//!     → middleware.rs admission (policies.rs picks a rate_limit.rs gate by path)
//!         → identity.rs (user id, else address)
//!         → escalation.rs (suspicion score → sticky block)
//!     → headers.rs (X-RateLimit-* on the response)
//!     → Pass to the application
//!
//! Background:
//!     gc.rs sweeps gates and inspector counters on an interval
//! ```
//!
//! # Design Decisions
//! - One owned gate per policy, injected through router state
//! - Time comes from clock.rs so windows and sweeps are testable
//! - No I/O on the decision path; audit goes through a bounded queue

pub mod clock;
pub mod escalation;
pub mod gc;
pub mod headers;
pub mod identity;
pub mod inspector;
pub mod middleware;
pub mod policies;
pub mod rate_limit;
pub mod rules;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gc::{GarbageCollector, Sweep, SweepReport};
pub use identity::{AuthenticatedUser, Identity};
pub use inspector::{AnomalyInspector, SecurityStats, Verdict};
pub use policies::{AdmissionPolicies, PolicyName, UnblockScope};
pub use rate_limit::{AdmissionGate, Allowance, CounterRecord, Decision, GateStats};
pub use rules::{RuleKind, RuleSet, Severity, UserAgentFilter};
